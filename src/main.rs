use anyhow::Result;
use std::sync::Arc;

use genie_chat::config::Config;
use genie_chat::http;
use genie_chat::service::GenieChatService;

#[tokio::main]
async fn main() -> Result<()> {
    // Config first: a missing required variable must stop the process
    // before any client exists.
    let config = Config::load()?;

    let filter = if config.debug_mode { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_target(false)
        .with_ansi(false)
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();

    let service = Arc::new(GenieChatService::new(&config));
    let router = http::router(service);

    let listener = tokio::net::TcpListener::bind(&config.http_bind).await?;
    tracing::info!(bind = %config.http_bind, "Starting Genie chat server");
    axum::serve(listener, router).await?;
    Ok(())
}
