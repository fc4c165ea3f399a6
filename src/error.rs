use thiserror::Error;

/// Error taxonomy for the chat service.
///
/// Only `Config` is fatal; everything else is converted to a user-facing
/// chat message at the service boundary and the session continues.
#[derive(Error, Debug)]
pub enum GenieChatError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("External API error: {0}")]
    ExternalApi(String),

    #[error("Genie query timed out: {0}")]
    Timeout(String),

    #[error("Genie returned no data")]
    EmptyResult,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, GenieChatError>;
