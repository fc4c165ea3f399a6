use std::sync::Arc;

use crate::config::Config;
use crate::error::{GenieChatError, Result};
use crate::genie::{DatabricksGenie, GenieApi, GenieClient};
use crate::models::{ConversationTurn, RouteDecision};
use crate::router::LlmRouter;
use crate::session::SessionStore;
use crate::transport::{OpenAiTransport, Transport};

/// Top-level service: owns the router, the Genie client, and the session
/// store, and runs one full chat turn per incoming message.
pub struct GenieChatService {
    router: LlmRouter,
    genie: GenieClient,
    sessions: SessionStore,
}

impl GenieChatService {
    pub fn new(config: &Config) -> Self {
        tracing::info!(model = %config.openai.model, "Initializing chat service");
        let transport: Arc<dyn Transport> = Arc::new(OpenAiTransport::new(&config.openai));
        let genie_api: Arc<dyn GenieApi> = Arc::new(DatabricksGenie::new(&config.genie));
        Self::with_parts(config, transport, genie_api)
    }

    /// Wire the service from injected API seams; tests pass mocks here.
    pub fn with_parts(
        config: &Config,
        transport: Arc<dyn Transport>,
        genie_api: Arc<dyn GenieApi>,
    ) -> Self {
        Self {
            router: LlmRouter::new(
                transport,
                config.openai.model.clone(),
                config.genie.max_result_rows,
            ),
            genie: GenieClient::new(genie_api, &config.genie),
            sessions: SessionStore::new(),
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Run one chat turn: append the user turn, route, optionally run the
    /// Genie cycle, format, append the assistant turn. External-call
    /// failures become the assistant's reply; the session always survives.
    pub async fn handle_message(&self, session_id: &str, text: &str) -> String {
        let session = self.sessions.get_or_create(session_id).await;
        // Holding the lock for the whole turn serializes the session: at most
        // one outstanding Genie query per session.
        let mut state = session.lock().await;

        let history = state.history().to_vec();
        state.append(ConversationTurn::user(text));

        let reply = match self.run_turn(&mut state, text, &history).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!(session_id, "Turn failed: {e}");
                user_facing_message(&e)
            }
        };

        state.append(ConversationTurn::assistant(reply.clone()));
        reply
    }

    async fn run_turn(
        &self,
        state: &mut crate::session::SessionState,
        text: &str,
        history: &[ConversationTurn],
    ) -> Result<String> {
        let decision = self.router.classify_and_route(text, history).await?;

        match decision {
            RouteDecision::DirectAnswer { answer } => {
                tracing::info!("Routed to direct answer");
                Ok(answer)
            }
            RouteDecision::NeedsGenie { question } => {
                tracing::info!("Routed to Genie");
                let (genie_session, result) =
                    self.genie.ask(state.genie_session(), &question).await?;
                state.set_genie_session(genie_session);
                self.router.format_result(text, &result).await
            }
        }
    }
}

/// Chat-message renderings of the non-fatal error taxonomy.
fn user_facing_message(e: &GenieChatError) -> String {
    match e {
        GenieChatError::Timeout(_) => {
            "The query took too long. Please try again with a narrower question.".to_string()
        }
        GenieChatError::EmptyResult => "No data found for that question.".to_string(),
        other => format!("An error occurred: {other}"),
    }
}
