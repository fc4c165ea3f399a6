use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Html;
use axum::{routing::get, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::service::GenieChatService;
use crate::session::SessionStore;

const CHAT_PAGE: &str = include_str!("chat.html");

#[derive(Debug, Deserialize)]
pub struct ChatApiRequest {
    /// Absent on the first message from a fresh browser tab.
    pub session_id: Option<String>,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ChatApiResponse {
    pub session_id: String,
    pub reply: String,
}

/// The whole UI surface: the chat page, the chat endpoint, and liveness.
pub fn router(service: Arc<GenieChatService>) -> Router {
    Router::new()
        .route("/", get(chat_page))
        .route("/api/chat", post(chat))
        .route("/health", get(|| async { "ok" }))
        .with_state(service)
}

async fn chat_page() -> Html<&'static str> {
    Html(CHAT_PAGE)
}

async fn chat(
    State(service): State<Arc<GenieChatService>>,
    Json(request): Json<ChatApiRequest>,
) -> Result<Json<ChatApiResponse>, StatusCode> {
    if request.message.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let session_id = request
        .session_id
        .filter(|id| !id.is_empty())
        .unwrap_or_else(SessionStore::new_session_id);

    // Non-fatal failures already arrive as chat text from the service
    let reply = service.handle_message(&session_id, &request.message).await;

    Ok(Json(ChatApiResponse { session_id, reply }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_page_has_input_and_message_list() {
        assert!(CHAT_PAGE.contains("id=\"messages\""));
        assert!(CHAT_PAGE.contains("id=\"input\""));
        assert!(CHAT_PAGE.contains("/api/chat"));
    }

    #[test]
    fn api_request_accepts_missing_session_id() {
        let req: ChatApiRequest =
            serde_json::from_str(r#"{"message": "hello"}"#).expect("should parse");
        assert!(req.session_id.is_none());
        assert_eq!(req.message, "hello");
    }
}
