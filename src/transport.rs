use async_trait::async_trait;
use reqwest::Client;

use crate::config::OpenAiConfig;
use crate::error::{GenieChatError, Result};
use crate::models::{ChatRequest, ChatResponse};

/// Seam over the chat-completion API so the router is testable without a
/// live model.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse>;
}

pub struct OpenAiTransport {
    client: Client,
    api_url: String,
    api_key: String,
}

impl OpenAiTransport {
    pub fn new(cfg: &OpenAiConfig) -> Self {
        Self {
            client: Client::new(),
            api_url: cfg.api_url.clone(),
            api_key: cfg.api_key.clone(),
        }
    }
}

#[async_trait]
impl Transport for OpenAiTransport {
    /// Single attempt; failures surface to the user as a chat message and
    /// re-asking is the recovery path.
    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse> {
        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(req)
            .send()
            .await
            .map_err(|e| GenieChatError::ExternalApi(format!("LLM request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unreadable body".to_string());
            return Err(GenieChatError::ExternalApi(format!(
                "LLM API returned {status}: {body}"
            )));
        }

        response
            .json()
            .await
            .map_err(|e| GenieChatError::ExternalApi(format!("Failed to parse LLM response: {e}")))
    }
}
