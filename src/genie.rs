use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use tokio::time::sleep;

use crate::config::GenieConfig;
use crate::error::{GenieChatError, Result};
use crate::models::{GenieQueryResult, GenieSession, QueryHandle, QueryStatus};

/// Status and attachments of one Genie message, as reported by a poll.
#[derive(Debug, Clone)]
pub struct MessageState {
    pub status: QueryStatus,
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone)]
pub struct Attachment {
    pub attachment_id: String,
    pub text: Option<String>,
    pub query: Option<QueryAttachment>,
}

#[derive(Debug, Clone)]
pub struct QueryAttachment {
    pub description: Option<String>,
    pub sql: Option<String>,
}

/// Column names plus positional row values from a query-result fetch.
#[derive(Debug, Clone)]
pub struct QueryRows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Seam over the hosted Genie REST API. Each method is one documented
/// endpoint; no logic lives behind this trait.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GenieApi: Send + Sync {
    async fn start_conversation(&self, question: &str) -> Result<QueryHandle>;
    async fn continue_conversation(
        &self,
        conversation_id: &str,
        question: &str,
    ) -> Result<QueryHandle>;
    async fn get_message(&self, handle: &QueryHandle) -> Result<MessageState>;
    async fn get_query_result(
        &self,
        handle: &QueryHandle,
        attachment_id: &str,
    ) -> Result<QueryRows>;
}

// Wire types for the Databricks Genie endpoints

#[derive(Debug, Deserialize)]
struct StartConversationResponse {
    conversation_id: String,
    message_id: String,
}

#[derive(Debug, Deserialize)]
struct CreateMessageResponse {
    #[serde(alias = "id")]
    message_id: String,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    status: String,
    #[serde(default)]
    attachments: Vec<AttachmentResponse>,
}

#[derive(Debug, Deserialize)]
struct AttachmentResponse {
    attachment_id: String,
    text: Option<TextAttachmentResponse>,
    query: Option<QueryAttachmentResponse>,
}

#[derive(Debug, Deserialize)]
struct TextAttachmentResponse {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct QueryAttachmentResponse {
    description: Option<String>,
    query: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QueryResultResponse {
    statement_response: StatementResponse,
}

#[derive(Debug, Deserialize)]
struct StatementResponse {
    #[serde(default)]
    manifest: Option<StatementManifest>,
    result: StatementResult,
}

#[derive(Debug, Deserialize)]
struct StatementManifest {
    schema: Option<StatementSchema>,
}

#[derive(Debug, Deserialize)]
struct StatementSchema {
    #[serde(default)]
    columns: Vec<StatementColumn>,
}

#[derive(Debug, Deserialize)]
struct StatementColumn {
    name: String,
}

#[derive(Debug, Deserialize)]
struct StatementResult {
    #[serde(default)]
    data_array: Vec<Vec<serde_json::Value>>,
}

/// reqwest implementation of [`GenieApi`] against
/// `/api/2.0/genie/spaces/{space}/...` with bearer-token auth.
pub struct DatabricksGenie {
    client: Client,
    host: String,
    token: String,
    space_id: String,
}

impl DatabricksGenie {
    pub fn new(cfg: &GenieConfig) -> Self {
        Self {
            client: Client::new(),
            host: cfg.host.clone(),
            token: cfg.token.clone(),
            space_id: cfg.space_id.clone(),
        }
    }

    fn space_url(&self, suffix: &str) -> String {
        format!(
            "{}/api/2.0/genie/spaces/{}{}",
            self.host, self.space_id, suffix
        )
    }

    async fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        body: serde_json::Value,
    ) -> Result<T> {
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .map_err(|e| GenieChatError::ExternalApi(format!("Genie request failed: {e}")))?;
        Self::decode(response).await
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| GenieChatError::ExternalApi(format!("Genie request failed: {e}")))?;
        Self::decode(response).await
    }

    async fn decode<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unreadable body".to_string());
            return Err(GenieChatError::ExternalApi(format!(
                "Genie API returned {status}: {body}"
            )));
        }
        response.json().await.map_err(|e| {
            GenieChatError::ExternalApi(format!("Failed to parse Genie response: {e}"))
        })
    }
}

#[async_trait]
impl GenieApi for DatabricksGenie {
    async fn start_conversation(&self, question: &str) -> Result<QueryHandle> {
        let url = self.space_url("/start-conversation");
        let response: StartConversationResponse = self
            .post_json(&url, serde_json::json!({"content": question}))
            .await?;
        Ok(QueryHandle {
            conversation_id: response.conversation_id,
            message_id: response.message_id,
        })
    }

    async fn continue_conversation(
        &self,
        conversation_id: &str,
        question: &str,
    ) -> Result<QueryHandle> {
        let url = self.space_url(&format!("/conversations/{conversation_id}/messages"));
        let response: CreateMessageResponse = self
            .post_json(&url, serde_json::json!({"content": question}))
            .await?;
        Ok(QueryHandle {
            conversation_id: conversation_id.to_string(),
            message_id: response.message_id,
        })
    }

    async fn get_message(&self, handle: &QueryHandle) -> Result<MessageState> {
        let url = self.space_url(&format!(
            "/conversations/{}/messages/{}",
            handle.conversation_id, handle.message_id
        ));
        let response: MessageResponse = self.get_json(&url).await?;
        Ok(MessageState {
            status: QueryStatus::from_databricks(&response.status),
            attachments: response
                .attachments
                .into_iter()
                .map(|a| Attachment {
                    attachment_id: a.attachment_id,
                    text: a.text.map(|t| t.content),
                    query: a.query.map(|q| QueryAttachment {
                        description: q.description,
                        sql: q.query,
                    }),
                })
                .collect(),
        })
    }

    async fn get_query_result(
        &self,
        handle: &QueryHandle,
        attachment_id: &str,
    ) -> Result<QueryRows> {
        let url = self.space_url(&format!(
            "/conversations/{}/messages/{}/attachments/{}/query-result",
            handle.conversation_id, handle.message_id, attachment_id
        ));
        let response: QueryResultResponse = self.get_json(&url).await?;

        let mut data: Vec<Vec<String>> = response
            .statement_response
            .result
            .data_array
            .into_iter()
            .map(|row| row.into_iter().map(render_cell).collect())
            .collect();

        let columns: Vec<String> = response
            .statement_response
            .manifest
            .and_then(|m| m.schema)
            .map(|s| s.columns.into_iter().map(|c| c.name).collect())
            .unwrap_or_default();

        // Without a manifest the first data row is the header row
        let columns = if columns.is_empty() && !data.is_empty() {
            data.remove(0)
        } else {
            columns
        };

        Ok(QueryRows {
            columns,
            rows: data,
        })
    }
}

fn render_cell(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => "NULL".to_string(),
        other => other.to_string(),
    }
}

/// Drives one question through Genie: start or continue the conversation,
/// poll at a fixed interval until the status leaves pending or the attempt
/// budget runs out, then fetch rows for a completed query attachment.
pub struct GenieClient {
    api: Arc<dyn GenieApi>,
    poll_interval: std::time::Duration,
    max_poll_attempts: u32,
}

impl GenieClient {
    pub fn new(api: Arc<dyn GenieApi>, cfg: &GenieConfig) -> Self {
        Self {
            api,
            poll_interval: cfg.poll_interval,
            max_poll_attempts: cfg.max_poll_attempts,
        }
    }

    /// Run a full query cycle. Failure and timeout come back as terminal
    /// result statuses, not errors; only transport-level trouble is an `Err`.
    pub async fn ask(
        &self,
        session: Option<&GenieSession>,
        question: &str,
    ) -> Result<(GenieSession, GenieQueryResult)> {
        let handle = match session {
            Some(existing) => {
                tracing::info!(
                    conversation_id = %existing.conversation_id,
                    "Continuing Genie conversation"
                );
                self.api
                    .continue_conversation(&existing.conversation_id, question)
                    .await?
            }
            None => {
                tracing::info!("Starting new Genie conversation");
                self.api.start_conversation(question).await?
            }
        };
        let session = GenieSession {
            conversation_id: handle.conversation_id.clone(),
        };

        let mut attempts = 0u32;
        let state = loop {
            attempts += 1;
            let state = self.api.get_message(&handle).await?;
            tracing::debug!(attempt = attempts, status = ?state.status, "Genie poll");

            if state.status.is_terminal() {
                break state;
            }
            if attempts >= self.max_poll_attempts {
                tracing::warn!(
                    attempts,
                    "Genie query still pending after poll budget, giving up"
                );
                return Ok((
                    session,
                    GenieQueryResult::with_status(QueryStatus::TimedOut),
                ));
            }
            sleep(self.poll_interval).await;
        };

        if state.status != QueryStatus::Completed {
            return Ok((session, GenieQueryResult::with_status(state.status)));
        }

        let mut result = GenieQueryResult::with_status(QueryStatus::Completed);
        let Some(attachment) = state.attachments.into_iter().next() else {
            // Completed but nothing attached; the router reports "no data"
            return Ok((session, result));
        };

        if let Some(text) = attachment.text {
            result.text = Some(text);
            return Ok((session, result));
        }

        if let Some(query) = attachment.query {
            result.description = query.description;
            result.generated_sql = query.sql;
            let rows = self
                .api
                .get_query_result(&handle, &attachment.attachment_id)
                .await?;
            result.columns = rows.columns;
            result.rows = rows.rows;
        }

        Ok((session, result))
    }
}
