use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who said a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One entry in a session's append-only history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Active Genie conversation for a browser session. Created on the first
/// Genie-routed question, reused afterwards, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenieSession {
    pub conversation_id: String,
}

/// Opaque identifier pair used to poll and fetch one Genie message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryHandle {
    pub conversation_id: String,
    pub message_id: String,
}

/// States of one Genie query cycle. Everything except `Pending` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStatus {
    Pending,
    Completed,
    Failed,
    TimedOut,
}

impl QueryStatus {
    /// Map a raw Databricks message status onto the state machine. Anything
    /// not explicitly terminal is still pending.
    pub fn from_databricks(raw: &str) -> Self {
        match raw {
            "COMPLETED" => QueryStatus::Completed,
            "FAILED" | "CANCELLED" | "QUERY_RESULT_EXPIRED" => QueryStatus::Failed,
            _ => QueryStatus::Pending,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, QueryStatus::Pending)
    }
}

/// Outcome of one poll-until-terminal cycle. Rows pair positionally with
/// `columns`; transient, dropped once the reply is formatted.
#[derive(Debug, Clone)]
pub struct GenieQueryResult {
    pub status: QueryStatus,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub generated_sql: Option<String>,
    pub description: Option<String>,
    /// Present when Genie answered with a text attachment instead of a query.
    pub text: Option<String>,
}

impl GenieQueryResult {
    pub fn with_status(status: QueryStatus) -> Self {
        Self {
            status,
            columns: Vec::new(),
            rows: Vec::new(),
            generated_sql: None,
            description: None,
            text: None,
        }
    }

    /// Explicit column→value view of each row.
    pub fn row_maps(&self) -> Vec<Vec<(String, String)>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .cloned()
                    .zip(row.iter().cloned())
                    .collect()
            })
            .collect()
    }
}

/// The router's contract: the model either answers directly or asks for the
/// utterance to be forwarded to Genie verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RouteDecision {
    DirectAnswer { answer: String },
    NeedsGenie { question: String },
}

// OpenAI-compatible chat completion wire format

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Serialize, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    pub choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    pub message: ChatMessage,
}
