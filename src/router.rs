use std::sync::Arc;

use crate::error::{GenieChatError, Result};
use crate::models::{
    ChatMessage, ChatRequest, ConversationTurn, GenieQueryResult, QueryStatus, RouteDecision,
};
use crate::transport::Transport;

const CLASSIFY_SYSTEM_PROMPT: &str = r#"You are a helpful assistant for Databricks and Unity Catalog queries.

Decide whether the user's latest message needs live data from the Databricks environment (tables, schemas, catalogs, clusters, jobs, row-level data) or can be answered directly from your own knowledge and the conversation so far.

Respond with a single JSON object, nothing else:
- If Databricks data is needed:
  {"action": "needs_genie", "question": "<the user's question, EXACTLY as they asked it>"}
- Otherwise:
  {"action": "direct_answer", "answer": "<your answer>"}

When routing to Genie, pass the user's question verbatim in natural language.
DO NOT convert questions to SQL - Genie handles that internally.
DO NOT modify or rewrite the user's question.

For example:
- User asks: "What tables are in my catalog?"
- You respond: {"action": "needs_genie", "question": "What tables are in my catalog?"}
- NOT: {"action": "needs_genie", "question": "SELECT * FROM information_schema.tables"}"#;

const FORMAT_SYSTEM_PROMPT: &str = "You are a helpful assistant that answers a user's question from \
Databricks query results. Answer directly and naturally, include the actual values from the \
results, and format numbers readably. Do not repeat the raw table unless asked.";

const FAILED_MESSAGE: &str =
    "Genie could not answer that query. Try rephrasing your question and ask again.";
const TIMED_OUT_MESSAGE: &str =
    "The query took too long and was abandoned. Try a narrower question.";
const EMPTY_MESSAGE: &str = "No data found for that question.";

/// Routes each utterance via the model's judgment and turns Genie results
/// into user-facing replies. No deterministic intent classifier; the model
/// decides.
pub struct LlmRouter {
    tx: Arc<dyn Transport>,
    model: String,
    max_result_rows: usize,
}

impl LlmRouter {
    pub fn new(tx: Arc<dyn Transport>, model: String, max_result_rows: usize) -> Self {
        Self {
            tx,
            model,
            max_result_rows,
        }
    }

    /// Ask the model whether the utterance needs Databricks data. The
    /// response is JSON-mode and deserialized into [`RouteDecision`]; raw
    /// model text is never string-matched.
    pub async fn classify_and_route(
        &self,
        utterance: &str,
        history: &[ConversationTurn],
    ) -> Result<RouteDecision> {
        tracing::info!("Classifying utterance: {}", utterance);

        let mut messages = vec![ChatMessage {
            role: "system".to_string(),
            content: CLASSIFY_SYSTEM_PROMPT.to_string(),
        }];
        for turn in history {
            messages.push(ChatMessage {
                role: turn.role.as_str().to_string(),
                content: turn.text.clone(),
            });
        }
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: utterance.to_string(),
        });

        let request = ChatRequest {
            model: self.model.clone(),
            messages,
            temperature: 0.0, // Keep temperature low for consistent JSON output
            max_tokens: 1500,
            response_format: Some(serde_json::json!({"type": "json_object"})),
        };

        let response = self.tx.chat(&request).await?;
        let choice = response.choices.first().ok_or_else(|| {
            GenieChatError::ExternalApi("LLM returned empty choices for routing".to_string())
        })?;

        let raw = choice.message.content.clone();
        serde_json::from_str(&raw).map_err(|e| {
            GenieChatError::ExternalApi(format!(
                "Failed to deserialize routing decision: {e}. Raw: {raw}"
            ))
        })
    }

    /// Produce the user-facing reply for a finished Genie cycle. Terminal
    /// failure states and empty results become explanatory messages, never
    /// raw errors; only a completed result with rows costs an LLM call.
    pub async fn format_result(
        &self,
        utterance: &str,
        result: &GenieQueryResult,
    ) -> Result<String> {
        match result.status {
            QueryStatus::Failed => return Ok(FAILED_MESSAGE.to_string()),
            QueryStatus::TimedOut => return Ok(TIMED_OUT_MESSAGE.to_string()),
            QueryStatus::Pending => {
                return Err(GenieChatError::Internal(
                    "format_result called on a pending query".to_string(),
                ));
            }
            QueryStatus::Completed => {}
        }

        // Genie sometimes answers in prose with no query at all
        if let Some(text) = &result.text {
            return Ok(text.clone());
        }

        if result.rows.is_empty() {
            let mut message = EMPTY_MESSAGE.to_string();
            if !result.columns.is_empty() {
                message.push_str(&format!(" (columns: {})", result.columns.join(", ")));
            }
            return Ok(message);
        }

        let table = render_table(&result.columns, &result.rows, self.max_result_rows);
        let description = result.description.as_deref().unwrap_or("");

        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: FORMAT_SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: format!(
                        "Question: {utterance}\n\nQuery description: {description}\n\nResults:\n{table}\n\nAnswer:"
                    ),
                },
            ],
            temperature: 0.3,
            max_tokens: 1500,
            response_format: None,
        };

        match self.tx.chat(&request).await {
            Ok(response) => match response.choices.first() {
                Some(choice) => Ok(choice.message.content.clone()),
                None => Ok(fallback_reply(description, result, self.max_result_rows)),
            },
            Err(e) => {
                // Still show the data rather than a raw error
                tracing::warn!("Result formatting call failed, replying with the table: {e}");
                Ok(fallback_reply(description, result, self.max_result_rows))
            }
        }
    }
}

fn fallback_reply(description: &str, result: &GenieQueryResult, max_rows: usize) -> String {
    let table = render_table(&result.columns, &result.rows, max_rows);
    if description.is_empty() {
        table
    } else {
        format!("{description}\n\n{table}")
    }
}

/// Render rows as an aligned text table with a separator line, capped at
/// `max_rows` with a trailer noting what was cut.
pub fn render_table(columns: &[String], rows: &[Vec<String>], max_rows: usize) -> String {
    if columns.is_empty() && rows.is_empty() {
        return "No results returned.".to_string();
    }
    if rows.is_empty() {
        return format!("Columns: {}\n\nNo data rows returned.", columns.join(", "));
    }

    let mut widths: Vec<usize> = columns.iter().map(|c| c.len()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if i >= widths.len() {
                widths.push(cell.len());
            } else if cell.len() > widths[i] {
                widths[i] = cell.len();
            }
        }
    }

    let mut lines = Vec::new();
    lines.push(
        columns
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{:<width$}", c, width = widths[i]))
            .collect::<Vec<_>>()
            .join(" | "),
    );
    lines.push(
        widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("-+-"),
    );

    for row in rows.iter().take(max_rows) {
        lines.push(
            row.iter()
                .enumerate()
                .map(|(i, cell)| {
                    let width = widths.get(i).copied().unwrap_or(cell.len());
                    format!("{:<width$}", cell)
                })
                .collect::<Vec<_>>()
                .join(" | "),
        );
    }

    if rows.len() > max_rows {
        lines.push(format!("\n... and {} more rows", rows.len() - max_rows));
    }
    lines.push(format!("\nTotal rows: {}", rows.len()));

    lines.join("\n")
}
