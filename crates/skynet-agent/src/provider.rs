use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::prompt::SystemPrompt;
use crate::stream::ProviderEvent;
use crate::thinking::ThinkingLevel;

/// Classification of a provider's authentication mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    ApiKey,
    OAuth,
    Exchange,
    None,
}

/// Snapshot of a provider's current authentication state.
#[derive(Debug, Clone, Serialize)]
pub struct TokenInfo {
    pub token_type: TokenType,
    pub expires_at: Option<i64>,
    pub refreshable: bool,
}

/// A single message in the conversation history handed to a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// Tool definition sent to the LLM API (spec.md §4.5: `name`, `description`,
/// `parameters`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// A tool call extracted from the model's output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub input: serde_json::Value,
}

/// Request to a streaming provider (spec.md §4.4: `(messages, model, tools,
/// options)`).
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub system: String,
    pub system_prompt: Option<SystemPrompt>,
    pub messages: Vec<Message>,
    pub max_tokens: u32,
    pub thinking: Option<ThinkingLevel>,
    pub tools: Vec<ToolDefinition>,
    /// Raw JSON messages overriding `messages` when the caller needs
    /// structured content blocks (tool_use/tool_result) a plain string
    /// can't represent.
    pub raw_messages: Option<Vec<serde_json::Value>>,
}

/// Common interface every LLM backend implements (spec.md §4.4).
///
/// No concrete wire format is implemented against this trait here — that's
/// explicitly out of scope (spec.md §1). [`InMemoryProvider`] below is the
/// test double the turn loop and tool-execution tests drive against.
#[async_trait]
pub trait StreamingProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Stream a response. Implementations MUST eventually send
    /// `ProviderEvent::Done` or `ProviderEvent::Error` on `tx`, even when
    /// `cancel` fires mid-stream, so the turn loop can unwind deterministically.
    async fn stream(
        &self,
        req: &ChatRequest,
        tx: mpsc::Sender<ProviderEvent>,
        cancel: CancellationToken,
    ) -> Result<(), ProviderError>;

    fn token_info(&self) -> Option<TokenInfo> {
        None
    }

    async fn refresh_auth(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    #[error("operation cancelled")]
    Cancelled,
}

/// Scripted in-memory provider used by tests for the turn loop, tool
/// execution, and directive accumulation — stands in for the "external
/// collaborator" spec.md §4.4 deliberately leaves unimplemented.
pub struct InMemoryProvider {
    pub scripted_events: std::sync::Mutex<Vec<Vec<ProviderEvent>>>,
}

impl InMemoryProvider {
    /// Each inner `Vec<ProviderEvent>` is replayed, in order, on successive
    /// calls to `stream` (one per agent-loop iteration, e.g. one per tool
    /// round-trip).
    pub fn new(turns: Vec<Vec<ProviderEvent>>) -> Self {
        Self { scripted_events: std::sync::Mutex::new(turns) }
    }
}

#[async_trait]
impl StreamingProvider for InMemoryProvider {
    fn name(&self) -> &str {
        "in-memory"
    }

    async fn stream(
        &self,
        _req: &ChatRequest,
        tx: mpsc::Sender<ProviderEvent>,
        cancel: CancellationToken,
    ) -> Result<(), ProviderError> {
        let events = {
            let mut turns = self.scripted_events.lock().unwrap();
            if turns.is_empty() {
                Vec::new()
            } else {
                turns.remove(0)
            }
        };
        for event in events {
            if cancel.is_cancelled() {
                let _ = tx.send(ProviderEvent::Error { message: "cancelled".into() }).await;
                return Err(ProviderError::Cancelled);
            }
            let _ = tx.send(event).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_provider_replays_scripted_turns_in_order() {
        let provider = InMemoryProvider::new(vec![
            vec![ProviderEvent::TextDelta { text: "hi".into() }],
            vec![ProviderEvent::Done {
                model: "test".into(),
                tokens_in: 1,
                tokens_out: 1,
                stop_reason: "end_turn".into(),
            }],
        ]);
        let (tx, mut rx) = mpsc::channel(8);
        let req = ChatRequest {
            model: "test".into(),
            system: String::new(),
            system_prompt: None,
            messages: vec![],
            max_tokens: 10,
            thinking: None,
            tools: vec![],
            raw_messages: None,
        };
        provider.stream(&req, tx, CancellationToken::new()).await.unwrap();
        match rx.recv().await {
            Some(ProviderEvent::TextDelta { text }) => assert_eq!(text, "hi"),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
