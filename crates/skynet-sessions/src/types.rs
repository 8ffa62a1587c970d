use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use skynet_core::types::SessionKey;

/// `role` discriminant for a [`Message`] (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    ToolResult,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::ToolResult => "toolResult",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "system" => Some(MessageRole::System),
            "user" => Some(MessageRole::User),
            "assistant" => Some(MessageRole::Assistant),
            "toolResult" => Some(MessageRole::ToolResult),
            _ => None,
        }
    }
}

/// One block of a multi-part message body (spec.md §3: "string or list of
/// content blocks of type text|image").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentBlock {
    Text { text: String },
    Image { url: String, mime_type: Option<String> },
}

/// Message body: either plain text or a list of blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl MessageContent {
    /// `true` if this content carries no meaningful text (spec.md §4.2
    /// `sanitizeHistory`: drop messages with "empty content").
    pub fn is_empty(&self) -> bool {
        match self {
            MessageContent::Text(s) => s.trim().is_empty(),
            MessageContent::Blocks(blocks) => blocks.is_empty(),
        }
    }
}

/// A single requested tool invocation attached to an `assistant` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// One turn in a session's history (spec.md §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: MessageContent,
    /// Set only on `assistant` messages that requested tool calls.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub tool_calls: Option<Vec<ToolCallRecord>>,
    /// Set only on `toolResult` messages; must match the `id` of one of the
    /// tool calls on the `assistant` message immediately preceding it.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub tool_call_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub thinking: Option<String>,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: MessageContent::Text(text.into()),
            tool_calls: None,
            tool_call_id: None,
            timestamp: Utc::now(),
            thinking: None,
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: MessageContent::Text(text.into()),
            tool_calls: None,
            tool_call_id: None,
            timestamp: Utc::now(),
            thinking: None,
        }
    }

    pub fn has_valid_role(&self) -> bool {
        true // role is a typed enum — parse failures are caught before construction
    }
}

/// A persisted conversation (spec.md §3: `(sessionKey, sessionId, messages[],
/// createdAt, lastActiveAt, metadata)`).
///
/// `session_id` is a UUID assigned once at creation and never changes, even
/// if the owning key's routing rules are later reinterpreted; `session_key`
/// maps to at most one active `session_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_key: SessionKey,
    pub session_id: String,
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    pub metadata: Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_through_wire_string() {
        for role in [
            MessageRole::System,
            MessageRole::User,
            MessageRole::Assistant,
            MessageRole::ToolResult,
        ] {
            assert_eq!(MessageRole::parse(role.as_str()), Some(role));
        }
        assert_eq!(MessageRole::parse("bogus"), None);
    }

    #[test]
    fn text_content_empty_detection() {
        assert!(MessageContent::Text("   ".into()).is_empty());
        assert!(!MessageContent::Text("hi".into()).is_empty());
        assert!(MessageContent::Blocks(vec![]).is_empty());
    }
}
