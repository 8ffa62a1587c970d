use serde::{Deserialize, Serialize};

/// A message received from an external channel (Telegram, Discord, WebChat, …).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Logical channel name (e.g. "telegram", "discord").
    pub channel: String,

    /// Platform-native identifier for the sender (chat ID, user ID, …).
    pub sender_id: String,

    /// Human-readable display name for the sender, if available.
    pub sender_name: Option<String>,

    /// Plain text content of the message.
    pub content: String,

    /// ISO-8601 timestamp of when the message was received.
    pub timestamp: String,

    /// Full raw payload from the platform for cases that need extra fields.
    pub raw_payload: Option<serde_json::Value>,

    /// Platform-native chat/conversation identifier. Distinct from
    /// `sender_id` in group chats, where many senders share one chat.
    #[serde(default)]
    pub chat_id: String,

    /// Platform-native message identifier, used as part of the dedupe
    /// fingerprint `(channel, chat_id, message_id)`.
    #[serde(default)]
    pub message_id: String,

    /// True when this message arrived in a multi-party chat rather than a
    /// 1:1 conversation with the agent.
    #[serde(default)]
    pub is_group: bool,

    /// `@name` tokens the platform (or a prior parse pass) already
    /// extracted from `content`.
    #[serde(default)]
    pub mentions: Vec<String>,

    /// Message ID this one is replying to, if the platform reports it.
    #[serde(default)]
    pub reply_to: Option<String>,

    /// Optional account identifier, for platforms with multiple logged-in
    /// accounts behind one channel adapter.
    #[serde(default)]
    pub account_id: Option<String>,
}

/// A message to be delivered to an external channel.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Logical channel name (e.g. "telegram", "discord").
    pub channel: String,

    /// Platform-native identifier for the recipient (chat ID, user ID, …).
    pub recipient_id: String,

    /// Content to deliver.
    pub content: String,

    /// Formatting hint for the target platform.
    pub format: MessageFormat,

    /// Media URL to attach, if any (spec.md §4.7's `[[image|audio|video|file:url]]`).
    #[serde(default)]
    pub media_url: Option<String>,

    /// Deliver `media_url` as a voice note rather than a regular audio
    /// attachment, when the channel supports the distinction.
    #[serde(default)]
    pub audio_as_voice: bool,

    /// Message ID to reply to, when the channel supports threaded replies.
    #[serde(default)]
    pub reply_to: Option<String>,
}

/// Formatting hint for outbound message content.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageFormat {
    /// Raw text with no special markup.
    #[default]
    PlainText,

    /// Markdown as understood by the target platform.
    Markdown,

    /// HTML markup (supported by Telegram, some web clients).
    Html,
}

/// Runtime connection state of a channel adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelStatus {
    /// Fully connected and ready to send/receive.
    Connected,

    /// Attempting to establish or re-establish the connection.
    Connecting,

    /// Cleanly disconnected (not an error condition).
    Disconnected,

    /// An unrecoverable (or pre-retry) error occurred.
    Error(String),
}
