//! Cross-channel messaging tool — lets the AI send messages to any connected channel.

use std::sync::Arc;

use async_trait::async_trait;
use skynet_channels::manager::ChannelManager;
use skynet_channels::types::{ChannelStatus, MessageFormat, OutboundMessage};
use tokio::sync::Mutex;

use super::{Tool, ToolResult};

/// Tool that sends a message to a specific channel (e.g. a connected chat platform).
pub struct SendMessageTool {
    channels: Arc<Mutex<ChannelManager>>,
}

impl SendMessageTool {
    pub fn new(channels: Arc<Mutex<ChannelManager>>) -> Self {
        Self { channels }
    }
}

#[async_trait]
impl Tool for SendMessageTool {
    fn name(&self) -> &str {
        "send_message"
    }

    fn description(&self) -> &str {
        "Send a message to a connected channel (e.g. Discord, terminal). \
         Use `connected_channels` from the system prompt to see available targets."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "channel": {
                    "type": "string",
                    "description": "Target channel name (e.g. 'discord', 'terminal'). Must be one of the connected channels."
                },
                "recipient": {
                    "type": "string",
                    "description": "Channel-specific target: Discord channel ID, session key for terminal, etc."
                },
                "message": {
                    "type": "string",
                    "description": "The text message to send."
                }
            },
            "required": ["channel", "recipient", "message"]
        })
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let channel = match input.get("channel").and_then(|v| v.as_str()) {
            Some(c) if !c.is_empty() => c,
            _ => return ToolResult::error("missing or empty 'channel' parameter"),
        };
        let recipient = match input.get("recipient").and_then(|v| v.as_str()) {
            Some(r) if !r.is_empty() => r,
            _ => return ToolResult::error("missing or empty 'recipient' parameter"),
        };
        let message = match input.get("message").and_then(|v| v.as_str()) {
            Some(m) if !m.is_empty() => m,
            _ => return ToolResult::error("missing or empty 'message' parameter"),
        };

        let guard = self.channels.lock().await;
        let adapter = match guard.get(channel) {
            Some(adapter) => adapter,
            None => {
                let available: Vec<String> =
                    guard.statuses().into_iter().map(|(name, _)| name).collect();
                return ToolResult::error(format!(
                    "channel '{}' is not registered. Available: {}",
                    channel,
                    available.join(", ")
                ));
            }
        };
        if !matches!(adapter.status(), ChannelStatus::Connected) {
            return ToolResult::error(format!("channel '{}' is not connected", channel));
        }

        let outbound = OutboundMessage {
            channel: channel.to_string(),
            recipient_id: recipient.to_string(),
            content: message.to_string(),
            format: MessageFormat::PlainText,
            ..Default::default()
        };

        match adapter.send(&outbound).await {
            Ok(()) => ToolResult::success(format!(
                "Message sent to {} (recipient: {})",
                channel, recipient
            )),
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}
