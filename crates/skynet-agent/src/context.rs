//! Token-budget estimation and compaction strategies (spec.md §4.3).

use crate::provider::Message;
use skynet_sessions::types::{Message as SessionMessage, MessageContent, MessageRole};

/// Flat per-message overhead charged regardless of content, matching the
/// predecessor's token-estimation heuristic.
const MESSAGE_OVERHEAD_TOKENS: u32 = 4;
/// Default characters-per-token ratio when no model-specific ratio applies.
const DEFAULT_CHARS_PER_TOKEN: f64 = 1.0 / 0.25;
/// Flat cost charged for an image content block.
const IMAGE_FLAT_COST_TOKENS: u32 = 768;

/// Estimates token usage for a message list using a cheap character-based
/// heuristic (no tokenizer dependency), grounded on
/// `original_source/openclaw/agents/compaction/analyzer.py::TokenAnalyzer`.
pub struct TokenAnalyzer {
    chars_per_token: f64,
}

impl Default for TokenAnalyzer {
    fn default() -> Self {
        Self { chars_per_token: DEFAULT_CHARS_PER_TOKEN }
    }
}

impl TokenAnalyzer {
    pub fn estimate_tokens(&self, text: &str) -> u32 {
        (text.chars().count() as f64 / self.chars_per_token).ceil() as u32
    }

    fn estimate_content(&self, content: &MessageContent) -> u32 {
        match content {
            MessageContent::Text(text) => self.estimate_tokens(text),
            MessageContent::Blocks(blocks) => blocks
                .iter()
                .map(|block| match block {
                    skynet_sessions::types::ContentBlock::Text { text } => self.estimate_tokens(text),
                    skynet_sessions::types::ContentBlock::Image { .. } => IMAGE_FLAT_COST_TOKENS,
                })
                .sum(),
        }
    }

    pub fn estimate_message(&self, message: &SessionMessage) -> u32 {
        let mut tokens = MESSAGE_OVERHEAD_TOKENS + self.estimate_content(&message.content);
        if let Some(thinking) = &message.thinking {
            tokens += self.estimate_tokens(thinking);
        }
        if let Some(tool_calls) = &message.tool_calls {
            for call in tool_calls {
                tokens += self.estimate_tokens(&call.arguments.to_string());
            }
        }
        tokens
    }

    pub fn estimate_messages(&self, messages: &[SessionMessage]) -> u32 {
        messages.iter().map(|m| self.estimate_message(m)).sum()
    }
}

/// `system=1.0, assistant-with-tool-calls=0.9, assistant=0.7, user=0.6,
/// tool=0.4` (spec.md §4.3).
pub fn message_importance(message: &SessionMessage) -> f64 {
    match message.role {
        MessageRole::System => 1.0,
        MessageRole::Assistant if message.tool_calls.as_ref().is_some_and(|c| !c.is_empty()) => 0.9,
        MessageRole::Assistant => 0.7,
        MessageRole::User => 0.6,
        MessageRole::ToolResult => 0.4,
    }
}

/// Snapshot of a session's current token budget usage.
#[derive(Debug, Clone, Copy)]
pub struct ContextWindow {
    pub max_tokens: u32,
    pub current_tokens: u32,
    pub should_compress: bool,
}

/// The compaction strategy an agent is configured to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompactionStrategy {
    KeepRecent,
    KeepImportant,
    SlidingWindow,
    Summarize,
}

pub struct ContextManager {
    analyzer: TokenAnalyzer,
    strategy: CompactionStrategy,
}

impl ContextManager {
    pub fn new(strategy: CompactionStrategy) -> Self {
        Self { analyzer: TokenAnalyzer::default(), strategy }
    }

    /// `shouldCompress = currentTokens > maxTokens * 0.8` (spec.md §4.3).
    pub fn check(&self, messages: &[SessionMessage], max_tokens: u32) -> ContextWindow {
        let current_tokens = self.analyzer.estimate_messages(messages);
        let should_compress = current_tokens as f64 > max_tokens as f64 * 0.8;
        ContextWindow { max_tokens, current_tokens, should_compress }
    }

    pub fn compact(&self, messages: &[SessionMessage], target_tokens: u32) -> Vec<SessionMessage> {
        if self.analyzer.estimate_messages(messages) <= target_tokens {
            return messages.to_vec();
        }
        let compacted = match self.strategy {
            CompactionStrategy::KeepRecent => self.compact_keep_recent(messages, target_tokens),
            CompactionStrategy::KeepImportant => self.compact_keep_important(messages, target_tokens),
            CompactionStrategy::SlidingWindow => self.compact_sliding_window(messages, target_tokens),
            CompactionStrategy::Summarize => self.compact_keep_recent(messages, target_tokens),
        };
        drop_orphaned_tool_calls(compacted)
    }

    fn compact_keep_recent(&self, messages: &[SessionMessage], target_tokens: u32) -> Vec<SessionMessage> {
        let (system, rest) = split_system(messages);
        let mut budget = target_tokens.saturating_sub(self.analyzer.estimate_messages(&system));
        let mut kept: Vec<SessionMessage> = Vec::new();
        for message in rest.iter().rev() {
            let cost = self.analyzer.estimate_message(message);
            if cost > budget && !kept.is_empty() {
                break;
            }
            kept.push(message.clone());
            budget = budget.saturating_sub(cost);
        }
        kept.reverse();
        system.into_iter().chain(kept).collect()
    }

    fn compact_keep_important(&self, messages: &[SessionMessage], target_tokens: u32) -> Vec<SessionMessage> {
        let (system, rest) = split_system(messages);
        let mut budget = target_tokens.saturating_sub(self.analyzer.estimate_messages(&system));

        let mut indexed: Vec<(usize, &SessionMessage)> = rest.iter().enumerate().collect();
        indexed.sort_by(|a, b| {
            message_importance(b.1)
                .partial_cmp(&message_importance(a.1))
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut kept_indices: Vec<usize> = Vec::new();
        for (idx, message) in indexed {
            let cost = self.analyzer.estimate_message(message);
            if cost > budget && !kept_indices.is_empty() {
                continue;
            }
            kept_indices.push(idx);
            budget = budget.saturating_sub(cost);
        }
        kept_indices.sort_unstable();

        system
            .into_iter()
            .chain(kept_indices.into_iter().map(|i| rest[i].clone()))
            .collect()
    }

    /// Alternating growth from both ends (spec.md §4.3; see DESIGN.md for
    /// why this diverges from the source strategy's greedy-prefix fill).
    fn compact_sliding_window(&self, messages: &[SessionMessage], target_tokens: u32) -> Vec<SessionMessage> {
        let (system, rest) = split_system(messages);
        let mut budget = target_tokens.saturating_sub(self.analyzer.estimate_messages(&system));
        if rest.is_empty() {
            return system;
        }

        let mut prefix_end = 0usize;
        let mut suffix_start = rest.len();
        let mut grow_prefix = true;

        while prefix_end < suffix_start {
            if grow_prefix {
                let cost = self.analyzer.estimate_message(&rest[prefix_end]);
                if cost > budget {
                    break;
                }
                budget -= cost;
                prefix_end += 1;
            } else {
                let cost = self.analyzer.estimate_message(&rest[suffix_start - 1]);
                if cost > budget {
                    break;
                }
                budget -= cost;
                suffix_start -= 1;
            }
            grow_prefix = !grow_prefix;
        }

        system
            .into_iter()
            .chain(rest[..prefix_end].iter().cloned())
            .chain(rest[suffix_start..].iter().cloned())
            .collect()
    }
}

fn split_system(messages: &[SessionMessage]) -> (Vec<SessionMessage>, Vec<SessionMessage>) {
    let system = messages.iter().filter(|m| m.role == MessageRole::System).cloned().collect();
    let rest = messages.iter().filter(|m| m.role != MessageRole::System).cloned().collect();
    (system, rest)
}

/// An `assistant` message carrying `toolCalls` is never kept without the
/// matching `toolResult` immediately after (spec.md §4.3) — drop both.
fn drop_orphaned_tool_calls(messages: Vec<SessionMessage>) -> Vec<SessionMessage> {
    let mut result = Vec::with_capacity(messages.len());
    let mut i = 0;
    while i < messages.len() {
        let message = &messages[i];
        let has_tool_calls =
            message.role == MessageRole::Assistant && message.tool_calls.as_ref().is_some_and(|c| !c.is_empty());
        if has_tool_calls {
            let next_is_tool_result = messages.get(i + 1).is_some_and(|m| m.role == MessageRole::ToolResult);
            if next_is_tool_result {
                result.push(message.clone());
                result.push(messages[i + 1].clone());
                i += 2;
                continue;
            } else {
                i += 1;
                continue;
            }
        }
        result.push(message.clone());
        i += 1;
    }
    result
}

/// Adapts a session's stored history into the provider's flat `Message`
/// shape (content joined to a plain string; structured blocks are not
/// reflected here since no concrete provider wire format exists to target).
pub fn to_provider_messages(messages: &[SessionMessage]) -> Vec<Message> {
    use crate::provider::Role;
    messages
        .iter()
        .map(|m| Message {
            role: match m.role {
                MessageRole::System => Role::System,
                MessageRole::User | MessageRole::ToolResult => Role::User,
                MessageRole::Assistant => Role::Assistant,
            },
            content: match &m.content {
                MessageContent::Text(text) => text.clone(),
                MessageContent::Blocks(blocks) => blocks
                    .iter()
                    .filter_map(|b| match b {
                        skynet_sessions::types::ContentBlock::Text { text } => Some(text.clone()),
                        skynet_sessions::types::ContentBlock::Image { .. } => None,
                    })
                    .collect::<Vec<_>>()
                    .join("\n"),
            },
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use skynet_sessions::types::ToolCallRecord;

    fn msg(role: MessageRole, text: &str) -> SessionMessage {
        match role {
            MessageRole::User => SessionMessage::user(text),
            MessageRole::Assistant => SessionMessage::assistant(text),
            other => {
                let mut m = SessionMessage::user(text);
                m.role = other;
                m
            }
        }
    }

    #[test]
    fn check_flags_compression_above_80_percent() {
        let manager = ContextManager::new(CompactionStrategy::KeepRecent);
        let messages = vec![msg(MessageRole::User, &"x".repeat(400))];
        let window = manager.check(&messages, 100);
        assert!(window.should_compress);
    }

    #[test]
    fn compact_is_noop_under_budget() {
        let manager = ContextManager::new(CompactionStrategy::KeepRecent);
        let messages = vec![msg(MessageRole::User, "hi")];
        let compacted = manager.compact(&messages, 10_000);
        assert_eq!(compacted.len(), 1);
    }

    #[test]
    fn keep_recent_preserves_system_and_drops_oldest() {
        let manager = ContextManager::new(CompactionStrategy::KeepRecent);
        let messages = vec![
            msg(MessageRole::System, "sys"),
            msg(MessageRole::User, &"a".repeat(200)),
            msg(MessageRole::User, &"b".repeat(200)),
            msg(MessageRole::User, "recent"),
        ];
        let compacted = manager.compact(&messages, 20);
        assert_eq!(compacted[0].role, MessageRole::System);
        assert!(compacted.last().unwrap().content == MessageContent::Text("recent".into()));
    }

    #[test]
    fn keep_important_restores_original_order() {
        let manager = ContextManager::new(CompactionStrategy::KeepImportant);
        let messages = vec![
            msg(MessageRole::System, "sys"),
            msg(MessageRole::User, "u1"),
            msg(MessageRole::Assistant, "a1"),
            msg(MessageRole::User, "u2"),
        ];
        let compacted = manager.compact(&messages, 1_000);
        let roles: Vec<_> = compacted.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![MessageRole::System, MessageRole::User, MessageRole::Assistant, MessageRole::User]
        );
    }

    #[test]
    fn sliding_window_grows_from_both_ends() {
        let manager = ContextManager::new(CompactionStrategy::SlidingWindow);
        let messages = vec![
            msg(MessageRole::User, "first"),
            msg(MessageRole::User, &"mid".repeat(100)),
            msg(MessageRole::User, &"mid2".repeat(100)),
            msg(MessageRole::User, "last"),
        ];
        let compacted = manager.compact(&messages, 12);
        assert_eq!(compacted.first().unwrap().content, MessageContent::Text("first".into()));
        assert_eq!(compacted.last().unwrap().content, MessageContent::Text("last".into()));
    }

    #[test]
    fn orphaned_tool_call_dropped_without_matching_result() {
        let mut assistant = msg(MessageRole::Assistant, "calling");
        assistant.tool_calls =
            Some(vec![ToolCallRecord { id: "1".into(), name: "bash".into(), arguments: json!({}) }]);
        let messages = vec![msg(MessageRole::System, "sys"), assistant, msg(MessageRole::User, "next")];
        let manager = ContextManager::new(CompactionStrategy::KeepRecent);
        let compacted = manager.compact(&messages, 1_000);
        assert!(compacted.iter().all(|m| m.tool_calls.is_none()));
    }
}
