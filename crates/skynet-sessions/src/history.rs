//! Pure history-shaping functions (spec.md §4.2), split out from
//! [`crate::manager`] so they can be unit-tested without a database.

use crate::types::{Message, MessageRole};

/// Drop messages with missing/invalid role or empty content.
///
/// `Message::role` is already a typed enum, so "invalid role" can only
/// arise from data that failed to deserialize before reaching this point;
/// the remaining check is purely "empty content".
pub fn sanitize_history(messages: Vec<Message>) -> Vec<Message> {
    messages.into_iter().filter(|m| !m.content.is_empty()).collect()
}

/// Keep the last `n` `user` turns and everything that follows them.
///
/// `n <= 0` returns the input unchanged. Counting walks from the end so a
/// "turn" boundary is any `user` message; everything after the `n`th-from-
/// last user message (inclusive) survives.
pub fn limit_history_turns(messages: Vec<Message>, n: i64) -> Vec<Message> {
    if n <= 0 {
        return messages;
    }
    let user_positions: Vec<usize> = messages
        .iter()
        .enumerate()
        .filter(|(_, m)| m.role == MessageRole::User)
        .map(|(i, _)| i)
        .collect();

    if (user_positions.len() as i64) <= n {
        return messages;
    }

    let cutoff = user_positions[user_positions.len() - n as usize];
    messages.into_iter().skip(cutoff).collect()
}

/// Resolve the effective DM history limit for `(channel, user_id)`:
/// `channels.<channel>.dms.<userId>.historyLimit`, falling back to
/// `channels.<channel>.dmHistoryLimit` (spec.md §4.2).
pub fn resolve_dm_history_limit(
    channels: &skynet_core::config::ChannelsConfig,
    channel: &str,
    user_id: &str,
) -> Option<u32> {
    let entry = channels.history.get(channel)?;
    if let Some(over) = entry.dms.get(user_id) {
        if let Some(limit) = over.history_limit {
            return Some(limit);
        }
    }
    entry.dm_history_limit
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Message;

    #[test]
    fn sanitize_drops_empty_content() {
        let messages = vec![Message::user("hello"), Message::user("   "), Message::assistant("hi")];
        let out = sanitize_history(messages);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn limit_zero_or_negative_is_noop() {
        let messages = vec![Message::user("a"), Message::user("b")];
        assert_eq!(limit_history_turns(messages.clone(), 0).len(), 2);
        assert_eq!(limit_history_turns(messages, -5).len(), 2);
    }

    #[test]
    fn limit_keeps_last_n_user_turns_and_followups() {
        let messages = vec![
            Message::user("u1"),
            Message::assistant("a1"),
            Message::user("u2"),
            Message::assistant("a2"),
            Message::user("u3"),
            Message::assistant("a3"),
        ];
        let out = limit_history_turns(messages, 2);
        // last 2 user turns: u2 onward
        assert_eq!(out.len(), 4);
        assert_eq!(out[0].role, MessageRole::User);
        matches!(&out[0].content, crate::types::MessageContent::Text(s) if s == "u2");
    }

    #[test]
    fn limit_noop_when_fewer_user_turns_than_n() {
        let messages = vec![Message::user("u1"), Message::assistant("a1")];
        let out = limit_history_turns(messages, 5);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn resolve_dm_limit_prefers_per_user_override() {
        use skynet_core::config::{ChannelHistoryConfig, ChannelsConfig, DmHistoryOverride};
        use std::collections::HashMap;

        let mut dms = HashMap::new();
        dms.insert(
            "user-1".to_string(),
            DmHistoryOverride { history_limit: Some(7) },
        );
        let mut history = HashMap::new();
        history.insert(
            "telegram".to_string(),
            ChannelHistoryConfig { dm_history_limit: Some(20), dms },
        );
        let channels = ChannelsConfig { group_gating: Default::default(), history };

        assert_eq!(resolve_dm_history_limit(&channels, "telegram", "user-1"), Some(7));
        assert_eq!(resolve_dm_history_limit(&channels, "telegram", "user-2"), Some(20));
        assert_eq!(resolve_dm_history_limit(&channels, "discord", "user-1"), None);
    }
}
