//! Auto-reply dispatcher (spec.md §4.8): turns one inbound channel message
//! into zero or more outbound replies, running dedupe, group gating, and
//! per-turn directive extraction ahead of the agent turn loop, then feeding
//! the turn's streamed text through a [`StreamingDirectiveAccumulator`] so
//! reply-routing and media directives reach the channel send.
//!
//! Command handling is intentionally narrow: the predecessor's own command
//! dispatch (`dispatch.py::dispatch_command`) delegates to a registry this
//! pack doesn't include, so only `/reset` — clearing the session, a
//! behavior fully groundable against `skynet_sessions::SessionStore` — is
//! implemented as a built-in. Anything else starting with `/` is treated as
//! ordinary message text, not silently mis-handled as an unimplemented
//! command.

use std::num::NonZeroUsize;
use std::sync::{LazyLock, Mutex as StdMutex};
use std::time::{Duration, Instant};

use regex::Regex;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{info, warn};

use lru::LruCache;

use skynet_channels::manager::ChannelManager;
use skynet_channels::types::{ChannelStatus, InboundMessage, MessageFormat, OutboundMessage};
use skynet_core::config::{AutoReplyConfig, GroupGatingMode};
use skynet_core::types::{build_agent_peer_session_key, DmScope, PeerKind, SessionKey};
use skynet_sessions::SessionStore;

use crate::directives::StreamingDirectiveAccumulator;
use crate::thinking::ThinkingLevel;
use crate::turn_loop::{AgentTurnLoop, TurnEvent};

static MENTION_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"@(\w+)").unwrap());
static DIRECTIVE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:^|\s)/(think|verbose|elevated|reasoning|notice|status)(?::(\S+))?").unwrap());
static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Fingerprint cache for spec.md §4.8.1 dedupe: `(channel, chatId, messageId)`
/// re-observed within `ttl` is dropped as a duplicate.
pub struct DedupeCache {
    seen: StdMutex<LruCache<(String, String, String), Instant>>,
    ttl: Duration,
}

impl DedupeCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let cap = NonZeroUsize::new(capacity.max(1)).unwrap();
        Self {
            seen: StdMutex::new(LruCache::new(cap)),
            ttl,
        }
    }

    /// Returns `true` if this fingerprint was already seen within `ttl`.
    /// Always records the fingerprint as seen, refreshing its position.
    pub fn is_duplicate(&self, channel: &str, chat_id: &str, message_id: &str) -> bool {
        let key = (channel.to_string(), chat_id.to_string(), message_id.to_string());
        let mut cache = self.seen.lock().unwrap();
        let duplicate = cache
            .get(&key)
            .is_some_and(|seen_at| seen_at.elapsed() < self.ttl);
        cache.put(key, Instant::now());
        duplicate
    }
}

/// Outcome of [`check_group_gating`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupGatingResult {
    pub should_process: bool,
    pub reason: &'static str,
}

/// Decide whether a group-chat message should reach the agent (spec.md §4.8.2).
/// 1:1 conversations always pass — gating only applies to multi-party chats.
pub fn check_group_gating(
    text: &str,
    is_group: bool,
    mode: GroupGatingMode,
    agent_names: &[String],
    activation_keywords: &[String],
) -> GroupGatingResult {
    if !is_group {
        return GroupGatingResult { should_process: true, reason: "not_group" };
    }
    match mode {
        GroupGatingMode::Never => GroupGatingResult { should_process: false, reason: "mode_never" },
        GroupGatingMode::Always => GroupGatingResult { should_process: true, reason: "mode_always" },
        GroupGatingMode::Mentions => {
            if has_mention(text, agent_names) {
                return GroupGatingResult { should_process: true, reason: "mentioned" };
            }
            let lower = text.to_lowercase();
            if activation_keywords.iter().any(|k| lower.contains(&k.to_lowercase())) {
                return GroupGatingResult { should_process: true, reason: "keyword_match" };
            }
            GroupGatingResult { should_process: false, reason: "no_mention_or_keyword" }
        }
    }
}

fn has_mention(text: &str, agent_names: &[String]) -> bool {
    if agent_names.is_empty() {
        return false;
    }
    MENTION_RE.captures_iter(text).any(|caps| {
        let name = caps[1].to_lowercase();
        agent_names.iter().any(|n| n.to_lowercase() == name)
    })
}

fn strip_mentions(text: &str) -> String {
    MENTION_RE.replace_all(text, "").trim().to_string()
}

/// Per-turn overrides extracted from `/name(:value)?` directives in the
/// user's message (spec.md §4.8 step 4). Unlike the streaming directives in
/// [`crate::directives`] (LLM output), these are parsed from inbound text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TurnDirectives {
    pub thinking: Option<ThinkingLevel>,
    pub verbose: bool,
    pub elevated: bool,
    pub notice: Option<String>,
    pub status: bool,
}

/// Strip recognized directives from `text`, returning the cleaned text and
/// the extracted overrides. `/think`/`/reasoning` accept an optional
/// `ThinkingLevel` slug and default to `Medium` when bare.
pub fn extract_turn_directives(text: &str) -> (String, TurnDirectives) {
    let mut directives = TurnDirectives::default();
    for caps in DIRECTIVE_RE.captures_iter(text) {
        let name = caps[1].to_lowercase();
        let value = caps.get(2).map(|m| m.as_str());
        match name.as_str() {
            "think" | "reasoning" => {
                directives.thinking =
                    Some(value.and_then(ThinkingLevel::parse).unwrap_or(ThinkingLevel::Medium));
            }
            "verbose" => directives.verbose = true,
            "elevated" => directives.elevated = true,
            "status" => directives.status = true,
            "notice" => directives.notice = value.map(|v| v.replace('_', " ")),
            _ => {}
        }
    }
    let cleaned = DIRECTIVE_RE.replace_all(text, " ");
    let cleaned = WHITESPACE_RE.replace_all(cleaned.trim(), " ").into_owned();
    (cleaned, directives)
}

/// Candidate identity strings a sender may be matched against an owner list
/// under (spec.md §4.8 step 2): `{<channel>:<senderId>, senderId, e164, from}`.
pub fn candidate_identity_set(
    channel: &str,
    sender_id: &str,
    sender_e164: Option<&str>,
    from: Option<&str>,
) -> Vec<String> {
    let mut ids = vec![format!("{channel}:{sender_id}"), sender_id.to_string()];
    ids.extend(sender_e164.map(str::to_string));
    ids.extend(from.map(str::to_string));
    ids
}

pub fn is_owner(candidate_ids: &[String], owner_ids: &[String]) -> bool {
    owner_ids.iter().any(|owner| candidate_ids.iter().any(|c| c == owner))
}

/// Result of [`AutoReplyDispatcher::dispatch_inbound`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Fingerprint seen within the dedupe TTL; not processed.
    Duplicate,
    /// `/reset` attempted by a non-owner while enforcement is on.
    Denied { reason: String },
    /// Group gating declined to process this message.
    GatedOut { reason: &'static str },
    /// Ran `/reset` and short-circuited without invoking the agent.
    CommandHandled { command: String },
    /// Message produced no renderable reply (e.g. `[[silent]]`/`NO_REPLY`).
    Empty,
    /// One or more replies were sent to the channel.
    Sent { replies: usize },
}

/// Coordinates dedupe, gating, directive extraction, and the streamed
/// reply hand-off from one [`AgentTurnLoop`] to a [`ChannelManager`].
pub struct AutoReplyDispatcher {
    config: AutoReplyConfig,
    group_gating: GroupGatingMode,
    agent_id: String,
    dm_scope: DmScope,
    dedupe: DedupeCache,
}

impl AutoReplyDispatcher {
    pub fn new(
        config: AutoReplyConfig,
        group_gating: GroupGatingMode,
        agent_id: String,
        dm_scope: DmScope,
    ) -> Self {
        let dedupe = DedupeCache::new(config.dedupe_cache_size, Duration::from_secs(config.dedupe_ttl_secs));
        Self { config, group_gating, agent_id, dm_scope, dedupe }
    }

    /// Build the session key a given inbound message routes to, per
    /// spec.md §3's `(agentId, channel, kind, peerId, accountId?, dmScope)`.
    pub fn session_key_for(&self, msg: &InboundMessage) -> SessionKey {
        let kind = if msg.is_group { PeerKind::Group } else { PeerKind::Dm };
        build_agent_peer_session_key(
            &self.agent_id,
            &msg.channel,
            kind,
            &msg.sender_id,
            msg.account_id.as_deref(),
            self.dm_scope,
        )
    }

    /// Run the full inbound pipeline for one message: dedupe → command
    /// detection → group gating → directive extraction → agent turn →
    /// streamed reply delivery.
    pub async fn dispatch_inbound(
        &self,
        msg: &InboundMessage,
        sessions: &SessionStore,
        turn_loop: &AgentTurnLoop,
        channels: &AsyncMutex<ChannelManager>,
        owner_ids: &[String],
    ) -> DispatchOutcome {
        if self.dedupe.is_duplicate(&msg.channel, &msg.chat_id, &msg.message_id) {
            info!(channel = %msg.channel, message_id = %msg.message_id, "dropping duplicate inbound message");
            return DispatchOutcome::Duplicate;
        }

        let trimmed = msg.content.trim();
        if let Some(rest) = trimmed.strip_prefix("/reset") {
            if rest.is_empty() || rest.starts_with(char::is_whitespace) {
                let candidates =
                    candidate_identity_set(&msg.channel, &msg.sender_id, None, msg.account_id.as_deref());
                if self.config.enforce_owner_only && !is_owner(&candidates, owner_ids) {
                    return DispatchOutcome::Denied {
                        reason: "/reset is restricted to configured owners".to_string(),
                    };
                }
                let key = self.session_key_for(msg);
                if let Err(e) = sessions.clear(&key) {
                    warn!(error = %e, "auto-reply /reset failed to clear session");
                }
                return DispatchOutcome::CommandHandled { command: "reset".to_string() };
            }
        }

        let gating = check_group_gating(
            trimmed,
            msg.is_group,
            self.group_gating,
            &self.config.agent_names,
            &self.config.activation_keywords,
        );
        if !gating.should_process {
            return DispatchOutcome::GatedOut { reason: gating.reason };
        }

        let key = self.session_key_for(msg);
        if let Err(e) = sessions.get_or_create(&key) {
            warn!(error = %e, "auto-reply failed to materialize session row");
        }

        let cleaned = strip_mentions(trimmed);
        let (cleaned, turn_directives) = extract_turn_directives(&cleaned);
        if cleaned.is_empty() {
            return DispatchOutcome::Empty;
        }

        if let Some(level) = turn_directives.thinking {
            turn_loop.set_thinking_level(level).await;
        }

        let mut system_prompt = None;
        if turn_directives.verbose || turn_directives.elevated || turn_directives.notice.is_some() {
            let mut notes = Vec::new();
            if turn_directives.verbose {
                notes.push("Respond in detail; the user asked for verbose output.".to_string());
            }
            if turn_directives.elevated {
                notes.push("This turn was marked elevated by the sender.".to_string());
            }
            if let Some(notice) = &turn_directives.notice {
                notes.push(format!("Note from sender: {notice}"));
            }
            system_prompt = Some(notes.join(" "));
        }
        if turn_directives.status {
            system_prompt = Some(format!(
                "{} Include a brief status line (model, turn count) in your reply.",
                system_prompt.unwrap_or_default()
            ));
        }

        let mut accumulator = StreamingDirectiveAccumulator::new();
        let mut rx = turn_loop.subscribe();
        let mut replies_sent = 0usize;

        // Race the turn's completion against its own event stream so each
        // `TextDelta` is handed to the accumulator as it arrives rather than
        // drained from the broadcast buffer only after the whole turn ends.
        let mut prompt_fut = Box::pin(turn_loop.prompt(vec![cleaned], system_prompt, None));
        let reply_result = loop {
            tokio::select! {
                biased;
                res = &mut prompt_fut => break res,
                Ok(event) = rx.recv() => {
                    if let TurnEvent::TextDelta { delta } = event {
                        if let Some(parsed) = accumulator.consume(&delta, false) {
                            if self.deliver(msg, &parsed, channels).await {
                                replies_sent += 1;
                            }
                        }
                    }
                }
            }
        };

        match reply_result {
            Ok(_messages) => {
                if let Some(parsed) = accumulator.consume("", true) {
                    if self.deliver(msg, &parsed, channels).await {
                        replies_sent += 1;
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "auto-reply agent turn failed");
            }
        }

        if replies_sent == 0 {
            DispatchOutcome::Empty
        } else {
            DispatchOutcome::Sent { replies: replies_sent }
        }
    }

    async fn deliver(
        &self,
        msg: &InboundMessage,
        parsed: &crate::directives::ReplyDirectiveParseResult,
        channels: &AsyncMutex<ChannelManager>,
    ) -> bool {
        if parsed.is_silent {
            return false;
        }
        let reply_to = if parsed.reply_to_current {
            Some(msg.message_id.clone())
        } else {
            parsed.reply_to_id.clone()
        };

        let outbound = OutboundMessage {
            channel: msg.channel.clone(),
            recipient_id: msg.chat_id.clone(),
            content: parsed.text.clone(),
            format: MessageFormat::PlainText,
            media_url: parsed.media_url.clone().or_else(|| parsed.media_urls.first().cloned()),
            audio_as_voice: parsed.audio_as_voice,
            reply_to,
        };

        let guard = channels.lock().await;
        let Some(adapter) = guard.get(&msg.channel) else {
            warn!(channel = %msg.channel, "auto-reply: channel not registered");
            return false;
        };
        if !matches!(adapter.status(), ChannelStatus::Connected) {
            warn!(channel = %msg.channel, "auto-reply: channel not connected");
            return false;
        }
        match adapter.send(&outbound).await {
            Ok(()) => true,
            Err(e) => {
                warn!(channel = %msg.channel, error = %e, "auto-reply: send failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(is_group: bool, content: &str) -> InboundMessage {
        InboundMessage {
            channel: "telegram".to_string(),
            sender_id: "u1".to_string(),
            sender_name: None,
            content: content.to_string(),
            timestamp: "2026-01-01T00:00:00Z".to_string(),
            raw_payload: None,
            chat_id: "chat1".to_string(),
            message_id: "m1".to_string(),
            is_group,
            mentions: Vec::new(),
            reply_to: None,
            account_id: None,
        }
    }

    #[test]
    fn dm_always_passes_gating() {
        let result = check_group_gating("hi", false, GroupGatingMode::Mentions, &[], &[]);
        assert!(result.should_process);
        assert_eq!(result.reason, "not_group");
    }

    #[test]
    fn group_mentions_mode_requires_mention() {
        let agent_names = vec!["skynet".to_string()];
        let no_mention = check_group_gating("hello there", true, GroupGatingMode::Mentions, &agent_names, &[]);
        assert!(!no_mention.should_process);
        let mentioned = check_group_gating("hey @skynet", true, GroupGatingMode::Mentions, &agent_names, &[]);
        assert!(mentioned.should_process);
        assert_eq!(mentioned.reason, "mentioned");
    }

    #[test]
    fn group_always_mode_ignores_mentions() {
        let result = check_group_gating("anything", true, GroupGatingMode::Always, &[], &[]);
        assert!(result.should_process);
    }

    #[test]
    fn group_never_mode_blocks_even_with_mention() {
        let agent_names = vec!["skynet".to_string()];
        let result = check_group_gating("hey @skynet", true, GroupGatingMode::Never, &agent_names, &[]);
        assert!(!result.should_process);
    }

    #[test]
    fn activation_keyword_triggers_processing() {
        let result = check_group_gating(
            "can someone help me deploy this",
            true,
            GroupGatingMode::Mentions,
            &[],
            &["deploy".to_string()],
        );
        assert!(result.should_process);
        assert_eq!(result.reason, "keyword_match");
    }

    #[test]
    fn extract_directives_strips_and_normalizes() {
        let (text, directives) = extract_turn_directives("/think:high please summarize /notice:be_careful");
        assert_eq!(text, "please summarize");
        assert_eq!(directives.thinking, Some(ThinkingLevel::High));
        assert_eq!(directives.notice.as_deref(), Some("be careful"));
    }

    #[test]
    fn bare_think_defaults_to_medium() {
        let (_, directives) = extract_turn_directives("/think explain this");
        assert_eq!(directives.thinking, Some(ThinkingLevel::Medium));
    }

    #[test]
    fn owner_check_matches_any_candidate() {
        let owners = vec!["telegram:123".to_string()];
        let candidates = candidate_identity_set("telegram", "123", None, None);
        assert!(is_owner(&candidates, &owners));
        assert!(!is_owner(&candidates, &["telegram:999".to_string()]));
    }

    #[test]
    fn dedupe_cache_flags_reobserved_fingerprint() {
        let cache = DedupeCache::new(10, Duration::from_secs(60));
        assert!(!cache.is_duplicate("telegram", "c1", "m1"));
        assert!(cache.is_duplicate("telegram", "c1", "m1"));
        assert!(!cache.is_duplicate("telegram", "c1", "m2"));
    }

    #[test]
    fn strip_mentions_removes_at_tokens() {
        assert_eq!(strip_mentions("hey @skynet how are you"), "hey how are you");
    }

    #[allow(dead_code)]
    fn _use_msg_helper() {
        let _ = msg(true, "x");
    }
}
