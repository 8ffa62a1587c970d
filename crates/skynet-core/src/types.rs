use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a user (UUIDv7 — time-sortable for easier log correlation).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Identifies which agent instance handles a session.
///
/// Always holds a *normalized* value (see [`normalize_agent_id`]) — construct
/// via [`AgentId::normalized`] rather than wrapping arbitrary strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentId(pub String);

impl AgentId {
    pub fn normalized(raw: &str) -> Self {
        Self(normalize_agent_id(raw))
    }

    /// The default single-agent setup uses "main".
    pub fn main() -> Self {
        Self("main".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AgentId {
    fn from(s: &str) -> Self {
        Self::normalized(s)
    }
}

/// Per-connection identifier (random UUID, not persisted).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnId(pub String);

impl ConnId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// User role hierarchy: admin > user > child.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    #[default]
    User,
    Child,
}

impl UserRole {
    pub fn is_admin(&self) -> bool {
        matches!(self, UserRole::Admin)
    }

    pub fn is_child(&self) -> bool {
        matches!(self, UserRole::Child)
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserRole::Admin => write!(f, "admin"),
            UserRole::User => write!(f, "user"),
            UserRole::Child => write!(f, "child"),
        }
    }
}

impl std::str::FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "admin" => Ok(UserRole::Admin),
            "user" => Ok(UserRole::User),
            "child" => Ok(UserRole::Child),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

// ---------------------------------------------------------------------------
// Identity normalization (spec.md §3 / §4.1)
// ---------------------------------------------------------------------------

/// Collapse `s` onto `[a-z0-9][a-z0-9_-]{0,63}`: lowercase, replace every
/// disallowed character with `-`, trim leading/trailing dashes, truncate to
/// 64 bytes. An empty result after trimming falls back to `default`.
fn normalize_identity(s: &str, default: &str) -> String {
    let lower = s.to_lowercase();
    let collapsed: String = lower
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '-' })
        .collect();
    let trimmed = collapsed.trim_matches('-');
    let truncated = if trimmed.len() > 64 { &trimmed[..64] } else { trimmed };
    if truncated.is_empty() {
        default.to_string()
    } else {
        truncated.to_string()
    }
}

pub fn normalize_agent_id(s: &str) -> String {
    normalize_identity(s, "main")
}

pub fn normalize_account_id(s: &str) -> String {
    normalize_identity(s, "default")
}

/// Scope for resolving a peer's DM into a session key (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DmScope {
    /// Collapse every DM to the agent's main session.
    Main,
    PerPeer,
    PerChannelPeer,
    PerAccountChannelPeer,
}

/// Canonical routing string `agent:<agentId>:<rest>` (spec.md §3/§4.1).
///
/// `rest` is never re-validated after construction — callers go through
/// [`build_agent_main_session_key`] / [`build_agent_peer_session_key`] (or
/// parse an existing key with [`parse_agent_session_key`]) rather than
/// assembling the string by hand.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey(pub String);

impl SessionKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SessionKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

pub fn build_agent_main_session_key(agent_id: &str) -> SessionKey {
    SessionKey(format!("agent:{}:main", normalize_agent_id(agent_id)))
}

/// Conversation kind driving which `<rest>` shape is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerKind {
    Dm,
    Group,
    Channel,
}

/// Build a session key for a channel-originated conversation.
///
/// `peer_id` is trimmed but NOT lowercased — external peer identifiers may
/// be case-sensitive. `channel`/`account_id` are normalized like agent ids.
pub fn build_agent_peer_session_key(
    agent_id: &str,
    channel: &str,
    kind: PeerKind,
    peer_id: &str,
    account_id: Option<&str>,
    dm_scope: DmScope,
) -> SessionKey {
    let agent = normalize_agent_id(agent_id);
    let peer = peer_id.trim();
    match kind {
        PeerKind::Group => {
            let chan = normalize_agent_id(channel);
            return SessionKey(format!("agent:{agent}:{chan}:group:{peer}"));
        }
        PeerKind::Channel => {
            let chan = normalize_agent_id(channel);
            return SessionKey(format!("agent:{agent}:{chan}:channel:{peer}"));
        }
        PeerKind::Dm => {}
    }

    match dm_scope {
        DmScope::Main => build_agent_main_session_key(agent_id),
        DmScope::PerPeer => SessionKey(format!("agent:{agent}:dm:{peer}")),
        DmScope::PerChannelPeer => {
            let chan = normalize_agent_id(channel);
            SessionKey(format!("agent:{agent}:{chan}:dm:{peer}"))
        }
        DmScope::PerAccountChannelPeer => {
            let chan = normalize_agent_id(channel);
            let acct = normalize_account_id(account_id.unwrap_or(""));
            SessionKey(format!("agent:{agent}:{chan}:{acct}:dm:{peer}"))
        }
    }
}

/// Result of parsing a canonical session key: `(agentId, rest)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSessionKey {
    pub agent_id: String,
    pub rest: String,
}

/// Parse `agent:<agentId>:<rest>`; `None` on any malformed input.
pub fn parse_agent_session_key(key: &str) -> Option<ParsedSessionKey> {
    let mut parts = key.splitn(3, ':');
    let prefix = parts.next()?;
    if prefix != "agent" {
        return None;
    }
    let agent_id = parts.next()?;
    let rest = parts.next()?;
    if agent_id.is_empty() || rest.is_empty() {
        return None;
    }
    Some(ParsedSessionKey {
        agent_id: agent_id.to_string(),
        rest: rest.to_string(),
    })
}

/// Accept a legacy short key (no `agent:` prefix) and rewrite it to canonical
/// form; keys already in canonical form pass through unchanged.
pub fn to_agent_store_session_key(legacy_or_canonical: &str, default_agent_id: &str) -> SessionKey {
    if legacy_or_canonical.starts_with("agent:") {
        return SessionKey(legacy_or_canonical.to_string());
    }
    SessionKey(format!(
        "agent:{}:{}",
        normalize_agent_id(default_agent_id),
        legacy_or_canonical
    ))
}

/// Strip the `agent:<agentId>:` prefix for callers outside the agent scope.
pub fn to_agent_request_session_key(key: &SessionKey) -> Option<String> {
    parse_agent_session_key(key.as_str()).map(|p| p.rest)
}

pub fn looks_like_session_key(s: &str) -> bool {
    s.starts_with("agent:") && s.splitn(3, ':').count() >= 3
}

pub fn is_subagent_session_key(rest: &str) -> bool {
    rest.starts_with("subagent:")
}

pub fn is_acp_session_key(rest: &str) -> bool {
    rest.starts_with("acp:")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_and_lowercases() {
        assert_eq!(normalize_agent_id("My Agent!"), "my-agent");
        assert_eq!(normalize_agent_id("  --weird--  "), "weird");
        assert_eq!(normalize_agent_id(""), "main");
        assert_eq!(normalize_account_id(""), "default");
    }

    #[test]
    fn normalize_truncates_to_64() {
        let long = "a".repeat(100);
        assert_eq!(normalize_agent_id(&long).len(), 64);
    }

    #[test]
    fn normalize_is_deterministic_for_equivalent_inputs() {
        assert_eq!(normalize_agent_id("Foo_Bar"), normalize_agent_id("foo_bar"));
    }

    #[test]
    fn main_session_key_shape() {
        assert_eq!(build_agent_main_session_key("Main").as_str(), "agent:main:main");
    }

    #[test]
    fn peer_session_key_scopes() {
        assert_eq!(
            build_agent_peer_session_key("a1", "telegram", PeerKind::Dm, "123", None, DmScope::Main)
                .as_str(),
            "agent:a1:main"
        );
        assert_eq!(
            build_agent_peer_session_key("a1", "telegram", PeerKind::Dm, "123", None, DmScope::PerPeer)
                .as_str(),
            "agent:a1:dm:123"
        );
        assert_eq!(
            build_agent_peer_session_key(
                "a1",
                "Telegram",
                PeerKind::Dm,
                "123",
                None,
                DmScope::PerChannelPeer
            )
            .as_str(),
            "agent:a1:telegram:dm:123"
        );
        assert_eq!(
            build_agent_peer_session_key(
                "a1",
                "telegram",
                PeerKind::Dm,
                "123",
                Some("acct1"),
                DmScope::PerAccountChannelPeer
            )
            .as_str(),
            "agent:a1:telegram:acct1:dm:123"
        );
        assert_eq!(
            build_agent_peer_session_key("a1", "telegram", PeerKind::Group, "g1", None, DmScope::Main)
                .as_str(),
            "agent:a1:telegram:group:g1"
        );
    }

    #[test]
    fn round_trip_parse() {
        let key = build_agent_peer_session_key(
            "a1",
            "telegram",
            PeerKind::Dm,
            "123",
            None,
            DmScope::PerChannelPeer,
        );
        let parsed = parse_agent_session_key(key.as_str()).unwrap();
        assert_eq!(parsed.agent_id, "a1");
        assert_eq!(parsed.rest, "telegram:dm:123");
    }

    #[test]
    fn parse_rejects_malformed() {
        assert!(parse_agent_session_key("not-a-key").is_none());
        assert!(parse_agent_session_key("agent:only-one").is_none());
        assert!(parse_agent_session_key("user:a1:main").is_none());
    }

    #[test]
    fn store_key_rewrites_legacy() {
        assert_eq!(
            to_agent_store_session_key("dm:123", "main").as_str(),
            "agent:main:dm:123"
        );
        assert_eq!(
            to_agent_store_session_key("agent:other:main", "main").as_str(),
            "agent:other:main"
        );
    }

    #[test]
    fn request_key_strips_prefix() {
        let key = build_agent_main_session_key("main");
        assert_eq!(to_agent_request_session_key(&key).unwrap(), "main");
    }

    #[test]
    fn looks_like_and_subagent_detection() {
        assert!(looks_like_session_key("agent:main:main"));
        assert!(!looks_like_session_key("main"));
        assert!(is_subagent_session_key("subagent:123"));
        assert!(is_acp_session_key("acp:123"));
        assert!(!is_subagent_session_key("dm:123"));
    }
}
