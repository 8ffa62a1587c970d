use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

// Protocol constants — must match OpenClaw wire protocol exactly
pub const PROTOCOL_VERSION: u32 = 3;
pub const DEFAULT_PORT: u16 = 18789;
pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const MAX_PAYLOAD_BYTES: usize = 128 * 1024; // 128 KB hard cap per frame
pub const MAX_BUFFERED_BYTES: usize = 1024 * 1024; // 1 MB: slow consumer threshold
pub const HANDSHAKE_TIMEOUT_MS: u64 = 10_000; // close if client doesn't auth in 10s
pub const HEARTBEAT_INTERVAL_SECS: u64 = 30; // tick event cadence

/// Top-level config (skynet.toml + SKYNET_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkynetConfig {
    pub gateway: GatewayConfig,
    pub agent: AgentConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub cron: CronConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub channels: ChannelsConfig,
    #[serde(default)]
    pub auto_reply: AutoReplyConfig,
}

/// Cron subsystem configuration (spec.md §4.11/§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CronConfig {
    #[serde(default = "default_jobs_path")]
    pub jobs_path: String,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
}

impl Default for CronConfig {
    fn default() -> Self {
        Self {
            jobs_path: default_jobs_path(),
            log_dir: default_log_dir(),
        }
    }
}

fn default_jobs_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.skynet/jobs.json", home)
}

fn default_log_dir() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.skynet/cron-runs", home)
}

/// Global tool-policy configuration layer (spec.md §4.5).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ToolsConfig {
    #[serde(default)]
    pub allow: Vec<String>,
    #[serde(default)]
    pub deny: Vec<String>,
    #[serde(default)]
    pub owner_ids: Vec<String>,
}

impl Default for SkynetConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            gateway: GatewayConfig {
                port: DEFAULT_PORT,
                bind: DEFAULT_BIND.to_string(),
                auth: AuthConfig {
                    mode: AuthMode::Token,
                    token: Some("change-me".to_string()),
                    password: None,
                    allow_local_direct: true,
                    allow_tailscale: false,
                    trusted_proxies: Vec::new(),
                },
            },
            agent: AgentConfig {
                model: "claude-sonnet-4-6".to_string(),
                soul_path: None,
                id: default_agent_id(),
                dm_scope: crate::types::DmScope::Main,
            },
            cron: CronConfig::default(),
            tools: ToolsConfig::default(),
            channels: ChannelsConfig::default(),
            auto_reply: AutoReplyConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub mode: AuthMode,
    pub token: Option<String>,
    pub password: Option<String>,
    /// Loopback connections bypass auth entirely (spec.md §4.10 step 1).
    #[serde(default = "bool_true")]
    pub allow_local_direct: bool,
    /// Accept a Tailscale whois-verified identity in place of token/password.
    #[serde(default)]
    pub allow_tailscale: bool,
    /// Proxy addresses trusted to forward a real client IP.
    #[serde(default)]
    pub trusted_proxies: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum AuthMode {
    Token,
    Password,
    Tailscale,
    DeviceToken,
    TrustedProxy,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_model")]
    pub model: String,
    pub soul_path: Option<String>,
    /// Identity used when building canonical `agent:<id>:…` session keys
    /// (spec.md §3/§4.1). Not user-facing — just a routing namespace.
    #[serde(default = "default_agent_id")]
    pub id: String,
    /// How channel-originated DMs collapse into session keys (spec.md §3).
    #[serde(default = "default_dm_scope")]
    pub dm_scope: crate::types::DmScope,
}

fn default_dm_scope() -> crate::types::DmScope {
    crate::types::DmScope::Main
}

/// Auto-reply dispatch configuration (spec.md §4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoReplyConfig {
    /// Names recognized as `@mentions` of this agent in group chats.
    #[serde(default)]
    pub agent_names: Vec<String>,
    /// Case-insensitive keywords that activate the agent in group chats
    /// even without an explicit mention.
    #[serde(default)]
    pub activation_keywords: Vec<String>,
    /// Maximum number of recently-seen message fingerprints the dedupe
    /// cache retains before evicting the oldest (spec.md §4.8.1).
    #[serde(default = "default_dedupe_cache_size")]
    pub dedupe_cache_size: usize,
    /// Window during which a re-observed fingerprint still counts as a
    /// duplicate (spec.md §4.8.1).
    #[serde(default = "default_dedupe_ttl_secs")]
    pub dedupe_ttl_secs: u64,
    /// Require commands marked owner-only to come from `tools.owner_ids`.
    #[serde(default = "bool_true")]
    pub enforce_owner_only: bool,
}

impl Default for AutoReplyConfig {
    fn default() -> Self {
        Self {
            agent_names: Vec::new(),
            activation_keywords: Vec::new(),
            dedupe_cache_size: default_dedupe_cache_size(),
            dedupe_ttl_secs: default_dedupe_ttl_secs(),
            enforce_owner_only: true,
        }
    }
}

fn default_dedupe_cache_size() -> usize {
    10_000
}
fn default_dedupe_ttl_secs() -> u64 {
    300
}
fn default_agent_id() -> String {
    "main".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Per-channel DM history-limit overrides (spec.md §4.2).
///
/// Looked up as `channels.<channel>.dms.<userId>.historyLimit`, falling back
/// to `channels.<channel>.dmHistoryLimit`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChannelHistoryConfig {
    pub dm_history_limit: Option<u32>,
    #[serde(default)]
    pub dms: std::collections::HashMap<String, DmHistoryOverride>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DmHistoryOverride {
    pub history_limit: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChannelsConfig {
    #[serde(default)]
    pub group_gating: GroupGatingMode,
    #[serde(default)]
    pub history: std::collections::HashMap<String, ChannelHistoryConfig>,
}

/// Group-chat activation mode (spec.md §4.8.2).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum GroupGatingMode {
    Always,
    Mentions,
    Never,
}

impl Default for GroupGatingMode {
    fn default() -> Self {
        GroupGatingMode::Mentions
    }
}

fn bool_true() -> bool {
    true
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_model() -> String {
    "claude-sonnet-4-6".to_string()
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.skynet/skynet.db", home)
}

impl SkynetConfig {
    /// Load config from a TOML file with SKYNET_* env var overrides.
    ///
    /// Checks in order: explicit path argument, then `~/.skynet/skynet.toml`.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: SkynetConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("SKYNET_").split("_"))
            .extract()
            .map_err(|e| crate::error::SkynetError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Fatal configuration errors raise here rather than at first use
    /// (spec.md §7): token auth with no token configured, password auth
    /// with no password configured.
    pub fn validate(&self) -> crate::error::Result<()> {
        match self.gateway.auth.mode {
            AuthMode::Token if self.gateway.auth.token.is_none() => {
                Err(crate::error::SkynetError::Config(
                    "gateway auth mode is token, but no token was configured \
                     (set gateway.auth.token or SKYNET_GATEWAY_AUTH_TOKEN)"
                        .to_string(),
                ))
            }
            AuthMode::Password if self.gateway.auth.password.is_none() => {
                Err(crate::error::SkynetError::Config(
                    "gateway auth mode is password, but no password was configured"
                        .to_string(),
                ))
            }
            _ => Ok(()),
        }
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.skynet/skynet.toml", home)
}
