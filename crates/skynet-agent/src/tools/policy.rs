//! Tool allow/deny policy: aliases, groups, profiles (spec.md §4.5).

use std::collections::HashSet;

use skynet_core::config::ToolsConfig;

/// `{exec→bash, apply-patch→apply_patch, read→read_file, write→write_file,
/// edit→edit_file}` (spec.md §4.5).
fn normalize_alias(name: &str) -> &str {
    match name {
        "exec" => "bash",
        "apply-patch" => "apply_patch",
        "read" => "read_file",
        "write" => "write_file",
        "edit" => "edit_file",
        other => other,
    }
}

pub fn normalize_tool_name(name: &str) -> String {
    normalize_alias(name.trim().to_lowercase().as_str()).to_string()
}

fn tool_group(name: &str) -> Option<&'static [&'static str]> {
    match name {
        "group:memory" => Some(&["memory_search", "memory_get"]),
        "group:web" => Some(&["web_search", "web_fetch"]),
        "group:fs" => Some(&["read_file", "write_file", "edit_file", "apply_patch"]),
        "group:runtime" => Some(&["bash", "process"]),
        "group:sessions" => Some(&[
            "sessions_list",
            "sessions_history",
            "sessions_send",
            "sessions_spawn",
            "session_status",
        ]),
        "group:ui" => Some(&["browser", "canvas"]),
        "group:automation" => Some(&["cron", "gateway"]),
        "group:messaging" => Some(&["message"]),
        "group:nodes" => Some(&["nodes"]),
        "group:openclaw" => Some(&[
            "browser",
            "canvas",
            "nodes",
            "cron",
            "message",
            "gateway",
            "agents_list",
            "sessions_list",
            "sessions_history",
            "sessions_send",
            "sessions_spawn",
            "session_status",
            "memory_search",
            "memory_get",
            "web_search",
            "web_fetch",
            "image",
        ]),
        _ => None,
    }
}

/// Tool names restricted to the configured owner(s) (spec.md §4.5).
const OWNER_ONLY_TOOL_NAMES: &[&str] = &["whatsapp_login"];

pub fn is_owner_only_tool_name(name: &str) -> bool {
    OWNER_ONLY_TOOL_NAMES.contains(&normalize_tool_name(name).as_str())
}

/// Drop owner-only tools from `tools` unless `sender_is_owner`.
pub fn apply_owner_only_tool_policy(tools: Vec<String>, sender_is_owner: bool) -> Vec<String> {
    if sender_is_owner {
        return tools;
    }
    tools.into_iter().filter(|t| !is_owner_only_tool_name(t)).collect()
}

/// Expand group references to individual tool names, normalizing aliases
/// first and de-duplicating while preserving order.
pub fn expand_tool_groups(names: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut result = Vec::new();
    for raw in names {
        let normalized = normalize_tool_name(raw);
        let expanded: Vec<&str> = match tool_group(&normalized) {
            Some(group) => group.to_vec(),
            None => vec![normalized.as_str()],
        };
        for item in expanded {
            if seen.insert(item.to_string()) {
                result.push(item.to_string());
            }
        }
    }
    result
}

/// Allow/deny policy. Deny always wins; an empty allow list means
/// unrestricted.
#[derive(Debug, Clone, Default)]
pub struct ToolPolicy {
    pub allow: Vec<String>,
    pub deny: Vec<String>,
}

impl ToolPolicy {
    pub fn new(allow: Vec<String>, deny: Vec<String>) -> Self {
        Self { allow, deny }
    }

    pub fn is_allowed(&self, tool_name: &str) -> bool {
        let normalized = normalize_tool_name(tool_name);
        if self.deny.iter().any(|d| normalize_tool_name(d) == normalized) {
            return false;
        }
        if !self.allow.is_empty() {
            if self.allow.iter().any(|a| a == "*") {
                return true;
            }
            let expanded = expand_tool_groups(&self.allow);
            return expanded.contains(&normalized);
        }
        true
    }
}

/// One of the four named tool profiles (spec.md §4.5).
pub fn profile_policy(profile: &str) -> Option<ToolPolicy> {
    match profile {
        "minimal" => Some(ToolPolicy::new(vec!["session_status".into()], vec![])),
        "coding" => Some(ToolPolicy::new(
            vec![
                "group:fs".into(),
                "group:runtime".into(),
                "group:sessions".into(),
                "group:memory".into(),
                "image".into(),
            ],
            vec![],
        )),
        "messaging" => Some(ToolPolicy::new(
            vec![
                "group:messaging".into(),
                "sessions_list".into(),
                "sessions_history".into(),
                "sessions_send".into(),
                "session_status".into(),
            ],
            vec![],
        )),
        "full" => None, // no restrictions
        _ => None,
    }
}

/// Sandbox scope: applies to every session, only non-main sessions, or never.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxMode {
    Off,
    NonMain,
    All,
}

/// Resolve the effective allow/deny chain — global config, then an optional
/// named profile, then an optional sandbox policy for non-main sessions —
/// and answer whether `tool_name` survives it (spec.md §4.5: "profile
/// allow/deny is further constrained by global tools.allow/deny, per-agent
/// policy, and a sandbox policy").
pub struct ToolPolicyResolver<'a> {
    global: &'a ToolsConfig,
    profile: Option<&'a str>,
    sandbox_mode: SandboxMode,
    sandbox_policy: Option<ToolPolicy>,
}

impl<'a> ToolPolicyResolver<'a> {
    pub fn new(global: &'a ToolsConfig) -> Self {
        Self { global, profile: None, sandbox_mode: SandboxMode::Off, sandbox_policy: None }
    }

    pub fn with_profile(mut self, profile: &'a str) -> Self {
        self.profile = Some(profile);
        self
    }

    pub fn with_sandbox(mut self, mode: SandboxMode, policy: ToolPolicy) -> Self {
        self.sandbox_mode = mode;
        self.sandbox_policy = Some(policy);
        self
    }

    pub fn is_allowed(&self, tool_name: &str, is_main_session: bool) -> (bool, Option<String>) {
        let mut policies: Vec<ToolPolicy> = Vec::new();

        if !self.global.allow.is_empty() || !self.global.deny.is_empty() {
            policies.push(ToolPolicy::new(self.global.allow.clone(), self.global.deny.clone()));
        }
        if let Some(profile) = self.profile {
            if let Some(p) = profile_policy(profile) {
                policies.push(ToolPolicy::new(expand_tool_groups(&p.allow), expand_tool_groups(&p.deny)));
            }
        }
        let apply_sandbox = match self.sandbox_mode {
            SandboxMode::Off => false,
            SandboxMode::All => true,
            SandboxMode::NonMain => !is_main_session,
        };
        if apply_sandbox {
            if let Some(p) = &self.sandbox_policy {
                policies.push(p.clone());
            }
        }

        for policy in &policies {
            if !policy.is_allowed(tool_name) {
                return (false, Some(format!("Tool '{tool_name}' denied by policy")));
            }
        }
        (true, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_normalize() {
        assert_eq!(normalize_tool_name("exec"), "bash");
        assert_eq!(normalize_tool_name("Read"), "read_file");
        assert_eq!(normalize_tool_name("apply-patch"), "apply_patch");
        assert_eq!(normalize_tool_name("bash"), "bash");
    }

    #[test]
    fn expand_groups_dedupes_and_preserves_order() {
        let names = vec!["group:fs".to_string(), "bash".to_string(), "read".to_string()];
        let expanded = expand_tool_groups(&names);
        assert_eq!(
            expanded,
            vec!["read_file", "write_file", "edit_file", "apply_patch", "bash"]
        );
    }

    #[test]
    fn deny_overrides_allow() {
        let policy = ToolPolicy::new(vec!["bash".into()], vec!["bash".into()]);
        assert!(!policy.is_allowed("bash"));
    }

    #[test]
    fn empty_allow_means_unrestricted() {
        let policy = ToolPolicy::default();
        assert!(policy.is_allowed("anything"));
    }

    #[test]
    fn minimal_profile_only_allows_session_status() {
        let policy = profile_policy("minimal").unwrap();
        assert!(policy.is_allowed("session_status"));
        assert!(!policy.is_allowed("bash"));
    }

    #[test]
    fn full_profile_has_no_restrictions() {
        assert!(profile_policy("full").is_none());
    }

    #[test]
    fn owner_only_tool_filtered_for_non_owner() {
        let tools = vec!["bash".to_string(), "whatsapp_login".to_string()];
        let filtered = apply_owner_only_tool_policy(tools.clone(), false);
        assert_eq!(filtered, vec!["bash".to_string()]);
        let kept = apply_owner_only_tool_policy(tools, true);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn resolver_sandbox_applies_only_to_non_main_when_configured() {
        let global = ToolsConfig::default();
        let sandbox = ToolPolicy::new(vec![], vec!["bash".into()]);
        let resolver = ToolPolicyResolver::new(&global).with_sandbox(SandboxMode::NonMain, sandbox);
        assert!(resolver.is_allowed("bash", true).0);
        assert!(!resolver.is_allowed("bash", false).0);
    }
}
