//! Well-known WS method names (spec.md §4.10 "Method surface").
//!
//! Every name below is dispatchable — the gateway never returns
//! `METHOD_NOT_FOUND` for a name listed here. Methods naming a subsystem
//! this repo doesn't implement (tts, wizard, voicewake, web login, plugins,
//! node beyond `node.list`, `config.apply`, `logs.tail`,
//! `exec.approval.*`) still route to a handler, which returns `UNAVAILABLE`
//! naming the missing subsystem — matching spec.md §7's wording exactly.

// handshake
pub const CONNECT: &str = "connect";

// liveness / introspection
pub const HEALTH: &str = "health";
pub const STATUS: &str = "status";
pub const MODELS_LIST: &str = "models.list";

// config
pub const CONFIG_GET: &str = "config.get";
pub const CONFIG_SET: &str = "config.set";
pub const CONFIG_PATCH: &str = "config.patch";
pub const CONFIG_APPLY: &str = "config.apply";

// agent turn
pub const AGENT: &str = "agent";
pub const AGENT_WAIT: &str = "agent.wait";
pub const AGENT_STATUS: &str = "agent.status";
pub const AGENT_LIST: &str = "agent.list";

// chat
pub const CHAT_SEND: &str = "chat.send";
pub const CHAT_ABORT: &str = "chat.abort";
pub const CHAT_HISTORY: &str = "chat.history";
pub const CHAT_INJECT: &str = "chat.inject";

// sessions
pub const SESSIONS_LIST: &str = "sessions.list";
pub const SESSIONS_PREVIEW: &str = "sessions.preview";
pub const SESSIONS_RESOLVE: &str = "sessions.resolve";
pub const SESSIONS_PATCH: &str = "sessions.patch";
pub const SESSIONS_RESET: &str = "sessions.reset";
pub const SESSIONS_DELETE: &str = "sessions.delete";
pub const SESSIONS_COMPACT: &str = "sessions.compact";

// channels
pub const CHANNELS_LIST: &str = "channels.list";
pub const CHANNELS_STATUS: &str = "channels.status";
pub const CHANNELS_CONNECT: &str = "channels.connect";
pub const CHANNELS_DISCONNECT: &str = "channels.disconnect";
pub const CHANNELS_SEND: &str = "channels.send";
pub const CHANNELS_LOGOUT: &str = "channels.logout";

// cron / scheduler
pub const CRON_LIST: &str = "cron.list";
pub const CRON_STATUS: &str = "cron.status";
pub const CRON_ADD: &str = "cron.add";
pub const CRON_UPDATE: &str = "cron.update";
pub const CRON_REMOVE: &str = "cron.remove";
pub const CRON_DELETE: &str = "cron.delete"; // alias kept for back-compat clients
pub const CRON_RUN: &str = "cron.run";
pub const CRON_RUNS: &str = "cron.runs";

// device pairing / tokens
pub const DEVICE_PAIR_LIST: &str = "device.pair.list";
pub const DEVICE_PAIR_APPROVE: &str = "device.pair.approve";
pub const DEVICE_PAIR_REJECT: &str = "device.pair.reject";
pub const DEVICE_TOKEN_ROTATE: &str = "device.token.rotate";
pub const DEVICE_TOKEN_REVOKE: &str = "device.token.revoke";

// exec approval (out of scope — UNAVAILABLE)
pub const EXEC_APPROVAL_REQUEST: &str = "exec.approval.request";
pub const EXEC_APPROVAL_RESOLVE: &str = "exec.approval.resolve";
pub const EXEC_APPROVAL_LIST: &str = "exec.approval.list";
pub const EXEC_APPROVAL_APPROVE: &str = "exec.approval.approve";
pub const EXEC_APPROVAL_DENY: &str = "exec.approval.deny";
pub const EXEC_APPROVAL_TIMEOUT: &str = "exec.approval.timeout";

// logs (out of scope — UNAVAILABLE)
pub const LOGS_TAIL: &str = "logs.tail";

// memory (out of scope — UNAVAILABLE; semantic search dropped per DESIGN.md)
pub const MEMORY_SEARCH: &str = "memory.search";
pub const MEMORY_ADD: &str = "memory.add";
pub const MEMORY_SYNC: &str = "memory.sync";

// node (multi-node clustering; only `node.list` is in scope)
pub const NODE_LIST: &str = "node.list";
pub const NODE_DESCRIBE: &str = "node.describe";
pub const NODE_INVOKE: &str = "node.invoke";
pub const NODE_REGISTER: &str = "node.register";
pub const NODE_UNREGISTER: &str = "node.unregister";
pub const NODE_STATUS: &str = "node.status";
pub const NODE_UPDATE: &str = "node.update";
pub const NODE_CAPABILITIES: &str = "node.capabilities";

// plugins (out of scope — UNAVAILABLE)
pub const PLUGINS_LIST: &str = "plugins.list";
pub const PLUGINS_INSTALL: &str = "plugins.install";
pub const PLUGINS_UNINSTALL: &str = "plugins.uninstall";
pub const PLUGINS_ENABLE: &str = "plugins.enable";
pub const PLUGINS_DISABLE: &str = "plugins.disable";

// tts (out of scope — UNAVAILABLE)
pub const TTS_STATUS: &str = "tts.status";
pub const TTS_ENABLE: &str = "tts.enable";
pub const TTS_DISABLE: &str = "tts.disable";
pub const TTS_CONVERT: &str = "tts.convert";
pub const TTS_PROVIDERS: &str = "tts.providers";

// system
pub const SYSTEM_PRESENCE: &str = "system.presence";
pub const SYSTEM_EVENT: &str = "system.event";
pub const SYSTEM_SHUTDOWN: &str = "system.shutdown";
pub const SYSTEM_RESTART: &str = "system.restart";

// voicewake (out of scope — UNAVAILABLE)
pub const VOICEWAKE_GET: &str = "voicewake.get";
pub const VOICEWAKE_SET: &str = "voicewake.set";

// web login (out of scope — UNAVAILABLE)
pub const WEB_LOGIN_START: &str = "web.login.start";
pub const WEB_LOGIN_WAIT: &str = "web.login.wait";

// wizard (out of scope — UNAVAILABLE)
pub const WIZARD_START: &str = "wizard.start";
pub const WIZARD_NEXT: &str = "wizard.next";
pub const WIZARD_CANCEL: &str = "wizard.cancel";
pub const WIZARD_STATUS: &str = "wizard.status";

/// Method names whose subsystem this repo doesn't implement — dispatch
/// registers them so the name is recognized, but every handler short-circuits
/// to `UNAVAILABLE` naming the subsystem (spec.md §7).
pub const UNAVAILABLE_METHODS: &[&str] = &[
    CONFIG_APPLY,
    EXEC_APPROVAL_REQUEST,
    EXEC_APPROVAL_RESOLVE,
    EXEC_APPROVAL_LIST,
    EXEC_APPROVAL_APPROVE,
    EXEC_APPROVAL_DENY,
    EXEC_APPROVAL_TIMEOUT,
    LOGS_TAIL,
    MEMORY_SEARCH,
    MEMORY_ADD,
    MEMORY_SYNC,
    NODE_DESCRIBE,
    NODE_INVOKE,
    NODE_REGISTER,
    NODE_UNREGISTER,
    NODE_STATUS,
    NODE_UPDATE,
    NODE_CAPABILITIES,
    PLUGINS_LIST,
    PLUGINS_INSTALL,
    PLUGINS_UNINSTALL,
    PLUGINS_ENABLE,
    PLUGINS_DISABLE,
    TTS_STATUS,
    TTS_ENABLE,
    TTS_DISABLE,
    TTS_CONVERT,
    TTS_PROVIDERS,
    VOICEWAKE_GET,
    VOICEWAKE_SET,
    WEB_LOGIN_START,
    WEB_LOGIN_WAIT,
    WIZARD_START,
    WIZARD_NEXT,
    WIZARD_CANCEL,
    WIZARD_STATUS,
];

/// Human-readable subsystem name for an `UNAVAILABLE` method, used in the
/// error message (e.g. "tts subsystem is not available").
pub fn unavailable_subsystem(method: &str) -> &'static str {
    match method {
        m if m.starts_with("tts.") => "tts",
        m if m.starts_with("voicewake.") => "voicewake",
        m if m.starts_with("wizard.") => "wizard",
        m if m.starts_with("web.login.") => "web login",
        m if m.starts_with("plugins.") => "plugins",
        m if m.starts_with("exec.approval.") => "exec approval",
        m if m.starts_with("memory.") => "memory",
        m if m.starts_with("node.") => "multi-node clustering",
        LOGS_TAIL => "log tailing",
        CONFIG_APPLY => "live config apply",
        _ => "this",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_unavailable_method_has_a_named_subsystem() {
        for method in UNAVAILABLE_METHODS {
            assert_ne!(unavailable_subsystem(method), "this", "{method} has no subsystem label");
        }
    }
}
