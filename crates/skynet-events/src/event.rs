use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// A published event. Each variant names its own dotted wire event-type
/// (spec.md §6: "the server sends an event frame whose event matches a
/// dotted event-type, e.g. agent.text, cron.job-started,
/// channel.message.received"). `Custom` carries anything that doesn't
/// warrant its own variant, as an opaque metadata map (spec.md §9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_type: String,
    pub data: Value,
    pub ts: DateTime<Utc>,
}

impl Event {
    fn new(event_type: &str, data: Value) -> Self {
        Self {
            event_type: event_type.to_string(),
            data,
            ts: Utc::now(),
        }
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn custom(event_type: &str, data: Value) -> Self {
        Self::new(event_type, data)
    }

    pub fn session_message_appended(session_key: String, role: String) -> Self {
        Self::new("session.message.appended", json!({ "sessionKey": session_key, "role": role }))
    }

    pub fn agent_turn_start(session_key: String, turn_number: u64) -> Self {
        Self::new("agent.turn-start", json!({ "sessionKey": session_key, "turnNumber": turn_number }))
    }

    pub fn agent_turn_end(session_key: String, turn_number: u64, has_tool_calls: bool) -> Self {
        Self::new(
            "agent.turn-end",
            json!({ "sessionKey": session_key, "turnNumber": turn_number, "hasToolCalls": has_tool_calls }),
        )
    }

    pub fn agent_text(session_key: String, text: String) -> Self {
        Self::new("agent.text", json!({ "sessionKey": session_key, "text": text }))
    }

    pub fn cron_service_started() -> Self {
        Self::new("cron.service-started", json!({}))
    }

    pub fn cron_service_stopped() -> Self {
        Self::new("cron.service-stopped", json!({}))
    }

    pub fn cron_job_added(job_id: String, name: String) -> Self {
        Self::new("cron.job-added", json!({ "jobId": job_id, "name": name }))
    }

    pub fn cron_job_updated(job_id: String) -> Self {
        Self::new("cron.job-updated", json!({ "jobId": job_id }))
    }

    pub fn cron_job_removed(job_id: String) -> Self {
        Self::new("cron.job-removed", json!({ "jobId": job_id }))
    }

    pub fn cron_job_started(job_id: String, name: String) -> Self {
        Self::new("cron.job-started", json!({ "jobId": job_id, "name": name }))
    }

    pub fn cron_job_finished(job_id: String, name: String, status: &str, error: Option<String>) -> Self {
        Self::new(
            "cron.job-finished",
            json!({ "jobId": job_id, "name": name, "status": status, "error": error }),
        )
    }

    pub fn channel_message_received(channel_id: String, chat_id: String) -> Self {
        Self::new(
            "channel.message.received",
            json!({ "channelId": channel_id, "chatId": chat_id }),
        )
    }

    pub fn channel_status_changed(channel_id: String, status: String) -> Self {
        Self::new(
            "channel.status.changed",
            json!({ "channelId": channel_id, "status": status }),
        )
    }
}
