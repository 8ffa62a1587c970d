//! Concrete WS method handler functions.
//!
//! Each function extracts its parameters, calls the appropriate `AppState`
//! subsystem, and returns a `ResFrame`.  `dispatch::route` is the only
//! caller — keep this module free of I/O side-effects beyond the subsystem
//! calls (no direct DB access, no raw sockets).

use skynet_protocol::frames::ResFrame;
use skynet_scheduler::Schedule;
use skynet_sessions::types::SessionKey;
use tracing::warn;

use crate::app::AppState;

// ---------------------------------------------------------------------------
// sessions.list
// ---------------------------------------------------------------------------

/// Handler for `sessions.list`.
///
/// Params: `{ "limit"?: number, "channel"?: string }`
///
/// Returns the most recently active sessions, optionally filtered to one
/// channel.
pub async fn handle_sessions_list(
    params: Option<&serde_json::Value>,
    req_id: &str,
    app: &AppState,
) -> ResFrame {
    const DEFAULT_LIMIT: usize = 20;
    const MAX_LIMIT: usize = 100;

    let limit = params
        .and_then(|p| p.get("limit"))
        .and_then(|v| v.as_u64())
        .map(|n| (n as usize).min(MAX_LIMIT))
        .unwrap_or(DEFAULT_LIMIT);

    let channel = params.and_then(|p| p.get("channel")).and_then(|v| v.as_str());

    let result = match channel {
        Some(c) => app.sessions.list_by_channel(c),
        None => app.sessions.list(),
    };

    match result {
        Ok(mut sessions) => {
            sessions.truncate(limit);
            ResFrame::ok(req_id, serde_json::json!({ "sessions": sessions }))
        }
        Err(e) => {
            warn!(error = %e, "sessions.list failed");
            ResFrame::err(req_id, "INTERNAL_ERROR", &e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// sessions.get
// ---------------------------------------------------------------------------

/// Handler for `sessions.get`.
///
/// Params: `{ "session_key": string }`
///
/// Returns the session if found, or a `NOT_FOUND` error.
pub async fn handle_sessions_get(
    params: Option<&serde_json::Value>,
    req_id: &str,
    app: &AppState,
) -> ResFrame {
    let key_str = match params
        .and_then(|p| p.get("session_key"))
        .and_then(|v| v.as_str())
    {
        Some(s) => s,
        None => return ResFrame::err(req_id, "INVALID_PARAMS", "missing 'session_key' field"),
    };

    let key = match SessionKey::parse(key_str) {
        Ok(k) => k,
        Err(e) => {
            return ResFrame::err(
                req_id,
                "INVALID_PARAMS",
                &format!("invalid session_key: {e}"),
            )
        }
    };

    match app.sessions.get(&key) {
        Ok(Some(session)) => ResFrame::ok(req_id, serde_json::json!({ "session": session })),
        Ok(None) => ResFrame::err(
            req_id,
            "NOT_FOUND",
            &format!("session not found: {key_str}"),
        ),
        Err(e) => {
            warn!(error = %e, "sessions.get failed");
            ResFrame::err(req_id, "INTERNAL_ERROR", &e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// sessions.get / delete / reset
// ---------------------------------------------------------------------------

/// Handler for `sessions.delete`.
///
/// Params: `{ "session_key": string }`
pub async fn handle_sessions_delete(
    params: Option<&serde_json::Value>,
    req_id: &str,
    app: &AppState,
) -> ResFrame {
    let key = match params
        .and_then(|p| p.get("session_key"))
        .and_then(|v| v.as_str())
        .and_then(|s| SessionKey::parse(s).ok())
    {
        Some(k) => k,
        None => return ResFrame::err(req_id, "INVALID_PARAMS", "missing or invalid 'session_key' field"),
    };

    match app.sessions.delete(&key) {
        Ok(()) => ResFrame::ok(req_id, serde_json::json!({ "ok": true })),
        Err(e) => {
            warn!(error = %e, "sessions.delete failed");
            ResFrame::err(req_id, "INTERNAL_ERROR", &e.to_string())
        }
    }
}

/// Handler for `sessions.reset` — clears history but keeps the session row.
///
/// Params: `{ "session_key": string }`
pub async fn handle_sessions_reset(
    params: Option<&serde_json::Value>,
    req_id: &str,
    app: &AppState,
) -> ResFrame {
    let key = match params
        .and_then(|p| p.get("session_key"))
        .and_then(|v| v.as_str())
        .and_then(|s| SessionKey::parse(s).ok())
    {
        Some(k) => k,
        None => return ResFrame::err(req_id, "INVALID_PARAMS", "missing or invalid 'session_key' field"),
    };

    match app.sessions.clear(&key) {
        Ok(()) => ResFrame::ok(req_id, serde_json::json!({ "ok": true })),
        Err(e) => {
            warn!(error = %e, "sessions.reset failed");
            ResFrame::err(req_id, "INTERNAL_ERROR", &e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// cron.list
// ---------------------------------------------------------------------------

/// Handler for `cron.list`. Returns all scheduled jobs.
pub async fn handle_cron_list(req_id: &str, app: &AppState) -> ResFrame {
    match app.scheduler.list_jobs() {
        Ok(jobs) => ResFrame::ok(req_id, serde_json::json!({ "jobs": jobs })),
        Err(e) => {
            warn!(error = %e, "cron.list failed");
            ResFrame::err(req_id, "INTERNAL_ERROR", &e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// cron.add
// ---------------------------------------------------------------------------

/// Handler for `cron.add`.
///
/// Params: `{ "name": string, "schedule": Schedule, "action": string }`
pub async fn handle_cron_add(
    params: Option<&serde_json::Value>,
    req_id: &str,
    app: &AppState,
) -> ResFrame {
    let p = match params {
        Some(p) => p,
        None => return ResFrame::err(req_id, "INVALID_PARAMS", "params object required"),
    };

    let name = match p.get("name").and_then(|v| v.as_str()) {
        Some(s) if !s.is_empty() => s,
        _ => return ResFrame::err(req_id, "INVALID_PARAMS", "missing or empty 'name' field"),
    };

    let schedule: Schedule = match p.get("schedule") {
        Some(v) => match serde_json::from_value(v.clone()) {
            Ok(s) => s,
            Err(e) => return ResFrame::err(req_id, "INVALID_PARAMS", &format!("bad schedule: {e}")),
        },
        None => return ResFrame::err(req_id, "INVALID_PARAMS", "missing 'schedule' field"),
    };

    let action = match p.get("action").and_then(|v| v.as_str()) {
        Some(s) => s,
        None => return ResFrame::err(req_id, "INVALID_PARAMS", "missing 'action' field"),
    };

    match app.scheduler.add_job(name, schedule, action) {
        Ok(job) => ResFrame::ok(req_id, serde_json::json!({ "job": job })),
        Err(e) => {
            warn!(error = %e, "cron.add failed");
            ResFrame::err(req_id, "INTERNAL_ERROR", &e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// cron.remove
// ---------------------------------------------------------------------------

/// Handler for `cron.remove`.
///
/// Params: `{ "id": string }`
pub async fn handle_cron_remove(
    params: Option<&serde_json::Value>,
    req_id: &str,
    app: &AppState,
) -> ResFrame {
    let id = match params
        .and_then(|p| p.get("id"))
        .and_then(|v| v.as_str())
    {
        Some(s) if !s.is_empty() => s,
        _ => return ResFrame::err(req_id, "INVALID_PARAMS", "missing or empty 'id' field"),
    };

    match app.scheduler.remove_job(id) {
        Ok(()) => ResFrame::ok(req_id, serde_json::json!({ "ok": true })),
        Err(skynet_scheduler::SchedulerError::JobNotFound { .. }) => {
            ResFrame::err(req_id, "NOT_FOUND", &format!("job not found: {id}"))
        }
        Err(e) => {
            warn!(error = %e, "cron.remove failed");
            ResFrame::err(req_id, "INTERNAL_ERROR", &e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// Terminal error mapping
// ---------------------------------------------------------------------------

/// Map a `TerminalError` variant to a WS error code and message.
///
/// This centralises the mapping so all terminal handlers stay consistent.
fn map_terminal_error(req_id: &str, e: skynet_terminal::TerminalError) -> ResFrame {
    use skynet_terminal::TerminalError;
    match e {
        TerminalError::CommandBlocked { reason } => {
            ResFrame::err(req_id, "COMMAND_BLOCKED", &reason)
        }
        TerminalError::SessionNotFound(id) => {
            ResFrame::err(req_id, "NOT_FOUND", &format!("session not found: {id}"))
        }
        TerminalError::JobNotFound(id) => {
            ResFrame::err(req_id, "NOT_FOUND", &format!("job not found: {id}"))
        }
        TerminalError::Timeout { ms } => {
            ResFrame::err(req_id, "TIMEOUT", &format!("timed out after {ms}ms"))
        }
        TerminalError::PtySpawn(msg) => ResFrame::err(req_id, "SPAWN_ERROR", &msg),
        TerminalError::IoError(e) => ResFrame::err(req_id, "IO_ERROR", &e.to_string()),
    }
}

// ---------------------------------------------------------------------------
// terminal.exec
// ---------------------------------------------------------------------------

/// Handler for `terminal.exec` — the primary one-shot command execution path.
///
/// Spawns a subprocess via `sh -c`, waits for it to finish (with timeout),
/// and returns stdout/stderr/exit_code.  No PTY is allocated.
///
/// Params: `{ "command": string, "timeout"?: number, "max_output"?: number }`
pub async fn handle_terminal_exec(
    params: Option<&serde_json::Value>,
    req_id: &str,
    app: &AppState,
) -> ResFrame {
    use skynet_terminal::types::ExecOptions;

    let p = match params {
        Some(p) => p,
        None => return ResFrame::err(req_id, "INVALID_PARAMS", "params object required"),
    };

    let command = match p.get("command").and_then(|v| v.as_str()) {
        Some(s) if !s.is_empty() => s,
        _ => return ResFrame::err(req_id, "INVALID_PARAMS", "missing or empty 'command' field"),
    };

    let timeout_secs = p
        .get("timeout")
        .and_then(|v| v.as_u64())
        .unwrap_or(ExecOptions::default().timeout_secs);

    let max_output_chars = p
        .get("max_output")
        .and_then(|v| v.as_u64())
        .map(|n| n as usize)
        .unwrap_or(ExecOptions::default().max_output_chars);

    let opts = ExecOptions {
        timeout_secs,
        max_output_chars,
        // Safety filter always enabled via WS API; callers cannot bypass it.
        skip_safety: false,
    };

    match app.terminal.lock().await.exec(command, opts).await {
        Ok(result) => ResFrame::ok(
            req_id,
            serde_json::json!({
                "exit_code": result.exit_code,
                "stdout":    result.stdout,
                "stderr":    result.stderr,
            }),
        ),
        Err(e) => {
            warn!(error = %e, command, "terminal.exec failed");
            map_terminal_error(req_id, e)
        }
    }
}

// ---------------------------------------------------------------------------
// terminal.create
// ---------------------------------------------------------------------------

/// Handler for `terminal.create` — opens an interactive PTY session.
///
/// Params: `{ "shell"?: string, "cwd"?: string }`
pub async fn handle_terminal_create(
    params: Option<&serde_json::Value>,
    req_id: &str,
    app: &AppState,
) -> ResFrame {
    let shell = params.and_then(|p| p.get("shell")).and_then(|v| v.as_str());
    let cwd = params.and_then(|p| p.get("cwd")).and_then(|v| v.as_str());

    match app.terminal.lock().await.create_session(shell, cwd).await {
        Ok(id) => ResFrame::ok(req_id, serde_json::json!({ "session_id": id.as_str() })),
        Err(e) => {
            warn!(error = %e, "terminal.create failed");
            map_terminal_error(req_id, e)
        }
    }
}

// ---------------------------------------------------------------------------
// terminal.write
// ---------------------------------------------------------------------------

/// Handler for `terminal.write` — sends raw input to a PTY session's stdin.
///
/// Params: `{ "session_id": string, "input": string }`
pub async fn handle_terminal_write(
    params: Option<&serde_json::Value>,
    req_id: &str,
    app: &AppState,
) -> ResFrame {
    use skynet_terminal::types::SessionId;

    let p = match params {
        Some(p) => p,
        None => return ResFrame::err(req_id, "INVALID_PARAMS", "params object required"),
    };

    let session_id = match p.get("session_id").and_then(|v| v.as_str()) {
        Some(s) if !s.is_empty() => SessionId::from(s),
        _ => return ResFrame::err(req_id, "INVALID_PARAMS", "missing or empty 'session_id' field"),
    };

    let input = match p.get("input").and_then(|v| v.as_str()) {
        Some(s) => s,
        None => return ResFrame::err(req_id, "INVALID_PARAMS", "missing 'input' field"),
    };

    match app.terminal.lock().await.write(&session_id, input).await {
        Ok(()) => ResFrame::ok(req_id, serde_json::json!({ "ok": true })),
        Err(e) => {
            warn!(error = %e, "terminal.write failed");
            map_terminal_error(req_id, e)
        }
    }
}

// ---------------------------------------------------------------------------
// terminal.read
// ---------------------------------------------------------------------------

/// Handler for `terminal.read` — drains buffered output from a PTY session.
///
/// Params: `{ "session_id": string }`
pub async fn handle_terminal_read(
    params: Option<&serde_json::Value>,
    req_id: &str,
    app: &AppState,
) -> ResFrame {
    use skynet_terminal::types::SessionId;

    let session_id = match params
        .and_then(|p| p.get("session_id"))
        .and_then(|v| v.as_str())
    {
        Some(s) if !s.is_empty() => SessionId::from(s),
        _ => return ResFrame::err(req_id, "INVALID_PARAMS", "missing or empty 'session_id' field"),
    };

    match app.terminal.lock().await.read(&session_id).await {
        Ok(output) => ResFrame::ok(req_id, serde_json::json!({ "output": output })),
        Err(e) => {
            warn!(error = %e, "terminal.read failed");
            map_terminal_error(req_id, e)
        }
    }
}

// ---------------------------------------------------------------------------
// terminal.kill
// ---------------------------------------------------------------------------

/// Handler for `terminal.kill` — terminates and removes a PTY session.
///
/// Params: `{ "session_id": string }`
pub async fn handle_terminal_kill(
    params: Option<&serde_json::Value>,
    req_id: &str,
    app: &AppState,
) -> ResFrame {
    use skynet_terminal::types::SessionId;

    let session_id = match params
        .and_then(|p| p.get("session_id"))
        .and_then(|v| v.as_str())
    {
        Some(s) if !s.is_empty() => SessionId::from(s),
        _ => return ResFrame::err(req_id, "INVALID_PARAMS", "missing or empty 'session_id' field"),
    };

    match app.terminal.lock().await.kill(&session_id).await {
        Ok(()) => ResFrame::ok(req_id, serde_json::json!({ "ok": true })),
        Err(e) => {
            warn!(error = %e, "terminal.kill failed");
            map_terminal_error(req_id, e)
        }
    }
}

// ---------------------------------------------------------------------------
// terminal.list
// ---------------------------------------------------------------------------

/// Handler for `terminal.list` — returns metadata for all active PTY sessions.
pub async fn handle_terminal_list(req_id: &str, app: &AppState) -> ResFrame {
    let sessions = app.terminal.lock().await.list();
    ResFrame::ok(req_id, serde_json::json!({ "sessions": sessions }))
}

// ---------------------------------------------------------------------------
// terminal.exec_bg
// ---------------------------------------------------------------------------

/// Handler for `terminal.exec_bg` — starts a command as a tracked background job.
///
/// Params: `{ "command": string }`
pub async fn handle_terminal_exec_bg(
    params: Option<&serde_json::Value>,
    req_id: &str,
    app: &AppState,
) -> ResFrame {
    let command = match params
        .and_then(|p| p.get("command"))
        .and_then(|v| v.as_str())
    {
        Some(s) if !s.is_empty() => s,
        _ => return ResFrame::err(req_id, "INVALID_PARAMS", "missing or empty 'command' field"),
    };

    match app.terminal.lock().await.exec_background(command).await {
        Ok(job_id) => ResFrame::ok(req_id, serde_json::json!({ "job_id": job_id.0 })),
        Err(e) => {
            warn!(error = %e, command, "terminal.exec_bg failed");
            map_terminal_error(req_id, e)
        }
    }
}

// ---------------------------------------------------------------------------
// terminal.job_status
// ---------------------------------------------------------------------------

/// Handler for `terminal.job_status` — queries the status of a background job.
///
/// Params: `{ "id": string }`
pub async fn handle_terminal_job_status(
    params: Option<&serde_json::Value>,
    req_id: &str,
    app: &AppState,
) -> ResFrame {
    use skynet_terminal::types::JobId;

    let id = match params
        .and_then(|p| p.get("id"))
        .and_then(|v| v.as_str())
    {
        Some(s) if !s.is_empty() => JobId(s.to_string()),
        _ => return ResFrame::err(req_id, "INVALID_PARAMS", "missing or empty 'id' field"),
    };

    match app.terminal.lock().await.job_status(&id) {
        Ok(job) => ResFrame::ok(req_id, serde_json::json!({ "job": job })),
        Err(e) => {
            warn!(error = %e, "terminal.job_status failed");
            map_terminal_error(req_id, e)
        }
    }
}

// ---------------------------------------------------------------------------
// terminal.job_list
// ---------------------------------------------------------------------------

/// Handler for `terminal.job_list` — returns all tracked background jobs.
pub async fn handle_terminal_job_list(req_id: &str, app: &AppState) -> ResFrame {
    let jobs = app.terminal.lock().await.job_list();
    ResFrame::ok(req_id, serde_json::json!({ "jobs": jobs }))
}

// ---------------------------------------------------------------------------
// terminal.job_kill
// ---------------------------------------------------------------------------

/// Handler for `terminal.job_kill` — sends SIGKILL to a running background job.
///
/// Params: `{ "id": string }`
pub async fn handle_terminal_job_kill(
    params: Option<&serde_json::Value>,
    req_id: &str,
    app: &AppState,
) -> ResFrame {
    use skynet_terminal::types::JobId;

    let id = match params
        .and_then(|p| p.get("id"))
        .and_then(|v| v.as_str())
    {
        Some(s) if !s.is_empty() => JobId(s.to_string()),
        _ => return ResFrame::err(req_id, "INVALID_PARAMS", "missing or empty 'id' field"),
    };

    // job_kill is synchronous — no .await needed.
    match app.terminal.lock().await.job_kill(&id) {
        Ok(()) => ResFrame::ok(req_id, serde_json::json!({ "ok": true })),
        Err(e) => {
            warn!(error = %e, "terminal.job_kill failed");
            map_terminal_error(req_id, e)
        }
    }
}

// ---------------------------------------------------------------------------
// chat.send / chat.abort / chat.history / chat.inject
// ---------------------------------------------------------------------------

/// Handler for `chat.send` — runs one turn of the per-session turn loop to
/// completion and returns the resulting message history (spec.md §4.6).
///
/// Params: `{ "session_key": string, "message": string, "model"?: string }`
pub async fn handle_chat_send(
    params: Option<&serde_json::Value>,
    req_id: &str,
    app: &AppState,
) -> ResFrame {
    let p = match params {
        Some(p) => p,
        None => return ResFrame::err(req_id, "INVALID_PARAMS", "params object required"),
    };

    let session_key = match p.get("session_key").and_then(|v| v.as_str()) {
        Some(s) if !s.is_empty() => s,
        _ => return ResFrame::err(req_id, "INVALID_PARAMS", "missing or empty 'session_key' field"),
    };

    let message = match p.get("message").and_then(|v| v.as_str()) {
        Some(s) => s,
        None => return ResFrame::err(req_id, "INVALID_PARAMS", "missing 'message' field"),
    };

    let model = p.get("model").and_then(|v| v.as_str()).map(str::to_string);

    let turn_loop = app.turn_loop_for(session_key);
    match turn_loop.prompt(vec![message.to_string()], None, model).await {
        Ok(messages) => ResFrame::ok(req_id, serde_json::json!({ "messages": messages })),
        Err(e) => {
            warn!(error = %e, session_key, "chat.send failed");
            ResFrame::err(req_id, "PROVIDER_ERROR", &e.to_string())
        }
    }
}

/// Handler for `chat.abort` — cancels the running turn loop for a session.
///
/// Params: `{ "session_key": string }`
pub async fn handle_chat_abort(
    params: Option<&serde_json::Value>,
    req_id: &str,
    app: &AppState,
) -> ResFrame {
    let session_key = match params
        .and_then(|p| p.get("session_key"))
        .and_then(|v| v.as_str())
    {
        Some(s) if !s.is_empty() => s,
        _ => return ResFrame::err(req_id, "INVALID_PARAMS", "missing or empty 'session_key' field"),
    };

    app.turn_loop_for(session_key).abort().await;
    ResFrame::ok(req_id, serde_json::json!({ "ok": true }))
}

/// Handler for `chat.history` — returns the persisted session transcript.
///
/// Params: `{ "session_key": string }`
pub async fn handle_chat_history(
    params: Option<&serde_json::Value>,
    req_id: &str,
    app: &AppState,
) -> ResFrame {
    let key = match params
        .and_then(|p| p.get("session_key"))
        .and_then(|v| v.as_str())
        .and_then(|s| SessionKey::parse(s).ok())
    {
        Some(k) => k,
        None => return ResFrame::err(req_id, "INVALID_PARAMS", "missing or invalid 'session_key' field"),
    };

    match app.sessions.get(&key) {
        Ok(Some(session)) => ResFrame::ok(req_id, serde_json::json!({ "messages": session.messages })),
        Ok(None) => ResFrame::ok(req_id, serde_json::json!({ "messages": [] })),
        Err(e) => {
            warn!(error = %e, "chat.history failed");
            ResFrame::err(req_id, "INTERNAL_ERROR", &e.to_string())
        }
    }
}

/// Handler for `chat.inject` — steers the running turn loop with mid-turn
/// text (spec.md §4.6's `steer`), or queues it as a follow-up if `queued`
/// is set.
///
/// Params: `{ "session_key": string, "text": string, "queued"?: bool }`
pub async fn handle_chat_inject(
    params: Option<&serde_json::Value>,
    req_id: &str,
    app: &AppState,
) -> ResFrame {
    let p = match params {
        Some(p) => p,
        None => return ResFrame::err(req_id, "INVALID_PARAMS", "params object required"),
    };

    let session_key = match p.get("session_key").and_then(|v| v.as_str()) {
        Some(s) if !s.is_empty() => s,
        _ => return ResFrame::err(req_id, "INVALID_PARAMS", "missing or empty 'session_key' field"),
    };

    let text = match p.get("text").and_then(|v| v.as_str()) {
        Some(s) => s,
        None => return ResFrame::err(req_id, "INVALID_PARAMS", "missing 'text' field"),
    };

    let turn_loop = app.turn_loop_for(session_key);
    if p.get("queued").and_then(|v| v.as_bool()).unwrap_or(false) {
        turn_loop.followup(text).await;
    } else {
        turn_loop.steer(text).await;
    }
    ResFrame::ok(req_id, serde_json::json!({ "ok": true }))
}

// ---------------------------------------------------------------------------
// device.pair.* / device.token.*
// ---------------------------------------------------------------------------

/// Handler for `device.pair.list` — pending pairing requests awaiting
/// operator approval.
pub async fn handle_device_pair_list(req_id: &str, app: &AppState) -> ResFrame {
    let requests = app.auth.list_pending();
    ResFrame::ok(req_id, serde_json::json!({ "requests": requests }))
}

/// Handler for `device.pair.approve`. Params: `{ "request_id": string }`
pub async fn handle_device_pair_approve(
    params: Option<&serde_json::Value>,
    req_id: &str,
    app: &AppState,
) -> ResFrame {
    let request_id = match params
        .and_then(|p| p.get("request_id"))
        .and_then(|v| v.as_str())
    {
        Some(s) if !s.is_empty() => s,
        _ => return ResFrame::err(req_id, "INVALID_PARAMS", "missing or empty 'request_id' field"),
    };

    match app.auth.approve(request_id) {
        Ok(token) => ResFrame::ok(req_id, serde_json::json!({ "token": token })),
        Err(e) => ResFrame::err(req_id, "NOT_FOUND", &e),
    }
}

/// Handler for `device.pair.reject`. Params: `{ "request_id": string }`
pub async fn handle_device_pair_reject(
    params: Option<&serde_json::Value>,
    req_id: &str,
    app: &AppState,
) -> ResFrame {
    let request_id = match params
        .and_then(|p| p.get("request_id"))
        .and_then(|v| v.as_str())
    {
        Some(s) if !s.is_empty() => s,
        _ => return ResFrame::err(req_id, "INVALID_PARAMS", "missing or empty 'request_id' field"),
    };

    match app.auth.reject(request_id) {
        Ok(()) => ResFrame::ok(req_id, serde_json::json!({ "ok": true })),
        Err(e) => ResFrame::err(req_id, "NOT_FOUND", &e),
    }
}

/// Handler for `device.token.rotate`. Params: `{ "device_id": string }`
pub async fn handle_device_token_rotate(
    params: Option<&serde_json::Value>,
    req_id: &str,
    app: &AppState,
) -> ResFrame {
    let device_id = match params
        .and_then(|p| p.get("device_id"))
        .and_then(|v| v.as_str())
    {
        Some(s) if !s.is_empty() => s,
        _ => return ResFrame::err(req_id, "INVALID_PARAMS", "missing or empty 'device_id' field"),
    };

    match app.auth.rotate_token(device_id) {
        Ok(token) => ResFrame::ok(req_id, serde_json::json!({ "token": token })),
        Err(e) => ResFrame::err(req_id, "NOT_FOUND", &e),
    }
}

/// Handler for `device.token.revoke`. Params: `{ "device_id": string }`
pub async fn handle_device_token_revoke(
    params: Option<&serde_json::Value>,
    req_id: &str,
    app: &AppState,
) -> ResFrame {
    let device_id = match params
        .and_then(|p| p.get("device_id"))
        .and_then(|v| v.as_str())
    {
        Some(s) if !s.is_empty() => s,
        _ => return ResFrame::err(req_id, "INVALID_PARAMS", "missing or empty 'device_id' field"),
    };

    match app.auth.revoke_token(device_id) {
        Ok(()) => ResFrame::ok(req_id, serde_json::json!({ "ok": true })),
        Err(e) => ResFrame::err(req_id, "NOT_FOUND", &e),
    }
}

// ---------------------------------------------------------------------------
// channels.list / channels.status
// ---------------------------------------------------------------------------

/// Handler for `channels.list` — status of every registered channel adapter.
pub async fn handle_channels_list(req_id: &str, app: &AppState) -> ResFrame {
    let statuses = app.channels.lock().await.statuses();
    let channels: Vec<_> = statuses
        .into_iter()
        .map(|(name, status)| serde_json::json!({ "name": name, "status": status }))
        .collect();
    ResFrame::ok(req_id, serde_json::json!({ "channels": channels }))
}

/// Handler for `channels.status`. Params: `{ "channel": string }`
pub async fn handle_channels_status(
    params: Option<&serde_json::Value>,
    req_id: &str,
    app: &AppState,
) -> ResFrame {
    let name = match params.and_then(|p| p.get("channel")).and_then(|v| v.as_str()) {
        Some(s) if !s.is_empty() => s,
        _ => return ResFrame::err(req_id, "INVALID_PARAMS", "missing or empty 'channel' field"),
    };

    match app
        .channels
        .lock()
        .await
        .statuses()
        .into_iter()
        .find(|(n, _)| n == name)
    {
        Some((_, status)) => ResFrame::ok(req_id, serde_json::json!({ "status": status })),
        None => ResFrame::err(req_id, "NOT_FOUND", &format!("channel not registered: {name}")),
    }
}

// ---------------------------------------------------------------------------
// config.get
// ---------------------------------------------------------------------------

/// Handler for `config.get` — returns the active config, redacting secrets.
pub async fn handle_config_get(req_id: &str, app: &AppState) -> ResFrame {
    let mut value = serde_json::to_value(&app.config).unwrap_or(serde_json::Value::Null);
    if let Some(auth) = value
        .get_mut("gateway")
        .and_then(|g| g.get_mut("auth"))
        .and_then(|a| a.as_object_mut())
    {
        auth.remove("token");
        auth.remove("password");
    }
    ResFrame::ok(req_id, value)
}
