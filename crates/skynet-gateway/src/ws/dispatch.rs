//! Routes an authenticated WS method call to its handler (spec.md §4.10).
//!
//! Every name in [`skynet_protocol::methods`] is recognized — a method this
//! repo doesn't implement still dispatches, but its handler returns
//! `UNAVAILABLE` naming the missing subsystem instead of `METHOD_NOT_FOUND`.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use skynet_protocol::{frames::ResFrame, methods};

use crate::app::AppState;
use crate::ws::handlers;

type WsSink = futures_util::stream::SplitSink<WebSocket, Message>;

/// Route a WS method call to the correct handler.
pub async fn route(
    method: &str,
    params: Option<&serde_json::Value>,
    req_id: &str,
    app: &Arc<AppState>,
    _tx: &mut WsSink,
) -> ResFrame {
    if methods::UNAVAILABLE_METHODS.contains(&method) {
        return ResFrame::err(
            req_id,
            "UNAVAILABLE",
            &format!("{} subsystem is not available", methods::unavailable_subsystem(method)),
        );
    }

    match method {
        "ping" => ResFrame::ok(req_id, serde_json::json!({ "pong": true })),

        methods::HEALTH => ResFrame::ok(req_id, serde_json::json!({ "status": "ok" })),
        methods::STATUS => ResFrame::ok(
            req_id,
            serde_json::json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }),
        ),
        methods::MODELS_LIST => ResFrame::ok(
            req_id,
            serde_json::json!({ "models": [app.config.agent.model.clone()] }),
        ),

        methods::CONFIG_GET => handlers::handle_config_get(req_id, app).await,
        methods::CONFIG_SET | methods::CONFIG_PATCH => ResFrame::err(
            req_id,
            "UNAVAILABLE",
            "live config mutation is not available",
        ),

        methods::AGENT_STATUS | methods::AGENT_LIST => ResFrame::ok(
            req_id,
            serde_json::json!({
                "agents": [{ "id": "main", "model": app.config.agent.model, "status": "idle" }]
            }),
        ),
        methods::AGENT | methods::AGENT_WAIT => ResFrame::err(
            req_id,
            "INVALID_PARAMS",
            "use chat.send to run a turn",
        ),

        methods::CHAT_SEND => handlers::handle_chat_send(params, req_id, app).await,
        methods::CHAT_ABORT => handlers::handle_chat_abort(params, req_id, app).await,
        methods::CHAT_HISTORY => handlers::handle_chat_history(params, req_id, app).await,
        methods::CHAT_INJECT => handlers::handle_chat_inject(params, req_id, app).await,

        methods::SESSIONS_LIST | methods::SESSIONS_PREVIEW => {
            handlers::handle_sessions_list(params, req_id, app).await
        }
        methods::SESSIONS_RESOLVE => handlers::handle_sessions_get(params, req_id, app).await,
        methods::SESSIONS_PATCH => {
            ResFrame::err(req_id, "UNAVAILABLE", "session metadata patching is not available")
        }
        methods::SESSIONS_RESET => handlers::handle_sessions_reset(params, req_id, app).await,
        methods::SESSIONS_DELETE => handlers::handle_sessions_delete(params, req_id, app).await,
        methods::SESSIONS_COMPACT => {
            ResFrame::err(req_id, "UNAVAILABLE", "manual compaction is not available")
        }

        methods::CHANNELS_LIST => handlers::handle_channels_list(req_id, app).await,
        methods::CHANNELS_STATUS => handlers::handle_channels_status(params, req_id, app).await,
        methods::CHANNELS_CONNECT
        | methods::CHANNELS_DISCONNECT
        | methods::CHANNELS_SEND
        | methods::CHANNELS_LOGOUT => ResFrame::err(
            req_id,
            "UNAVAILABLE",
            "channel adapter lifecycle control is not available over this method",
        ),

        methods::CRON_LIST | methods::CRON_STATUS => handlers::handle_cron_list(req_id, app).await,
        methods::CRON_ADD => handlers::handle_cron_add(params, req_id, app).await,
        methods::CRON_REMOVE | methods::CRON_DELETE => {
            handlers::handle_cron_remove(params, req_id, app).await
        }
        methods::CRON_UPDATE | methods::CRON_RUN | methods::CRON_RUNS => {
            ResFrame::err(req_id, "UNAVAILABLE", "cron run history and manual trigger are not available")
        }

        methods::DEVICE_PAIR_LIST => handlers::handle_device_pair_list(req_id, app).await,
        methods::DEVICE_PAIR_APPROVE => handlers::handle_device_pair_approve(params, req_id, app).await,
        methods::DEVICE_PAIR_REJECT => handlers::handle_device_pair_reject(params, req_id, app).await,
        methods::DEVICE_TOKEN_ROTATE => handlers::handle_device_token_rotate(params, req_id, app).await,
        methods::DEVICE_TOKEN_REVOKE => handlers::handle_device_token_revoke(params, req_id, app).await,

        methods::NODE_LIST => ResFrame::ok(
            req_id,
            serde_json::json!({ "nodes": [{ "id": "primary", "self": true }] }),
        ),

        methods::SYSTEM_PRESENCE => ResFrame::ok(req_id, serde_json::json!({ "present": true })),
        methods::SYSTEM_EVENT => ResFrame::ok(req_id, serde_json::json!({ "ok": true })),
        methods::SYSTEM_SHUTDOWN | methods::SYSTEM_RESTART => {
            ResFrame::err(req_id, "UNAVAILABLE", "remote process control is not available")
        }

        "terminal.exec" => handlers::handle_terminal_exec(params, req_id, app).await,
        "terminal.create" => handlers::handle_terminal_create(params, req_id, app).await,
        "terminal.write" => handlers::handle_terminal_write(params, req_id, app).await,
        "terminal.read" => handlers::handle_terminal_read(params, req_id, app).await,
        "terminal.kill" => handlers::handle_terminal_kill(params, req_id, app).await,
        "terminal.list" => handlers::handle_terminal_list(req_id, app).await,
        "terminal.exec_bg" => handlers::handle_terminal_exec_bg(params, req_id, app).await,
        "terminal.job_status" => handlers::handle_terminal_job_status(params, req_id, app).await,
        "terminal.job_list" => handlers::handle_terminal_job_list(req_id, app).await,
        "terminal.job_kill" => handlers::handle_terminal_job_kill(params, req_id, app).await,

        _ => ResFrame::err(
            req_id,
            "METHOD_NOT_FOUND",
            &format!("unknown method '{}'", method),
        ),
    }
}
