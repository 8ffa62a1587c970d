//! Terminal chat endpoint — POST /chat
//!
//! Designed for first-run conversations and local scripting. No external
//! tooling required — works with plain `curl`.
//!
//! Drives the same per-session [`skynet_agent::AgentTurnLoop`] the WebSocket
//! `chat.send` method uses, so the AI gets the same tool access (bash, file
//! I/O, cross-channel send) and session-scoped conversation state.
//!
//! Auth: `Authorization: Bearer <token>` header (same token as WebSocket).
//!
//! Request:  `{"message": "hello"}` (optional: `session_id`, `model`)
//! Response: `{"reply": "...", "model": "...", "tokens_in": 0, "tokens_out": 0}`
//! Error:    `{"error": "..."}`

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use skynet_agent::ProviderError;
use skynet_sessions::types::{MessageContent, MessageRole};

use crate::app::AppState;
use crate::auth::safe_equal;

#[derive(Deserialize)]
pub struct ChatRequest {
    /// The message to send to the AI agent.
    pub message: String,
    /// Optional session key suffix. Defaults to `"default"`.
    /// Full key becomes `http:terminal:{session_id}`.
    #[serde(default)]
    pub session_id: Option<String>,
    /// Optional per-request model override.
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Serialize)]
pub struct ChatReply {
    pub reply: String,
    pub model: String,
    pub tokens_in: u32,
    pub tokens_out: u32,
}

#[derive(Serialize)]
pub struct ChatError {
    pub error: String,
}

/// POST /chat — runs one turn of the terminal channel's turn loop to
/// completion and returns the final assistant message.
///
/// Requires `Authorization: Bearer <token>` when auth mode is `token`.
pub async fn chat_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatReply>, (StatusCode, Json<ChatError>)> {
    if !check_auth(&state, &headers) {
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(ChatError {
                error: "Unauthorized. Set 'Authorization: Bearer <your-token>' header.".to_string(),
            }),
        ));
    }

    if req.message.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ChatError {
                error: "message cannot be empty".to_string(),
            }),
        ));
    }

    if req.message.trim().eq_ignore_ascii_case("/stop") {
        let report = crate::stop::execute_stop(state.as_ref()).await;
        return Ok(Json(ChatReply {
            reply: report,
            model: "gateway".to_string(),
            tokens_in: 0,
            tokens_out: 0,
        }));
    }

    let session_suffix = req.session_id.as_deref().unwrap_or("default");
    let session_key = format!("http:terminal:{session_suffix}");

    let cancel = CancellationToken::new();
    state
        .active_operations
        .insert(session_key.clone(), cancel.clone());

    let turn_loop = state.turn_loop_for(&session_key);
    let result = turn_loop
        .prompt(vec![req.message.clone()], None, req.model.clone())
        .await;

    state.active_operations.remove(&session_key);

    match result {
        Ok(messages) => {
            let reply = messages
                .iter()
                .rev()
                .find(|m| m.role == MessageRole::Assistant)
                .map(|m| content_to_text(&m.content))
                .unwrap_or_default();
            Ok(Json(ChatReply {
                reply,
                model: req.model.unwrap_or_else(|| state.config.agent.model.clone()),
                tokens_in: 0,
                tokens_out: 0,
            }))
        }
        Err(ProviderError::Cancelled) => Ok(Json(ChatReply {
            reply: "Operation cancelled by /stop.".to_string(),
            model: "gateway".to_string(),
            tokens_in: 0,
            tokens_out: 0,
        })),
        Err(e) => {
            warn!(error = %e, "POST /chat failed");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ChatError {
                    error: e.to_string(),
                }),
            ))
        }
    }
}

/// Flatten a message body to plain text for the terminal reply field.
fn content_to_text(content: &MessageContent) -> String {
    match content {
        MessageContent::Text(s) => s.clone(),
        MessageContent::Blocks(blocks) => blocks
            .iter()
            .filter_map(|b| match b {
                skynet_sessions::types::ContentBlock::Text { text } => Some(text.as_str()),
                skynet_sessions::types::ContentBlock::Image { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

/// Returns true if the request is authorised.
pub(crate) fn check_auth(state: &AppState, headers: &HeaderMap) -> bool {
    use skynet_core::config::AuthMode;

    match &state.config.gateway.auth.mode {
        AuthMode::None => true,
        AuthMode::Token => {
            let expected = match &state.config.gateway.auth.token {
                Some(t) => t.as_str(),
                // Token mode configured but no token value — deny.
                None => return false,
            };
            extract_bearer(headers)
                .map(|t| safe_equal(t, expected))
                .unwrap_or(false)
        }
        // Other auth modes are handled by the WebSocket path.
        // The HTTP /chat endpoint only supports token mode.
        _ => false,
    }
}

pub(crate) fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}
