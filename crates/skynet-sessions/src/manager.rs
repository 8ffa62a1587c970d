use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde_json::Value;
use skynet_core::types::SessionKey;
use skynet_events::{Event, EventBus};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::error::{Result, SessionError};
use crate::history::{limit_history_turns, sanitize_history};
use crate::types::{Message, MessageContent, MessageRole, Session, ToolCallRecord};

/// Thread-safe store for persisted sessions and their message history
/// (spec.md §4.2).
///
/// Wraps a single SQLite connection in a `Mutex`. For high-concurrency
/// deployments consider a connection pool (e.g. r2d2), but a Mutex is
/// sufficient for the single-node target.
pub struct SessionStore {
    db: Mutex<Connection>,
    events: EventBus,
}

impl SessionStore {
    /// Wrap an already-open (and `init_db`-initialised) connection.
    pub fn new(conn: Connection, events: EventBus) -> Self {
        Self {
            db: Mutex::new(conn),
            events,
        }
    }

    /// Return an existing session or create a new one.
    ///
    /// Creating a session is cheap — no LLM call is made. The session is
    /// persisted so history survives restarts.
    #[instrument(skip(self), fields(key = %key))]
    pub fn get_or_create(&self, key: &SessionKey) -> Result<Session> {
        if let Some(session) = self.get(key)? {
            debug!("session cache hit");
            return Ok(session);
        }

        let session_id = Uuid::now_v7().to_string();
        let now = Utc::now();
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT OR IGNORE INTO sessions (session_key, session_id, created_at, last_active_at, metadata)
             VALUES (?1, ?2, ?3, ?3, '{}')",
            rusqlite::params![key.as_str(), session_id, now.to_rfc3339()],
        )?;
        drop(db);

        self.get(key)?.ok_or_else(|| SessionError::NotFound { key: key.as_str().to_string() })
    }

    /// Retrieve a session (with its full message history) by key.
    #[instrument(skip(self), fields(key = %key))]
    pub fn get(&self, key: &SessionKey) -> Result<Option<Session>> {
        let db = self.db.lock().unwrap();
        let header = match db.query_row(
            "SELECT session_key, session_id, created_at, last_active_at, metadata
             FROM sessions WHERE session_key = ?1",
            rusqlite::params![key.as_str()],
            row_to_header,
        ) {
            Ok(h) => h,
            Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
            Err(e) => return Err(SessionError::Database(e)),
        };

        let messages = load_messages(&db, key.as_str())?;
        Ok(Some(Session {
            session_key: header.0,
            session_id: header.1,
            messages,
            created_at: header.2,
            last_active_at: header.3,
            metadata: header.4,
        }))
    }

    /// List every session, newest-active first.
    #[instrument(skip(self))]
    pub fn list(&self) -> Result<Vec<Session>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT session_key, session_id, created_at, last_active_at, metadata
             FROM sessions ORDER BY last_active_at DESC",
        )?;
        let headers: Vec<_> = stmt
            .query_map([], row_to_header)?
            .filter_map(|r| r.ok())
            .collect();
        drop(stmt);

        headers
            .into_iter()
            .map(|(key, session_id, created_at, last_active_at, metadata)| {
                let messages = load_messages(&db, &key.0)?;
                Ok(Session { session_key: key, session_id, messages, created_at, last_active_at, metadata })
            })
            .collect()
    }

    /// List every session whose key's `<rest>` segment names `channel`
    /// (e.g. `agent:main:telegram:dm:123` for `channel = "telegram"`).
    #[instrument(skip(self), fields(channel))]
    pub fn list_by_channel(&self, channel: &str) -> Result<Vec<Session>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|s| {
                skynet_core::types::parse_agent_session_key(s.session_key.as_str())
                    .map(|p| p.rest.starts_with(&format!("{channel}:")))
                    .unwrap_or(false)
            })
            .collect())
    }

    /// Atomically append `message` to `session`'s history, bump
    /// `last_active_at`, and publish `session.message.appended`.
    #[instrument(skip(self, message), fields(key = %session.session_key, role = message.role.as_str()))]
    pub fn append_message(&self, session: &Session, message: Message) -> Result<()> {
        let key_str = session.session_key.as_str();
        let content_json = serde_json::to_string(&message.content)?;
        let tool_calls_json = message
            .tool_calls
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let now = message.timestamp.to_rfc3339();

        let db = self.db.lock().unwrap();
        let tx = db.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO session_messages
             (session_key, role, content, tool_calls, tool_call_id, thinking, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                key_str,
                message.role.as_str(),
                content_json,
                tool_calls_json,
                message.tool_call_id,
                message.thinking,
                now,
            ],
        )?;
        let rows_changed = tx.execute(
            "UPDATE sessions SET last_active_at = ?1 WHERE session_key = ?2",
            rusqlite::params![now, key_str],
        )?;
        tx.commit()?;
        drop(db);

        if rows_changed == 0 {
            return Err(SessionError::NotFound { key: key_str.to_string() });
        }

        self.events
            .publish(Event::session_message_appended(key_str.to_string(), message.role.as_str().to_string()));
        Ok(())
    }

    /// Delete every message in a session but keep the session row itself.
    #[instrument(skip(self), fields(key = %key))]
    pub fn clear(&self, key: &SessionKey) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "DELETE FROM session_messages WHERE session_key = ?1",
            rusqlite::params![key.as_str()],
        )?;
        Ok(())
    }

    /// Permanently delete a session and its message history.
    #[instrument(skip(self), fields(key = %key))]
    pub fn delete(&self, key: &SessionKey) -> Result<()> {
        let db = self.db.lock().unwrap();
        let tx = db.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM session_messages WHERE session_key = ?1",
            rusqlite::params![key.as_str()],
        )?;
        let rows_changed = tx.execute(
            "DELETE FROM sessions WHERE session_key = ?1",
            rusqlite::params![key.as_str()],
        )?;
        tx.commit()?;
        if rows_changed == 0 {
            return Err(SessionError::NotFound { key: key.as_str().to_string() });
        }
        Ok(())
    }

    /// `sanitizeHistory` then `limitHistoryTurns(n)` over a session's
    /// current messages — the shape the turn loop feeds to the provider.
    pub fn prepared_history(&self, session: &Session, turn_limit: Option<i64>) -> Vec<Message> {
        let sanitized = sanitize_history(session.messages.clone());
        limit_history_turns(sanitized, turn_limit.unwrap_or(0))
    }
}

type HeaderRow = (SessionKey, String, DateTime<Utc>, DateTime<Utc>, Value);

fn row_to_header(row: &rusqlite::Row<'_>) -> rusqlite::Result<HeaderRow> {
    let key_str: String = row.get(0)?;
    let metadata_str: String = row.get(4)?;
    Ok((
        SessionKey::from(key_str),
        row.get(1)?,
        parse_rfc3339(row.get::<_, String>(2)?),
        parse_rfc3339(row.get::<_, String>(3)?),
        serde_json::from_str(&metadata_str).unwrap_or(Value::Object(Default::default())),
    ))
}

fn parse_rfc3339(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn load_messages(db: &Connection, key: &str) -> Result<Vec<Message>> {
    let mut stmt = db.prepare(
        "SELECT role, content, tool_calls, tool_call_id, thinking, created_at
         FROM session_messages WHERE session_key = ?1 ORDER BY id ASC",
    )?;
    let rows = stmt.query_map(rusqlite::params![key], |row| {
        let role_str: String = row.get(0)?;
        let content_str: String = row.get(1)?;
        let tool_calls_str: Option<String> = row.get(2)?;
        let tool_call_id: Option<String> = row.get(3)?;
        let thinking: Option<String> = row.get(4)?;
        let created_at: String = row.get(5)?;
        Ok((role_str, content_str, tool_calls_str, tool_call_id, thinking, created_at))
    })?;

    let mut messages = Vec::new();
    for row in rows {
        let (role_str, content_str, tool_calls_str, tool_call_id, thinking, created_at) = row?;
        let role = match MessageRole::parse(&role_str) {
            Some(r) => r,
            None => {
                warn!(role = %role_str, key, "dropping session message with unrecognised role");
                continue;
            }
        };
        let content: MessageContent = serde_json::from_str(&content_str)?;
        let tool_calls: Option<Vec<ToolCallRecord>> =
            tool_calls_str.map(|s| serde_json::from_str(&s)).transpose()?;
        messages.push(Message {
            role,
            content,
            tool_calls,
            tool_call_id,
            timestamp: parse_rfc3339(created_at),
            thinking,
        });
    }
    Ok(messages)
}
