use rusqlite::Connection;

use crate::error::Result;

/// Initialise the `sessions` and `session_messages` tables.
///
/// Safe to call on every startup — uses `IF NOT EXISTS` throughout.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS sessions (
            session_key    TEXT PRIMARY KEY,
            session_id     TEXT NOT NULL UNIQUE,
            created_at     TEXT NOT NULL,
            last_active_at TEXT NOT NULL,
            metadata       TEXT NOT NULL DEFAULT '{}'
        );
        CREATE TABLE IF NOT EXISTS session_messages (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            session_key  TEXT NOT NULL REFERENCES sessions(session_key),
            role         TEXT NOT NULL,
            content      TEXT NOT NULL,
            tool_calls   TEXT,
            tool_call_id TEXT,
            thinking     TEXT,
            created_at   TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_session_messages_key
            ON session_messages(session_key);",
    )?;
    Ok(())
}
