use thiserror::Error;

/// Errors that can occur during session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The requested session does not exist in the database.
    #[error("session not found: {key}")]
    NotFound { key: String },

    /// A SQLite operation failed. This is the `StorageError` surfaced to
    /// callers on read/append (spec.md §4.2): the in-memory session stays
    /// authoritative and a later mutation retries against the store.
    #[error("storage error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The provided session key string is not `agent:<agentId>:<rest>`.
    #[error("invalid session key: {0}")]
    InvalidKey(String),

    /// A stored message row had a `role` column that didn't parse.
    #[error("invalid message role {role:?} in session {key}")]
    InvalidRole { key: String, role: String },

    /// A message body or tool-call list failed to (de)serialize as JSON.
    #[error("message serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SessionError>;
