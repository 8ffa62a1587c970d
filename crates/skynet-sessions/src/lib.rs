pub mod db;
pub mod error;
pub mod history;
pub mod manager;
pub mod types;

pub use error::SessionError;
pub use history::{limit_history_turns, resolve_dm_history_limit, sanitize_history};
pub use manager::SessionStore;
pub use types::{Message, MessageContent, MessageRole, Session, SessionKey, ToolCallRecord};
