pub mod config;
pub mod error;
pub mod logging;
pub mod types;

pub use error::{Result, SkynetError};
pub use types::{AgentId, ConnId, SessionKey, UserId, UserRole};
