pub mod chat;
pub mod health;
pub mod notifications;
pub mod ui;
