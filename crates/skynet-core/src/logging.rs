//! Tracing initialization shared by the gateway binary.
//!
//! Honors `RUST_LOG` (default `info`) and the conventional `NO_COLOR` /
//! `FORCE_COLOR` environment variables (spec §6).

/// Initialize the global tracing subscriber. Call once, from `main`.
pub fn init() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "skynet_gateway=info,skynet_agent=info,tower_http=debug".into());

    let ansi = if std::env::var("NO_COLOR").is_ok() {
        false
    } else if std::env::var("FORCE_COLOR").is_ok() {
        true
    } else {
        true
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(ansi)
        .init();
}
