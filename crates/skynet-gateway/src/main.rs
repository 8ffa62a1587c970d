use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use tracing::info;

mod app;
mod auth;
mod http;
mod stop;
mod ws;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "skynet_gateway=info,tower_http=debug".into()),
        )
        .init();

    // load config: explicit path > SKYNET_CONFIG env > ~/.skynet/skynet.toml
    let config_path = std::env::var("SKYNET_CONFIG").ok();
    let config = skynet_core::config::SkynetConfig::load(config_path.as_deref())
        .unwrap_or_else(|e| {
            tracing::warn!("Config load failed ({}), using defaults", e);
            skynet_core::config::SkynetConfig::default()
        });

    let db_path = &config.database.path;
    let events = skynet_events::EventBus::new();

    let sessions_conn = Connection::open(db_path)?;
    skynet_sessions::db::init_db(&sessions_conn)?;
    let sessions = skynet_sessions::SessionStore::new(sessions_conn, events.clone());

    let users_conn = Connection::open(db_path)?;
    skynet_users::db::init_db(&users_conn)?;
    let users = skynet_users::resolver::UserResolver::new(Arc::new(Mutex::new(users_conn)));

    let scheduler_conn = Connection::open(db_path)?;
    let scheduler = skynet_scheduler::SchedulerHandle::new(scheduler_conn)?;

    let auth_conn = Connection::open(db_path)?;
    let auth = crate::auth::AuthStore::new(auth_conn)?;

    let terminal = skynet_terminal::manager::TerminalManager::new();
    let channels = skynet_channels::manager::ChannelManager::new();

    let bind = config.gateway.bind.clone();
    let port = config.gateway.port;

    let state = Arc::new(app::AppState::new(
        config,
        events,
        auth,
        users,
        sessions,
        scheduler,
        terminal,
        channels,
    ));
    let router = app::build_router(state.clone());

    let addr: SocketAddr = format!("{}:{}", bind, port).parse()?;
    info!("Skynet gateway listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
