use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use axum::{
    routing::{get, post},
    Router,
};
use dashmap::DashMap;
use skynet_agent::provider::InMemoryProvider;
use skynet_agent::tools::build::build_tools;
use skynet_agent::{AgentTurnLoop, StreamingProvider};
use skynet_channels::manager::ChannelManager;
use skynet_core::config::SkynetConfig;
use skynet_events::EventBus;
use skynet_scheduler::SchedulerHandle;
use skynet_sessions::SessionStore;
use skynet_terminal::manager::TerminalManager;
use skynet_users::resolver::UserResolver;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio_util::sync::CancellationToken;

use crate::auth::AuthStore;
use crate::ws::broadcast::EventBroadcaster;

/// Central shared state — passed as Arc<AppState> to all Axum handlers.
pub struct AppState {
    pub config: SkynetConfig,
    event_seq: AtomicU64,
    pub broadcaster: EventBroadcaster,
    /// Typed system event bus (spec.md §4.10/§5/§12) — also handed to every
    /// per-session turn loop so tool/session events flow to one place.
    pub events: EventBus,
    pub auth: AuthStore,
    pub users: UserResolver,
    pub sessions: SessionStore,
    pub scheduler: SchedulerHandle,
    /// Terminal subsystem — shared with the tool registry, so it's an `Arc`
    /// around the async mutex rather than a bare one.
    pub terminal: Arc<AsyncMutex<TerminalManager>>,
    pub channels: Arc<AsyncMutex<ChannelManager>>,
    /// The LLM backend every turn loop streams against. spec.md §4.4 leaves
    /// the concrete wire format unimplemented; `InMemoryProvider` stands in
    /// until a real provider is configured.
    provider: Arc<dyn StreamingProvider>,
    /// One turn loop per session key, created lazily on first use (spec.md
    /// §4.6). A session's conversation and steering state live entirely in
    /// its loop, so distinct channels/users never interleave.
    turn_loops: DashMap<String, Arc<AgentTurnLoop>>,
    /// Active WS connections: conn_id -> message sender.
    pub ws_clients: DashMap<String, mpsc::Sender<String>>,
    /// Notification queue for HTTP/terminal clients: session_key -> pending messages.
    /// Drained by `GET /notifications`.
    pub notifications: DashMap<String, Vec<String>>,
    /// Active turn-loop operations: session_key -> CancellationToken.
    /// `/stop` cancels all tokens to abort running tool loops.
    pub active_operations: DashMap<String, CancellationToken>,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: SkynetConfig,
        events: EventBus,
        auth: AuthStore,
        users: UserResolver,
        sessions: SessionStore,
        scheduler: SchedulerHandle,
        terminal: TerminalManager,
        channels: ChannelManager,
    ) -> Self {
        Self {
            config,
            event_seq: AtomicU64::new(0),
            broadcaster: EventBroadcaster::new(),
            events,
            auth,
            users,
            sessions,
            scheduler,
            terminal: Arc::new(AsyncMutex::new(terminal)),
            channels: Arc::new(AsyncMutex::new(channels)),
            provider: Arc::new(InMemoryProvider::new(Vec::new())),
            turn_loops: DashMap::new(),
            ws_clients: DashMap::new(),
            notifications: DashMap::new(),
            active_operations: DashMap::new(),
        }
    }

    /// Monotonically increasing sequence for broadcast events.
    pub fn next_seq(&self) -> u64 {
        self.event_seq.fetch_add(1, Ordering::Relaxed)
    }

    /// Get or lazily create the turn loop for a session key.
    pub fn turn_loop_for(&self, session_key: &str) -> Arc<AgentTurnLoop> {
        self.turn_loops
            .entry(session_key.to_string())
            .or_insert_with(|| {
                let tools = build_tools(Arc::clone(&self.terminal), Arc::clone(&self.channels));
                Arc::new(AgentTurnLoop::new(
                    Arc::clone(&self.provider),
                    tools,
                    self.events.clone(),
                    session_key.to_string(),
                    self.config.agent.model.clone(),
                ))
            })
            .clone()
    }
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(crate::http::ui::ui_handler))
        .route("/health", get(crate::http::health::health_handler))
        .route("/chat", post(crate::http::chat::chat_handler))
        .route(
            "/notifications",
            get(crate::http::notifications::notifications_handler),
        )
        .route("/ws", get(crate::ws::connection::ws_handler))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
