use std::net::SocketAddr;
use std::sync::Arc;

use axum::{routing::get, Router};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

pub mod config;
pub mod emitter;
pub mod routes;
pub mod state;
pub mod ticker;
pub mod ws;

use shared::repositories::ban_repository::{
    BanRepository, MemoryBanRepository, RedisBanRepository,
};
use shared::repositories::lease_repository::{
    LeaseRepository, MemoryLeaseRepository, RedisLeaseRepository,
};
use shared::repositories::queue_repository::{
    MemoryQueueRepository, QueueRepository, RedisQueueRepository,
};
use shared::repositories::session_repository::{
    MemorySessionRepository, RedisSessionRepository, SessionRepository,
};
use shared::repositories::socket_repository::{
    MemorySocketRepository, RedisSocketRepository, SocketRepository,
};
use shared::services::analytics::TracingAnalytics;
use shared::services::auth_service::AuthService;
use shared::services::ban_service::BanService;
use shared::services::emitter::Emitter;
use shared::services::ice_service::IceService;
use shared::services::matchmaking_service::MatchmakingService;
use shared::services::profile::MemoryProfileProvider;
use shared::services::queue_service::QueueService;
use shared::services::session_service::SessionService;
use shared::services::signal_service::SignalService;

use crate::config::Config;
use crate::emitter::{FanoutEmitter, LocalEmitter};
use crate::state::AppState;

struct Backend {
    socket_repository: Arc<dyn SocketRepository>,
    queue_repository: Arc<dyn QueueRepository>,
    session_repository: Arc<dyn SessionRepository>,
    ban_repository: Arc<dyn BanRepository>,
    lease_repository: Arc<dyn LeaseRepository>,
    emitter: Arc<dyn Emitter>,
}

/// Wires the storage layer and emit fabric against Redis, or falls back to
/// the in-process implementations when no REDIS_URL is configured.
async fn build_backend(
    config: &Config,
    connections: Arc<LocalEmitter>,
) -> Result<Backend, Box<dyn std::error::Error>> {
    match &config.redis_url {
        Some(url) => {
            let client = redis::Client::open(url.as_str())?;
            let connection = client.get_multiplexed_async_connection().await?;
            tokio::spawn(emitter::run_fanout_subscriber(
                client,
                connections.clone(),
            ));
            info!("Connected to Redis at {}", url);
            Ok(Backend {
                socket_repository: Arc::new(RedisSocketRepository::new(connection.clone())),
                queue_repository: Arc::new(RedisQueueRepository::new(connection.clone())),
                session_repository: Arc::new(RedisSessionRepository::new(connection.clone())),
                ban_repository: Arc::new(RedisBanRepository::new(connection.clone())),
                lease_repository: Arc::new(RedisLeaseRepository::new(connection.clone())),
                emitter: Arc::new(FanoutEmitter::new(connections, connection)),
            })
        }
        None => {
            info!("REDIS_URL not set; running single-node with in-memory state");
            Ok(Backend {
                socket_repository: Arc::new(MemorySocketRepository::new()),
                queue_repository: Arc::new(MemoryQueueRepository::new()),
                session_repository: Arc::new(MemorySessionRepository::new()),
                ban_repository: Arc::new(MemoryBanRepository::new()),
                lease_repository: Arc::new(MemoryLeaseRepository::new()),
                emitter: connections,
            })
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = Config::from_env()?;
    let connections = Arc::new(LocalEmitter::new());
    let backend = build_backend(&config, connections.clone()).await?;

    let auth_service = Arc::new(AuthService::new(
        config.jwt_secret.clone(),
        config.server_key.clone(),
    ));
    let ban_service = Arc::new(BanService::new(backend.ban_repository.clone()));
    let ice_service = Arc::new(IceService::new(
        config.game_turn.clone(),
        config.video_turn.clone(),
    ));
    let profile_provider = Arc::new(MemoryProfileProvider::new());
    let queue_service = Arc::new(QueueService::new(
        backend.queue_repository.clone(),
        ban_service.clone(),
        profile_provider.clone(),
    ));
    let session_service = Arc::new(SessionService::new(
        backend.session_repository.clone(),
        backend.socket_repository.clone(),
        backend.queue_repository.clone(),
        ice_service.clone(),
        profile_provider,
        Arc::new(TracingAnalytics),
        backend.emitter.clone(),
    ));
    let matchmaking_service = Arc::new(MatchmakingService::new(
        backend.queue_repository.clone(),
        session_service.clone(),
        backend.emitter.clone(),
    ));
    let signal_service = Arc::new(SignalService::new(
        backend.socket_repository.clone(),
        backend.session_repository.clone(),
    ));

    ticker::spawn_matchmaking_tick(matchmaking_service, backend.lease_repository);
    ticker::spawn_room_reaper(session_service.clone());

    let app_state = AppState {
        auth_service,
        ban_service,
        ice_service,
        queue_service,
        session_service,
        signal_service,
        socket_repository: backend.socket_repository,
        connections,
        emitter: backend.emitter,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(routes::health::health_check))
        .route(&config.ws_path, get(ws::ws_handler))
        .layer(cors)
        .with_state(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Matchmaking broker listening on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
