use std::sync::Arc;

use shared::repositories::socket_repository::SocketRepository;
use shared::services::auth_service::AuthService;
use shared::services::ban_service::BanService;
use shared::services::emitter::Emitter;
use shared::services::ice_service::IceService;
use shared::services::queue_service::QueueService;
use shared::services::session_service::SessionService;
use shared::services::signal_service::SignalService;

use crate::emitter::LocalEmitter;

#[derive(Clone)]
pub struct AppState {
    pub auth_service: Arc<AuthService>,
    pub ban_service: Arc<BanService>,
    pub ice_service: Arc<IceService>,
    pub queue_service: Arc<QueueService>,
    pub session_service: Arc<SessionService>,
    pub signal_service: Arc<SignalService>,
    pub socket_repository: Arc<dyn SocketRepository>,
    /// Connections attached to this process.
    pub connections: Arc<LocalEmitter>,
    /// The cluster-wide emit boundary (local-only without Redis).
    pub emitter: Arc<dyn Emitter>,
}
