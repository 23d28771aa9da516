use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error};
use uuid::Uuid;

use shared::repositories::lease_repository::LeaseRepository;
use shared::services::matchmaking_service::MatchmakingService;
use shared::services::session_service::SessionService;

/// How often a replica volunteers to run a matching cycle.
pub const TICK_INTERVAL: Duration = Duration::from_secs(2);
/// How often stale pending rooms are swept.
pub const REAPER_INTERVAL: Duration = Duration::from_secs(5);

/// The tick task. Each firing races for the lease; only the winner runs the
/// cycle, and losing is the normal case on every replica but one.
pub fn spawn_matchmaking_tick(
    matchmaking_service: Arc<MatchmakingService>,
    lease_repository: Arc<dyn LeaseRepository>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(TICK_INTERVAL);
        loop {
            interval.tick().await;
            let token = Uuid::new_v4().to_string();
            match lease_repository.try_acquire(&token).await {
                Ok(true) => {
                    if let Err(e) = matchmaking_service.run_matching_cycle().await {
                        error!("Matching cycle failed: {}", e);
                    }
                    if let Err(e) = lease_repository.release(&token).await {
                        error!("Failed to release matchmaking lease: {}", e);
                    }
                }
                Ok(false) => debug!("Another replica holds the matchmaking lease"),
                Err(e) => error!("Lease acquisition failed: {}", e),
            }
        }
    })
}

pub fn spawn_room_reaper(session_service: Arc<SessionService>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(REAPER_INTERVAL);
        loop {
            interval.tick().await;
            match session_service.reap_stale_rooms().await {
                Ok(0) => {}
                Ok(reaped) => debug!("Reaped {} stale room(s)", reaped),
                Err(e) => error!("Room reaper failed: {}", e),
            }
        }
    })
}
