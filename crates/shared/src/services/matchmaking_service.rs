use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::models::events::ServerEvent;
use crate::models::queue::{Gender, QueueUser};
use crate::repositories::queue_repository::QueueRepository;
use crate::services::emitter::Emitter;
use crate::services::errors::matchmaking_service_errors::MatchmakingServiceError;
use crate::services::session_service::SessionService;

/// How many waiters are pulled from each partition per cycle.
pub const MATCH_BATCH_SIZE: usize = 100;

/// The match engine. One cycle per tick, run only by the lease holder, so
/// everything in here can assume it is the sole writer of the cycle's queue
/// mutations.
pub struct MatchmakingService {
    queue_repository: Arc<dyn QueueRepository>,
    session_service: Arc<SessionService>,
    emitter: Arc<dyn Emitter>,
}

impl MatchmakingService {
    pub fn new(
        queue_repository: Arc<dyn QueueRepository>,
        session_service: Arc<SessionService>,
        emitter: Arc<dyn Emitter>,
    ) -> Self {
        Self {
            queue_repository,
            session_service,
            emitter,
        }
    }

    /// Runs one matching cycle: batch-read both partitions, hydrate, send
    /// overdue bot-fallback notices, then pair oldest-first under reciprocal
    /// preferences. Returns the number of pairs handed to the session
    /// registry.
    pub async fn run_matching_cycle(&self) -> Result<usize, MatchmakingServiceError> {
        let now = Utc::now().timestamp_millis();

        let mut users: Vec<QueueUser> = Vec::new();
        for gender in [Gender::Male, Gender::Female] {
            let uids = self
                .queue_repository
                .range(gender, MATCH_BATCH_SIZE)
                .await
                .map_err(|e| MatchmakingServiceError::RepositoryError(e.to_string()))?;
            for uid in uids {
                match self
                    .queue_repository
                    .get_user(&uid)
                    .await
                    .map_err(|e| MatchmakingServiceError::RepositoryError(e.to_string()))?
                {
                    Some(user) => users.push(user),
                    None => warn!("Skipping queued uid {} with missing payload", uid),
                }
            }
        }

        self.send_bot_mode_notices(&mut users, now).await?;

        users.sort_by_key(|user| user.joined_at);

        let mut matched: HashSet<String> = HashSet::new();
        let mut pairs = 0;
        for i in 0..users.len() {
            if matched.contains(&users[i].uid) {
                continue;
            }
            let candidate = (i + 1..users.len()).find(|&j| {
                !matched.contains(&users[j].uid)
                    && Self::is_pair_compatible(&users[i], &users[j], now)
            });
            let Some(j) = candidate else {
                debug!("No candidate for {} this cycle", users[i].uid);
                continue;
            };

            let (user, partner) = (users[i].clone(), users[j].clone());
            matched.insert(user.uid.clone());
            matched.insert(partner.uid.clone());
            for uid in [&user.uid, &partner.uid] {
                self.queue_repository
                    .remove_by_uid(uid)
                    .await
                    .map_err(|e| MatchmakingServiceError::RepositoryError(e.to_string()))?;
            }
            pairs += 1;

            // Failures stay inside the cycle; the pair is already dequeued
            // and the session registry handles the survivor.
            if let Err(e) = self
                .session_service
                .execute_match(&user, &partner, user.mode)
                .await
            {
                error!(
                    "Failed to execute match between {} and {}: {}",
                    user.uid, partner.uid, e
                );
            }
        }

        if pairs > 0 {
            info!("Matching cycle paired {} couple(s)", pairs);
        }
        Ok(pairs)
    }

    /// Emits `start_bot_mode` once per queue lifetime to anyone waiting past
    /// the fallback threshold. The user stays queued; an actual bot partner
    /// is the client's business.
    async fn send_bot_mode_notices(
        &self,
        users: &mut [QueueUser],
        now: i64,
    ) -> Result<(), MatchmakingServiceError> {
        for user in users.iter_mut() {
            if !user.bot_mode_due(now) {
                continue;
            }
            self.emitter
                .emit(
                    &user.socket_id,
                    ServerEvent::StartBotMode {
                        reason: "timeout_waiting".to_string(),
                    },
                )
                .await;
            self.queue_repository
                .mark_bot_mode(&user.uid)
                .await
                .map_err(|e| MatchmakingServiceError::RepositoryError(e.to_string()))?;
            user.bot_mode_active = true;
            info!(
                "Sent bot-mode notice to {} after {} ms in queue",
                user.uid,
                user.wait_ms(now)
            );
        }
        Ok(())
    }

    /// The reciprocal compatibility table. Location filters only apply while
    /// their owner is still at stage 0; gender must be accepted by both sides
    /// under each side's own stage; mode is always strict.
    fn is_pair_compatible(user: &QueueUser, candidate: &QueueUser, now_ms: i64) -> bool {
        if user.uid == candidate.uid {
            return false;
        }
        if user.mode != candidate.mode {
            return false;
        }
        let user_stage = user.widen_stage(now_ms);
        let candidate_stage = candidate.widen_stage(now_ms);
        if !user.accepts_gender(user_stage, candidate.gender)
            || !candidate.accepts_gender(candidate_stage, user.gender)
        {
            return false;
        }
        if user_stage < 1 {
            if let Some(wanted) = &user.preferences.location {
                if candidate.location.as_deref() != Some(wanted.as_str()) {
                    return false;
                }
            }
        }
        if candidate_stage < 1 {
            if let Some(wanted) = &candidate.preferences.location {
                if user.location.as_deref() != Some(wanted.as_str()) {
                    return false;
                }
            }
        }
        true
    }
}
