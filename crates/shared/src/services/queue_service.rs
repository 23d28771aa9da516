use std::sync::Arc;

use tracing::info;

use crate::models::ban::BanEntry;
use crate::models::events::JoinQueueRequest;
use crate::models::is_guest;
use crate::models::queue::{QueueUser, Tier};
use crate::repositories::queue_repository::QueueRepository;
use crate::services::ban_service::BanService;
use crate::services::errors::queue_service_errors::QueueServiceError;
use crate::services::profile::{Profile, ProfileProvider};

/// What became of a join attempt. A ban is an expected outcome here, not a
/// fault.
#[derive(Debug)]
pub enum JoinQueueOutcome {
    Joined(QueueUser),
    Banned(BanEntry),
}

/// Queue admission: ban gate, profile resolution, tier-filtered preferences,
/// then the actual partition insert.
#[derive(Clone)]
pub struct QueueService {
    queue_repository: Arc<dyn QueueRepository>,
    ban_service: Arc<BanService>,
    profile_provider: Arc<dyn ProfileProvider>,
}

impl QueueService {
    pub fn new(
        queue_repository: Arc<dyn QueueRepository>,
        ban_service: Arc<BanService>,
        profile_provider: Arc<dyn ProfileProvider>,
    ) -> Self {
        Self {
            queue_repository,
            ban_service,
            profile_provider,
        }
    }

    pub async fn join_queue(
        &self,
        uid: &str,
        socket_id: &str,
        request: &JoinQueueRequest,
    ) -> Result<JoinQueueOutcome, QueueServiceError> {
        if uid.is_empty() {
            return Err(QueueServiceError::ValidationError(
                "User id cannot be empty".to_string(),
            ));
        }

        if let Some(entry) = self
            .ban_service
            .is_banned(uid)
            .await
            .map_err(|e| QueueServiceError::RepositoryError(e.to_string()))?
        {
            info!("Rejected queue join for banned user {}", uid);
            return Ok(JoinQueueOutcome::Banned(entry));
        }

        let profile = self.resolve_profile(uid, request).await?;
        let user = QueueUser::new(
            uid,
            socket_id,
            profile.gender,
            profile.location,
            profile.tier,
            request.mode,
            request.preferences.clone(),
        );
        self.queue_repository
            .join_queue(&user)
            .await
            .map_err(|e| QueueServiceError::RepositoryError(e.to_string()))?;
        Ok(JoinQueueOutcome::Joined(user))
    }

    /// Guests with no profile record may self-describe in the join payload;
    /// everyone else must have a complete profile upstream.
    async fn resolve_profile(
        &self,
        uid: &str,
        request: &JoinQueueRequest,
    ) -> Result<Profile, QueueServiceError> {
        if let Some(profile) = self.profile_provider.get_profile(uid).await {
            return Ok(profile);
        }
        if is_guest(uid) {
            if let Some(gender) = request.gender {
                return Ok(Profile {
                    gender,
                    location: request.location.clone(),
                    tier: Tier::Free,
                });
            }
        }
        Err(QueueServiceError::ProfileMissing)
    }

    pub async fn leave_queue(&self, uid: &str) -> Result<(), QueueServiceError> {
        self.queue_repository
            .remove_by_uid(uid)
            .await
            .map_err(|e| QueueServiceError::RepositoryError(e.to_string()))?;
        info!("User {} left the queue", uid);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::queue::{Gender, MatchMode, Preferences};
    use crate::repositories::ban_repository::MemoryBanRepository;
    use crate::repositories::queue_repository::MemoryQueueRepository;
    use crate::services::profile::{MemoryProfileProvider, MockProfileProvider};

    fn request(mode: MatchMode) -> JoinQueueRequest {
        JoinQueueRequest {
            mode,
            preferences: Preferences::default(),
            gender: None,
            location: None,
        }
    }

    async fn service_with_profile(uid: &str, profile: Profile) -> (QueueService, Arc<MemoryQueueRepository>) {
        let queue_repository = Arc::new(MemoryQueueRepository::new());
        let provider = MemoryProfileProvider::new();
        provider.set_profile(uid, profile).await;
        let service = QueueService::new(
            queue_repository.clone(),
            Arc::new(BanService::new(Arc::new(MemoryBanRepository::new()))),
            Arc::new(provider),
        );
        (service, queue_repository)
    }

    #[tokio::test]
    async fn test_join_queue_uses_profile_fields() {
        let (service, queue_repository) = service_with_profile(
            "alice",
            Profile {
                gender: Gender::Female,
                location: Some("IN".to_string()),
                tier: Tier::Gold,
            },
        )
        .await;

        let outcome = service
            .join_queue(
                "alice",
                "s1",
                &JoinQueueRequest {
                    mode: MatchMode::Random,
                    preferences: Preferences {
                        gender: Some(Gender::Male),
                        location: Some("US".to_string()),
                    },
                    gender: None,
                    location: None,
                },
            )
            .await
            .unwrap();

        let JoinQueueOutcome::Joined(user) = outcome else {
            panic!("expected a joined outcome");
        };
        assert_eq!(user.gender, Gender::Female);
        assert_eq!(user.tier, Tier::Gold);
        // GOLD keeps the gender preference but loses the location filter.
        assert_eq!(user.preferences.gender, Some(Gender::Male));
        assert_eq!(user.preferences.location, None);
        assert_eq!(
            queue_repository.range(Gender::Female, 10).await.unwrap(),
            vec!["alice".to_string()]
        );
    }

    #[tokio::test]
    async fn test_banned_user_is_not_admitted() {
        let queue_repository = Arc::new(MemoryQueueRepository::new());
        let ban_service = Arc::new(BanService::new(Arc::new(MemoryBanRepository::new())));
        let provider = MemoryProfileProvider::new();
        provider
            .set_profile(
                "mallory",
                Profile {
                    gender: Gender::Male,
                    location: None,
                    tier: Tier::Free,
                },
            )
            .await;
        let service = QueueService::new(
            queue_repository.clone(),
            ban_service.clone(),
            Arc::new(provider),
        );
        ban_service.ban_user("mallory", "abuse", 0).await.unwrap();

        let outcome = service
            .join_queue("mallory", "s1", &request(MatchMode::Random))
            .await
            .unwrap();
        assert!(matches!(outcome, JoinQueueOutcome::Banned(_)));
        assert!(queue_repository.range(Gender::Male, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_guest_without_profile_uses_payload_fields() {
        let service = QueueService::new(
            Arc::new(MemoryQueueRepository::new()),
            Arc::new(BanService::new(Arc::new(MemoryBanRepository::new()))),
            Arc::new(MemoryProfileProvider::new()),
        );
        let outcome = service
            .join_queue(
                "guest_42",
                "s1",
                &JoinQueueRequest {
                    mode: MatchMode::Video,
                    preferences: Preferences::default(),
                    gender: Some(Gender::Male),
                    location: Some("US".to_string()),
                },
            )
            .await
            .unwrap();
        let JoinQueueOutcome::Joined(user) = outcome else {
            panic!("expected a joined outcome");
        };
        assert_eq!(user.tier, Tier::Free);
        assert_eq!(user.location, Some("US".to_string()));
    }

    #[tokio::test]
    async fn test_missing_profile_is_an_error() {
        let mut provider = MockProfileProvider::new();
        provider.expect_get_profile().returning(|_| None);
        let service = QueueService::new(
            Arc::new(MemoryQueueRepository::new()),
            Arc::new(BanService::new(Arc::new(MemoryBanRepository::new()))),
            Arc::new(provider),
        );
        let result = service
            .join_queue("alice", "s1", &request(MatchMode::Random))
            .await;
        assert!(matches!(result, Err(QueueServiceError::ProfileMissing)));
    }

    #[tokio::test]
    async fn test_leave_queue_removes_entry() {
        let (service, queue_repository) = service_with_profile(
            "alice",
            Profile {
                gender: Gender::Female,
                location: None,
                tier: Tier::Free,
            },
        )
        .await;
        service
            .join_queue("alice", "s1", &request(MatchMode::Random))
            .await
            .unwrap();
        service.leave_queue("alice").await.unwrap();
        assert!(queue_repository
            .range(Gender::Female, 10)
            .await
            .unwrap()
            .is_empty());
    }
}
