use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::models::ban::BanEntry;
use crate::models::is_guest;
use crate::repositories::ban_repository::BanRepository;
use crate::services::errors::ban_service_errors::BanServiceError;

/// The Ban Gate. Only consulted at queue admission; guests bypass uid-keyed
/// bans entirely (IP-level moderation is someone else's job).
#[derive(Clone)]
pub struct BanService {
    repository: Arc<dyn BanRepository>,
}

impl BanService {
    pub fn new(repository: Arc<dyn BanRepository>) -> Self {
        Self { repository }
    }

    pub async fn ban_user(
        &self,
        uid: &str,
        reason: &str,
        duration_minutes: i64,
    ) -> Result<BanEntry, BanServiceError> {
        let entry = BanEntry::new(uid, reason, duration_minutes);
        self.repository
            .put(&entry)
            .await
            .map_err(|e| BanServiceError::RepositoryError(e.to_string()))?;
        info!(
            "Banned user {} for {} ({})",
            uid,
            if entry.is_permanent() {
                "ever".to_string()
            } else {
                format!("{} minutes", duration_minutes)
            },
            reason
        );
        Ok(entry)
    }

    pub async fn unban_user(&self, uid: &str) -> Result<(), BanServiceError> {
        self.repository
            .delete(uid)
            .await
            .map_err(|e| BanServiceError::RepositoryError(e.to_string()))?;
        info!("Unbanned user {}", uid);
        Ok(())
    }

    /// Expired entries read as absent even before the store reaps them.
    pub async fn is_banned(&self, uid: &str) -> Result<Option<BanEntry>, BanServiceError> {
        if is_guest(uid) {
            return Ok(None);
        }
        let entry = self
            .repository
            .get(uid)
            .await
            .map_err(|e| BanServiceError::RepositoryError(e.to_string()))?;
        let now = Utc::now().timestamp_millis();
        Ok(entry.filter(|e| !e.is_expired(now)))
    }

    /// `>0` ms remaining, `-1` permanent, `0` not banned.
    pub async fn remaining_ban_ms(&self, uid: &str) -> Result<i64, BanServiceError> {
        let now = Utc::now().timestamp_millis();
        Ok(self
            .is_banned(uid)
            .await?
            .map(|entry| entry.remaining_ms(now))
            .unwrap_or(0))
    }
}
