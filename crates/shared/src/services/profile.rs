use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::models::queue::{Gender, Tier};

/// The matchmaking-relevant slice of a user profile.
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    pub gender: Gender,
    pub location: Option<String>,
    pub tier: Tier,
}

/// Seam to the external profile/stats backend. The broker only ever reads
/// the fields above and bumps the match counter; everything else about the
/// account system lives on the other side of this trait.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProfileProvider: Send + Sync {
    async fn get_profile(&self, uid: &str) -> Option<Profile>;

    /// Fire-and-forget stats increment; never called for guest uids.
    async fn increment_matches(&self, uid: &str);
}

/// In-memory provider used in single-node mode and in tests. Seedable.
#[derive(Default)]
pub struct MemoryProfileProvider {
    profiles: RwLock<HashMap<String, Profile>>,
    match_counts: RwLock<HashMap<String, u64>>,
}

impl MemoryProfileProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_profile(&self, uid: &str, profile: Profile) {
        self.profiles
            .write()
            .await
            .insert(uid.to_string(), profile);
    }

    pub async fn match_count(&self, uid: &str) -> u64 {
        self.match_counts
            .read()
            .await
            .get(uid)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl ProfileProvider for MemoryProfileProvider {
    async fn get_profile(&self, uid: &str) -> Option<Profile> {
        self.profiles.read().await.get(uid).cloned()
    }

    async fn increment_matches(&self, uid: &str) {
        *self
            .match_counts
            .write()
            .await
            .entry(uid.to_string())
            .or_insert(0) += 1;
    }
}
