use std::collections::HashMap;

use async_trait::async_trait;
use redis::{aio::MultiplexedConnection, AsyncCommands};
use tokio::sync::RwLock;

use crate::keys;
use crate::models::ban::BanEntry;

#[derive(Debug)]
pub enum BanRepositoryError {
    Redis(String),
    Serialization(String),
}

impl std::fmt::Display for BanRepositoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BanRepositoryError::Redis(msg) => write!(f, "Redis error: {}", msg),
            BanRepositoryError::Serialization(msg) => write!(f, "Serialization error: {}", msg),
        }
    }
}

impl std::error::Error for BanRepositoryError {}

/// Expiring deny list keyed by uid. Timed entries carry a store TTL;
/// indefinite entries live until an explicit unban.
#[async_trait]
pub trait BanRepository: Send + Sync {
    async fn put(&self, entry: &BanEntry) -> Result<(), BanRepositoryError>;

    async fn get(&self, uid: &str) -> Result<Option<BanEntry>, BanRepositoryError>;

    async fn delete(&self, uid: &str) -> Result<(), BanRepositoryError>;
}

pub struct RedisBanRepository {
    connection: MultiplexedConnection,
}

impl RedisBanRepository {
    pub fn new(connection: MultiplexedConnection) -> Self {
        Self { connection }
    }
}

#[async_trait]
impl BanRepository for RedisBanRepository {
    async fn put(&self, entry: &BanEntry) -> Result<(), BanRepositoryError> {
        let payload = serde_json::to_string(entry)
            .map_err(|e| BanRepositoryError::Serialization(e.to_string()))?;
        let mut conn = self.connection.clone();
        let key = keys::ban_key(&entry.uid);
        if entry.is_permanent() {
            let _: () = conn
                .set(key, payload)
                .await
                .map_err(|e| BanRepositoryError::Redis(e.to_string()))?;
        } else {
            let ttl_secs = ((entry.expires_at - entry.banned_at) / 1_000).max(1) as u64;
            let _: () = conn
                .set_ex(key, payload, ttl_secs)
                .await
                .map_err(|e| BanRepositoryError::Redis(e.to_string()))?;
        }
        Ok(())
    }

    async fn get(&self, uid: &str) -> Result<Option<BanEntry>, BanRepositoryError> {
        let mut conn = self.connection.clone();
        let payload: Option<String> = conn
            .get(keys::ban_key(uid))
            .await
            .map_err(|e| BanRepositoryError::Redis(e.to_string()))?;
        match payload {
            Some(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|e| BanRepositoryError::Serialization(e.to_string())),
            None => Ok(None),
        }
    }

    async fn delete(&self, uid: &str) -> Result<(), BanRepositoryError> {
        let mut conn = self.connection.clone();
        let _: () = conn
            .del(keys::ban_key(uid))
            .await
            .map_err(|e| BanRepositoryError::Redis(e.to_string()))?;
        Ok(())
    }
}

/// Single-node fallback. Expiry is enforced on read by the service layer, so
/// entries past their TTL are simply left for the next delete.
#[derive(Default)]
pub struct MemoryBanRepository {
    entries: RwLock<HashMap<String, BanEntry>>,
}

impl MemoryBanRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BanRepository for MemoryBanRepository {
    async fn put(&self, entry: &BanEntry) -> Result<(), BanRepositoryError> {
        self.entries
            .write()
            .await
            .insert(entry.uid.clone(), entry.clone());
        Ok(())
    }

    async fn get(&self, uid: &str) -> Result<Option<BanEntry>, BanRepositoryError> {
        Ok(self.entries.read().await.get(uid).cloned())
    }

    async fn delete(&self, uid: &str) -> Result<(), BanRepositoryError> {
        self.entries.write().await.remove(uid);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_delete() {
        let repo = MemoryBanRepository::new();
        let entry = BanEntry::new("mallory", "abuse", 0);
        repo.put(&entry).await.unwrap();
        assert_eq!(repo.get("mallory").await.unwrap().unwrap().reason, "abuse");
        repo.delete("mallory").await.unwrap();
        assert!(repo.get("mallory").await.unwrap().is_none());
    }
}
