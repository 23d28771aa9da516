use std::collections::HashMap;

use async_trait::async_trait;
use redis::{aio::MultiplexedConnection, AsyncCommands};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::keys;
use crate::models::queue::{Gender, QueueUser};

#[derive(Debug)]
pub enum QueueRepositoryError {
    Redis(String),
    Serialization(String),
}

impl std::fmt::Display for QueueRepositoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueRepositoryError::Redis(msg) => write!(f, "Redis error: {}", msg),
            QueueRepositoryError::Serialization(msg) => write!(f, "Serialization error: {}", msg),
        }
    }
}

impl std::error::Error for QueueRepositoryError {}

/// The two time-ordered queue partitions plus the per-uid payload store.
/// Partitions are disjoint by uid: joining always removes any prior entry
/// first, so a rejoin can never leave a stale twin behind.
#[async_trait]
pub trait QueueRepository: Send + Sync {
    async fn join_queue(&self, user: &QueueUser) -> Result<(), QueueRepositoryError>;

    async fn remove_by_uid(&self, uid: &str) -> Result<(), QueueRepositoryError>;

    async fn remove_by_socket(&self, socket_id: &str) -> Result<(), QueueRepositoryError>;

    /// Oldest-first uids of one partition, at most `limit` of them.
    async fn range(&self, gender: Gender, limit: usize)
        -> Result<Vec<String>, QueueRepositoryError>;

    /// Hydrates one payload. Malformed payloads read as absent (and are
    /// logged); the caller skips them.
    async fn get_user(&self, uid: &str) -> Result<Option<QueueUser>, QueueRepositoryError>;

    /// Persists the one-shot bot-mode flag without touching queue position.
    async fn mark_bot_mode(&self, uid: &str) -> Result<(), QueueRepositoryError>;
}

pub struct RedisQueueRepository {
    connection: MultiplexedConnection,
}

impl RedisQueueRepository {
    pub fn new(connection: MultiplexedConnection) -> Self {
        Self { connection }
    }

    async fn write_payload(
        &self,
        conn: &mut MultiplexedConnection,
        user: &QueueUser,
    ) -> Result<(), QueueRepositoryError> {
        let payload = serde_json::to_string(user)
            .map_err(|e| QueueRepositoryError::Serialization(e.to_string()))?;
        let _: () = conn
            .set(keys::queue_user_key(&user.uid), payload)
            .await
            .map_err(|e| QueueRepositoryError::Redis(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl QueueRepository for RedisQueueRepository {
    async fn join_queue(&self, user: &QueueUser) -> Result<(), QueueRepositoryError> {
        self.remove_by_uid(&user.uid).await?;
        let mut conn = self.connection.clone();
        let _: () = conn
            .zadd(keys::queue_key(user.gender), &user.uid, user.joined_at)
            .await
            .map_err(|e| QueueRepositoryError::Redis(e.to_string()))?;
        self.write_payload(&mut conn, user).await?;
        let _: () = conn
            .set(keys::queue_socket_key(&user.socket_id), &user.uid)
            .await
            .map_err(|e| QueueRepositoryError::Redis(e.to_string()))?;
        info!(
            "User {} joined the {} queue (mode: {})",
            user.uid,
            user.gender.as_str(),
            user.mode.as_str()
        );
        Ok(())
    }

    async fn remove_by_uid(&self, uid: &str) -> Result<(), QueueRepositoryError> {
        let mut conn = self.connection.clone();
        // The socket index is derived from the payload; drop it first.
        if let Some(user) = self.get_user(uid).await? {
            let _: () = conn
                .del(keys::queue_socket_key(&user.socket_id))
                .await
                .map_err(|e| QueueRepositoryError::Redis(e.to_string()))?;
        }
        for gender in [Gender::Male, Gender::Female] {
            let _: () = conn
                .zrem(keys::queue_key(gender), uid)
                .await
                .map_err(|e| QueueRepositoryError::Redis(e.to_string()))?;
        }
        let _: () = conn
            .del(keys::queue_user_key(uid))
            .await
            .map_err(|e| QueueRepositoryError::Redis(e.to_string()))?;
        Ok(())
    }

    async fn remove_by_socket(&self, socket_id: &str) -> Result<(), QueueRepositoryError> {
        let mut conn = self.connection.clone();
        let uid: Option<String> = conn
            .get(keys::queue_socket_key(socket_id))
            .await
            .map_err(|e| QueueRepositoryError::Redis(e.to_string()))?;
        let Some(uid) = uid else {
            return Ok(());
        };
        let _: () = conn
            .del(keys::queue_socket_key(socket_id))
            .await
            .map_err(|e| QueueRepositoryError::Redis(e.to_string()))?;
        // Only the socket named in the payload may evict the entry; a stale
        // index must not dequeue a user who re-joined from a newer tab.
        match self.get_user(&uid).await? {
            Some(user) if user.socket_id == socket_id => {
                self.remove_by_uid(&uid).await?;
                info!("Removed user {} from queue (socket {} gone)", uid, socket_id);
            }
            _ => {}
        }
        Ok(())
    }

    async fn range(
        &self,
        gender: Gender,
        limit: usize,
    ) -> Result<Vec<String>, QueueRepositoryError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.connection.clone();
        conn.zrange(keys::queue_key(gender), 0, limit as isize - 1)
            .await
            .map_err(|e| QueueRepositoryError::Redis(e.to_string()))
    }

    async fn get_user(&self, uid: &str) -> Result<Option<QueueUser>, QueueRepositoryError> {
        let mut conn = self.connection.clone();
        let payload: Option<String> = conn
            .get(keys::queue_user_key(uid))
            .await
            .map_err(|e| QueueRepositoryError::Redis(e.to_string()))?;
        match payload {
            Some(json) => match serde_json::from_str(&json) {
                Ok(user) => Ok(Some(user)),
                Err(e) => {
                    warn!("Malformed queue payload for user {}: {}", uid, e);
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    async fn mark_bot_mode(&self, uid: &str) -> Result<(), QueueRepositoryError> {
        if let Some(mut user) = self.get_user(uid).await? {
            user.bot_mode_active = true;
            let mut conn = self.connection.clone();
            self.write_payload(&mut conn, &user).await?;
        }
        Ok(())
    }
}

/// Single-node fallback; one ordered map per partition keyed by
/// (joined_at, uid) so iteration order matches the sorted-set contract.
#[derive(Default)]
pub struct MemoryQueueRepository {
    partitions: RwLock<HashMap<Gender, Vec<String>>>,
    payloads: RwLock<HashMap<String, QueueUser>>,
}

impl MemoryQueueRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops only the payload, leaving the partition entry dangling the way
    /// a half-failed write would.
    #[cfg(test)]
    pub async fn forget_payload(&self, uid: &str) {
        self.payloads.write().await.remove(uid);
    }
}

#[async_trait]
impl QueueRepository for MemoryQueueRepository {
    async fn join_queue(&self, user: &QueueUser) -> Result<(), QueueRepositoryError> {
        self.remove_by_uid(&user.uid).await?;
        let mut partitions = self.partitions.write().await;
        let mut payloads = self.payloads.write().await;
        payloads.insert(user.uid.clone(), user.clone());
        let partition = partitions.entry(user.gender).or_default();
        partition.push(user.uid.clone());
        partition.sort_by_key(|uid| payloads.get(uid).map(|u| u.joined_at).unwrap_or(i64::MAX));
        Ok(())
    }

    async fn remove_by_uid(&self, uid: &str) -> Result<(), QueueRepositoryError> {
        let mut partitions = self.partitions.write().await;
        for partition in partitions.values_mut() {
            partition.retain(|entry| entry != uid);
        }
        self.payloads.write().await.remove(uid);
        Ok(())
    }

    async fn remove_by_socket(&self, socket_id: &str) -> Result<(), QueueRepositoryError> {
        let uid = self
            .payloads
            .read()
            .await
            .values()
            .find(|user| user.socket_id == socket_id)
            .map(|user| user.uid.clone());
        if let Some(uid) = uid {
            self.remove_by_uid(&uid).await?;
        }
        Ok(())
    }

    async fn range(
        &self,
        gender: Gender,
        limit: usize,
    ) -> Result<Vec<String>, QueueRepositoryError> {
        let partitions = self.partitions.read().await;
        Ok(partitions
            .get(&gender)
            .map(|p| p.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn get_user(&self, uid: &str) -> Result<Option<QueueUser>, QueueRepositoryError> {
        Ok(self.payloads.read().await.get(uid).cloned())
    }

    async fn mark_bot_mode(&self, uid: &str) -> Result<(), QueueRepositoryError> {
        if let Some(user) = self.payloads.write().await.get_mut(uid) {
            user.bot_mode_active = true;
        }
        Ok(())
    }
}
