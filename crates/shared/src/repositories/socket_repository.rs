use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use redis::{aio::MultiplexedConnection, AsyncCommands};
use tokio::sync::RwLock;
use tracing::info;

use crate::keys;
use crate::models::{is_bot, is_guest};

#[derive(Debug)]
pub enum SocketRepositoryError {
    Redis(String),
}

impl std::fmt::Display for SocketRepositoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SocketRepositoryError::Redis(msg) => write!(f, "Redis error: {}", msg),
        }
    }
}

impl std::error::Error for SocketRepositoryError {}

/// Bidirectional socket/uid bindings plus the online-users set. One active
/// socket per uid; registering a newer socket supersedes the old one, and an
/// old socket unregistering must never evict a newer binding.
#[async_trait]
pub trait SocketRepository: Send + Sync {
    async fn register(&self, socket_id: &str, uid: &str) -> Result<(), SocketRepositoryError>;

    async fn unregister(&self, socket_id: &str) -> Result<(), SocketRepositoryError>;

    async fn socket_for_uid(&self, uid: &str) -> Result<Option<String>, SocketRepositoryError>;

    async fn uid_for_socket(&self, socket_id: &str)
        -> Result<Option<String>, SocketRepositoryError>;

    async fn online_count(&self) -> Result<usize, SocketRepositoryError>;
}

pub struct RedisSocketRepository {
    connection: MultiplexedConnection,
}

impl RedisSocketRepository {
    pub fn new(connection: MultiplexedConnection) -> Self {
        Self { connection }
    }
}

#[async_trait]
impl SocketRepository for RedisSocketRepository {
    async fn register(&self, socket_id: &str, uid: &str) -> Result<(), SocketRepositoryError> {
        let mut conn = self.connection.clone();
        let _: () = conn
            .set_ex(
                keys::socket_uid_key(socket_id),
                uid,
                keys::SOCKET_BINDING_TTL_SECS,
            )
            .await
            .map_err(|e| SocketRepositoryError::Redis(e.to_string()))?;
        let _: () = conn
            .set_ex(
                keys::uid_socket_key(uid),
                socket_id,
                keys::SOCKET_BINDING_TTL_SECS,
            )
            .await
            .map_err(|e| SocketRepositoryError::Redis(e.to_string()))?;
        if !is_guest(uid) && !is_bot(uid) {
            let _: () = conn
                .sadd(keys::ONLINE_USERS_KEY, uid)
                .await
                .map_err(|e| SocketRepositoryError::Redis(e.to_string()))?;
        }
        info!("Registered socket {} for user {}", socket_id, uid);
        Ok(())
    }

    async fn unregister(&self, socket_id: &str) -> Result<(), SocketRepositoryError> {
        let mut conn = self.connection.clone();
        let uid: Option<String> = conn
            .get(keys::socket_uid_key(socket_id))
            .await
            .map_err(|e| SocketRepositoryError::Redis(e.to_string()))?;
        let _: () = conn
            .del(keys::socket_uid_key(socket_id))
            .await
            .map_err(|e| SocketRepositoryError::Redis(e.to_string()))?;

        if let Some(uid) = uid {
            // Only drop the reverse binding if it still points at this socket;
            // a newer tab owns it otherwise.
            let current: Option<String> = conn
                .get(keys::uid_socket_key(&uid))
                .await
                .map_err(|e| SocketRepositoryError::Redis(e.to_string()))?;
            if current.as_deref() == Some(socket_id) {
                let _: () = conn
                    .del(keys::uid_socket_key(&uid))
                    .await
                    .map_err(|e| SocketRepositoryError::Redis(e.to_string()))?;
                let _: () = conn
                    .srem(keys::ONLINE_USERS_KEY, &uid)
                    .await
                    .map_err(|e| SocketRepositoryError::Redis(e.to_string()))?;
            }
            info!("Unregistered socket {} for user {}", socket_id, uid);
        }
        Ok(())
    }

    async fn socket_for_uid(&self, uid: &str) -> Result<Option<String>, SocketRepositoryError> {
        let mut conn = self.connection.clone();
        conn.get(keys::uid_socket_key(uid))
            .await
            .map_err(|e| SocketRepositoryError::Redis(e.to_string()))
    }

    async fn uid_for_socket(
        &self,
        socket_id: &str,
    ) -> Result<Option<String>, SocketRepositoryError> {
        let mut conn = self.connection.clone();
        conn.get(keys::socket_uid_key(socket_id))
            .await
            .map_err(|e| SocketRepositoryError::Redis(e.to_string()))
    }

    async fn online_count(&self) -> Result<usize, SocketRepositoryError> {
        let mut conn = self.connection.clone();
        conn.scard(keys::ONLINE_USERS_KEY)
            .await
            .map_err(|e| SocketRepositoryError::Redis(e.to_string()))
    }
}

/// Single-node fallback used when no Redis URL is configured.
#[derive(Default)]
pub struct MemorySocketRepository {
    forward: RwLock<HashMap<String, String>>,
    reverse: RwLock<HashMap<String, String>>,
    online: RwLock<HashSet<String>>,
}

impl MemorySocketRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SocketRepository for MemorySocketRepository {
    async fn register(&self, socket_id: &str, uid: &str) -> Result<(), SocketRepositoryError> {
        self.forward
            .write()
            .await
            .insert(socket_id.to_string(), uid.to_string());
        self.reverse
            .write()
            .await
            .insert(uid.to_string(), socket_id.to_string());
        if !is_guest(uid) && !is_bot(uid) {
            self.online.write().await.insert(uid.to_string());
        }
        Ok(())
    }

    async fn unregister(&self, socket_id: &str) -> Result<(), SocketRepositoryError> {
        let uid = self.forward.write().await.remove(socket_id);
        if let Some(uid) = uid {
            let mut reverse = self.reverse.write().await;
            if reverse.get(&uid).map(|s| s.as_str()) == Some(socket_id) {
                reverse.remove(&uid);
                self.online.write().await.remove(&uid);
            }
        }
        Ok(())
    }

    async fn socket_for_uid(&self, uid: &str) -> Result<Option<String>, SocketRepositoryError> {
        Ok(self.reverse.read().await.get(uid).cloned())
    }

    async fn uid_for_socket(
        &self,
        socket_id: &str,
    ) -> Result<Option<String>, SocketRepositoryError> {
        Ok(self.forward.read().await.get(socket_id).cloned())
    }

    async fn online_count(&self) -> Result<usize, SocketRepositoryError> {
        Ok(self.online.read().await.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_and_lookup() {
        let repo = MemorySocketRepository::new();
        repo.register("s1", "alice").await.unwrap();
        assert_eq!(repo.socket_for_uid("alice").await.unwrap().as_deref(), Some("s1"));
        assert_eq!(repo.uid_for_socket("s1").await.unwrap().as_deref(), Some("alice"));
        assert_eq!(repo.online_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_newer_registration_supersedes_older() {
        let repo = MemorySocketRepository::new();
        repo.register("s1", "alice").await.unwrap();
        repo.register("s2", "alice").await.unwrap();
        assert_eq!(repo.socket_for_uid("alice").await.unwrap().as_deref(), Some("s2"));
    }

    #[tokio::test]
    async fn test_old_socket_unregister_keeps_newer_binding() {
        let repo = MemorySocketRepository::new();
        repo.register("s1", "alice").await.unwrap();
        repo.register("s2", "alice").await.unwrap();
        repo.unregister("s1").await.unwrap();
        assert_eq!(repo.socket_for_uid("alice").await.unwrap().as_deref(), Some("s2"));
        assert_eq!(repo.uid_for_socket("s1").await.unwrap(), None);
        assert_eq!(repo.online_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_current_socket_unregister_drops_both_directions() {
        let repo = MemorySocketRepository::new();
        repo.register("s1", "alice").await.unwrap();
        repo.unregister("s1").await.unwrap();
        assert_eq!(repo.socket_for_uid("alice").await.unwrap(), None);
        assert_eq!(repo.uid_for_socket("s1").await.unwrap(), None);
        assert_eq!(repo.online_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_guests_and_bots_stay_out_of_online_set() {
        let repo = MemorySocketRepository::new();
        repo.register("s1", "guest_visitor").await.unwrap();
        repo.register("s2", "bot_warmup").await.unwrap();
        assert_eq!(repo.online_count().await.unwrap(), 0);
        assert_eq!(
            repo.socket_for_uid("guest_visitor").await.unwrap().as_deref(),
            Some("s1")
        );
    }
}
