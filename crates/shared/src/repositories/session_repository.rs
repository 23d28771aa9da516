use std::collections::HashMap;

use async_trait::async_trait;
use redis::{aio::MultiplexedConnection, AsyncCommands};
use tokio::sync::RwLock;
use tracing::warn;

use crate::keys;
use crate::models::session::{PendingRoom, SessionEntry};

#[derive(Debug)]
pub enum SessionRepositoryError {
    Redis(String),
    Serialization(String),
}

impl std::fmt::Display for SessionRepositoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionRepositoryError::Redis(msg) => write!(f, "Redis error: {}", msg),
            SessionRepositoryError::Serialization(msg) => {
                write!(f, "Serialization error: {}", msg)
            }
        }
    }
}

impl std::error::Error for SessionRepositoryError {}

/// Pending rooms (handshakes in flight) and active sessions (established
/// pairings). Rooms are keyed by room id, sessions by uid; entries reference
/// each other by id only.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn put_room(&self, room: &PendingRoom) -> Result<(), SessionRepositoryError>;

    async fn get_room(&self, room_id: &str) -> Result<Option<PendingRoom>, SessionRepositoryError>;

    async fn delete_room(&self, room_id: &str) -> Result<(), SessionRepositoryError>;

    /// Every live pending room; used by the reaper and the reconnect scan.
    async fn list_rooms(&self) -> Result<Vec<PendingRoom>, SessionRepositoryError>;

    async fn put_session(
        &self,
        uid: &str,
        entry: &SessionEntry,
    ) -> Result<(), SessionRepositoryError>;

    async fn get_session(&self, uid: &str)
        -> Result<Option<SessionEntry>, SessionRepositoryError>;

    async fn delete_session(&self, uid: &str) -> Result<(), SessionRepositoryError>;
}

pub struct RedisSessionRepository {
    connection: MultiplexedConnection,
}

impl RedisSessionRepository {
    pub fn new(connection: MultiplexedConnection) -> Self {
        Self { connection }
    }
}

#[async_trait]
impl SessionRepository for RedisSessionRepository {
    async fn put_room(&self, room: &PendingRoom) -> Result<(), SessionRepositoryError> {
        let payload = serde_json::to_string(room)
            .map_err(|e| SessionRepositoryError::Serialization(e.to_string()))?;
        let mut conn = self.connection.clone();
        // Store TTL is crash insurance only; the reaper acts at 30 s.
        let _: () = conn
            .set_ex(keys::room_key(&room.room_id), payload, keys::ROOM_TTL_SECS)
            .await
            .map_err(|e| SessionRepositoryError::Redis(e.to_string()))?;
        Ok(())
    }

    async fn get_room(
        &self,
        room_id: &str,
    ) -> Result<Option<PendingRoom>, SessionRepositoryError> {
        let mut conn = self.connection.clone();
        let payload: Option<String> = conn
            .get(keys::room_key(room_id))
            .await
            .map_err(|e| SessionRepositoryError::Redis(e.to_string()))?;
        match payload {
            Some(json) => match serde_json::from_str(&json) {
                Ok(room) => Ok(Some(room)),
                Err(e) => {
                    warn!("Malformed room payload for {}: {}", room_id, e);
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    async fn delete_room(&self, room_id: &str) -> Result<(), SessionRepositoryError> {
        let mut conn = self.connection.clone();
        let _: () = conn
            .del(keys::room_key(room_id))
            .await
            .map_err(|e| SessionRepositoryError::Redis(e.to_string()))?;
        Ok(())
    }

    async fn list_rooms(&self) -> Result<Vec<PendingRoom>, SessionRepositoryError> {
        let mut conn = self.connection.clone();
        let mut room_keys: Vec<String> = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(keys::ROOM_KEY_PATTERN)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await
                .map_err(|e| SessionRepositoryError::Redis(e.to_string()))?;
            room_keys.extend(batch);
            cursor = next;
            if cursor == 0 {
                break;
            }
        }

        let mut rooms = Vec::with_capacity(room_keys.len());
        for key in room_keys {
            let payload: Option<String> = conn
                .get(&key)
                .await
                .map_err(|e| SessionRepositoryError::Redis(e.to_string()))?;
            if let Some(json) = payload {
                match serde_json::from_str(&json) {
                    Ok(room) => rooms.push(room),
                    Err(e) => warn!("Malformed room payload at {}: {}", key, e),
                }
            }
        }
        Ok(rooms)
    }

    async fn put_session(
        &self,
        uid: &str,
        entry: &SessionEntry,
    ) -> Result<(), SessionRepositoryError> {
        let payload = serde_json::to_string(entry)
            .map_err(|e| SessionRepositoryError::Serialization(e.to_string()))?;
        let mut conn = self.connection.clone();
        let _: () = conn
            .set(keys::session_key(uid), payload)
            .await
            .map_err(|e| SessionRepositoryError::Redis(e.to_string()))?;
        Ok(())
    }

    async fn get_session(
        &self,
        uid: &str,
    ) -> Result<Option<SessionEntry>, SessionRepositoryError> {
        let mut conn = self.connection.clone();
        let payload: Option<String> = conn
            .get(keys::session_key(uid))
            .await
            .map_err(|e| SessionRepositoryError::Redis(e.to_string()))?;
        match payload {
            Some(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|e| SessionRepositoryError::Serialization(e.to_string())),
            None => Ok(None),
        }
    }

    async fn delete_session(&self, uid: &str) -> Result<(), SessionRepositoryError> {
        let mut conn = self.connection.clone();
        let _: () = conn
            .del(keys::session_key(uid))
            .await
            .map_err(|e| SessionRepositoryError::Redis(e.to_string()))?;
        Ok(())
    }
}

/// Single-node fallback used when no Redis URL is configured.
#[derive(Default)]
pub struct MemorySessionRepository {
    rooms: RwLock<HashMap<String, PendingRoom>>,
    sessions: RwLock<HashMap<String, SessionEntry>>,
}

impl MemorySessionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionRepository for MemorySessionRepository {
    async fn put_room(&self, room: &PendingRoom) -> Result<(), SessionRepositoryError> {
        self.rooms
            .write()
            .await
            .insert(room.room_id.clone(), room.clone());
        Ok(())
    }

    async fn get_room(
        &self,
        room_id: &str,
    ) -> Result<Option<PendingRoom>, SessionRepositoryError> {
        Ok(self.rooms.read().await.get(room_id).cloned())
    }

    async fn delete_room(&self, room_id: &str) -> Result<(), SessionRepositoryError> {
        self.rooms.write().await.remove(room_id);
        Ok(())
    }

    async fn list_rooms(&self) -> Result<Vec<PendingRoom>, SessionRepositoryError> {
        Ok(self.rooms.read().await.values().cloned().collect())
    }

    async fn put_session(
        &self,
        uid: &str,
        entry: &SessionEntry,
    ) -> Result<(), SessionRepositoryError> {
        self.sessions
            .write()
            .await
            .insert(uid.to_string(), entry.clone());
        Ok(())
    }

    async fn get_session(
        &self,
        uid: &str,
    ) -> Result<Option<SessionEntry>, SessionRepositoryError> {
        Ok(self.sessions.read().await.get(uid).cloned())
    }

    async fn delete_session(&self, uid: &str) -> Result<(), SessionRepositoryError> {
        self.sessions.write().await.remove(uid);
        Ok(())
    }
}
