use async_trait::async_trait;
use chrono::Utc;
use redis::aio::MultiplexedConnection;
use tokio::sync::Mutex;

use crate::keys;

#[derive(Debug)]
pub enum LeaseRepositoryError {
    Redis(String),
}

impl std::fmt::Display for LeaseRepositoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LeaseRepositoryError::Redis(msg) => write!(f, "Redis error: {}", msg),
        }
    }
}

impl std::error::Error for LeaseRepositoryError {}

/// The short-TTL lease that serializes matching cycles across replicas.
/// Acquire is set-if-absent; release only deletes when the stored token still
/// matches, so a stalled holder cannot free a successor's lease.
#[async_trait]
pub trait LeaseRepository: Send + Sync {
    async fn try_acquire(&self, token: &str) -> Result<bool, LeaseRepositoryError>;

    async fn release(&self, token: &str) -> Result<(), LeaseRepositoryError>;
}

pub struct RedisLeaseRepository {
    connection: MultiplexedConnection,
    release_script: redis::Script,
}

impl RedisLeaseRepository {
    pub fn new(connection: MultiplexedConnection) -> Self {
        let release_script = redis::Script::new(
            r#"
            if redis.call('get', KEYS[1]) == ARGV[1] then
                return redis.call('del', KEYS[1])
            else
                return 0
            end
            "#,
        );
        Self {
            connection,
            release_script,
        }
    }
}

#[async_trait]
impl LeaseRepository for RedisLeaseRepository {
    async fn try_acquire(&self, token: &str) -> Result<bool, LeaseRepositoryError> {
        let mut conn = self.connection.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(keys::MATCHMAKING_LOCK_KEY)
            .arg(token)
            .arg("NX")
            .arg("PX")
            .arg(keys::LOCK_TTL_MS)
            .query_async(&mut conn)
            .await
            .map_err(|e| LeaseRepositoryError::Redis(e.to_string()))?;
        Ok(reply.is_some())
    }

    async fn release(&self, token: &str) -> Result<(), LeaseRepositoryError> {
        let mut conn = self.connection.clone();
        let _: i64 = self
            .release_script
            .key(keys::MATCHMAKING_LOCK_KEY)
            .arg(token)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| LeaseRepositoryError::Redis(e.to_string()))?;
        Ok(())
    }
}

/// Single-node lease: same contract, one process. Still guards against an
/// overrunning cycle overlapping the next tick.
#[derive(Default)]
pub struct MemoryLeaseRepository {
    holder: Mutex<Option<(String, i64)>>,
}

impl MemoryLeaseRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LeaseRepository for MemoryLeaseRepository {
    async fn try_acquire(&self, token: &str) -> Result<bool, LeaseRepositoryError> {
        let now = Utc::now().timestamp_millis();
        let mut holder = self.holder.lock().await;
        match holder.as_ref() {
            Some((_, expires_at)) if *expires_at > now => Ok(false),
            _ => {
                *holder = Some((token.to_string(), now + keys::LOCK_TTL_MS as i64));
                Ok(true)
            }
        }
    }

    async fn release(&self, token: &str) -> Result<(), LeaseRepositoryError> {
        let mut holder = self.holder.lock().await;
        if holder.as_ref().map(|(t, _)| t.as_str()) == Some(token) {
            *holder = None;
        }
        Ok(())
    }
}
