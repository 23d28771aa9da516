//! The broker's complete keyspace in the shared store. Every cross-replica
//! table is addressed through these accessors; no component builds keys of
//! its own.

use crate::models::queue::Gender;

/// TTL on both directions of a socket binding.
pub const SOCKET_BINDING_TTL_SECS: u64 = 86_400;
/// Crash-safety TTL on persisted pending rooms (the reaper acts much sooner).
pub const ROOM_TTL_SECS: u64 = 300;
/// TTL on the matchmaking lease.
pub const LOCK_TTL_MS: u64 = 3_000;

/// Ordered queue partition, scored by joined-at milliseconds.
pub fn queue_key(gender: Gender) -> String {
    format!("queue:{}", gender.as_str())
}

/// JSON payload of a waiting user.
pub fn queue_user_key(uid: &str) -> String {
    format!("queue:user:{}", uid)
}

/// Side index from the socket that enqueued a user back to the uid, so a
/// disconnect can dequeue without scanning the partitions.
pub fn queue_socket_key(socket_id: &str) -> String {
    format!("queue:socket:{}", socket_id)
}

pub fn room_key(room_id: &str) -> String {
    format!("room:{}", room_id)
}

pub const ROOM_KEY_PATTERN: &str = "room:*";

pub fn session_key(uid: &str) -> String {
    format!("session:{}", uid)
}

/// Forward socket binding (socket id to uid).
pub fn socket_uid_key(socket_id: &str) -> String {
    format!("socket:uid:{}", socket_id)
}

/// Reverse socket binding (uid to its one active socket id).
pub fn uid_socket_key(uid: &str) -> String {
    format!("user:socket:{}", uid)
}

pub const ONLINE_USERS_KEY: &str = "users:online";

pub fn ban_key(uid: &str) -> String {
    format!("ban:{}", uid)
}

pub const MATCHMAKING_LOCK_KEY: &str = "lock:matchmaking";

/// Pub/sub channel for cross-replica socket emits.
pub const EMIT_CHANNEL: &str = "emit:socket";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_keys() {
        assert_eq!(queue_key(Gender::Male), "queue:male");
        assert_eq!(queue_key(Gender::Female), "queue:female");
    }

    #[test]
    fn test_entity_keys() {
        assert_eq!(queue_user_key("u1"), "queue:user:u1");
        assert_eq!(queue_socket_key("s1"), "queue:socket:s1");
        assert_eq!(room_key("room_1_ab"), "room:room_1_ab");
        assert_eq!(session_key("u1"), "session:u1");
        assert_eq!(socket_uid_key("s1"), "socket:uid:s1");
        assert_eq!(uid_socket_key("u1"), "user:socket:u1");
        assert_eq!(ban_key("u1"), "ban:u1");
    }
}
