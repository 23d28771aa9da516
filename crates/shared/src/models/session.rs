use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::queue::MatchMode;

/// A pending room that has not finished its handshake after this long is
/// reaped and both sides get a match error.
pub const HANDSHAKE_TIMEOUT_MS: i64 = 30_000;

/// Peer-to-peer channels a room waits on before it counts as established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Service {
    Game,
    Video,
}

impl Service {
    pub fn as_str(&self) -> &'static str {
        match self {
            Service::Game => "game",
            Service::Video => "video",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    A,
    B,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomPeer {
    pub uid: String,
    pub socket_id: String,
}

/// Handshake coordinator for a freshly matched pair. Lives until every
/// expected service reports ready, the handshake times out, or a party
/// skips/disconnects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingRoom {
    pub room_id: String,
    pub player_a: RoomPeer,
    pub player_b: RoomPeer,
    pub mode: MatchMode,
    pub expected_services: Vec<Service>,
    #[serde(default)]
    pub game_ready: bool,
    #[serde(default)]
    pub video_ready: bool,
    pub created_at: i64,
}

impl PendingRoom {
    pub fn new(player_a: RoomPeer, player_b: RoomPeer, mode: MatchMode) -> Self {
        let mut tail = Uuid::new_v4().simple().to_string();
        tail.truncate(8);
        PendingRoom {
            room_id: format!("room_{}_{}", Utc::now().timestamp_millis(), tail),
            player_a,
            player_b,
            mode,
            expected_services: Self::expected_services_for(mode),
            game_ready: false,
            video_ready: false,
            created_at: Utc::now().timestamp_millis(),
        }
    }

    /// One signaling channel per mode. Game chat handshakes on the game data
    /// channel, video chat on the video channel; waiting on both would leave
    /// video rooms stuck until the handshake timeout.
    pub fn expected_services_for(mode: MatchMode) -> Vec<Service> {
        match mode {
            MatchMode::Random => vec![Service::Game],
            MatchMode::Video => vec![Service::Video],
        }
    }

    pub fn contains(&self, uid: &str) -> bool {
        self.player_a.uid == uid || self.player_b.uid == uid
    }

    pub fn role_of(&self, uid: &str) -> Option<Role> {
        if self.player_a.uid == uid {
            Some(Role::A)
        } else if self.player_b.uid == uid {
            Some(Role::B)
        } else {
            None
        }
    }

    /// The other party's peer record.
    pub fn peer_of(&self, uid: &str) -> Option<&RoomPeer> {
        if self.player_a.uid == uid {
            Some(&self.player_b)
        } else if self.player_b.uid == uid {
            Some(&self.player_a)
        } else {
            None
        }
    }

    pub fn peer_mut(&mut self, uid: &str) -> Option<&mut RoomPeer> {
        if self.player_a.uid == uid {
            Some(&mut self.player_a)
        } else if self.player_b.uid == uid {
            Some(&mut self.player_b)
        } else {
            None
        }
    }

    pub fn mark_ready(&mut self, service: Service) {
        match service {
            Service::Game => self.game_ready = true,
            Service::Video => self.video_ready = true,
        }
    }

    pub fn all_ready(&self) -> bool {
        self.expected_services.iter().all(|service| match service {
            Service::Game => self.game_ready,
            Service::Video => self.video_ready,
        })
    }

    pub fn is_expired(&self, now_ms: i64) -> bool {
        now_ms - self.created_at > HANDSHAKE_TIMEOUT_MS
    }
}

/// One half of an established pairing; the opponent holds the mirror entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEntry {
    pub room_id: String,
    pub opponent_uid: String,
    pub role: Role,
    pub start_time: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(uid: &str, socket_id: &str) -> RoomPeer {
        RoomPeer {
            uid: uid.to_string(),
            socket_id: socket_id.to_string(),
        }
    }

    #[test]
    fn test_expected_services_follow_mode() {
        assert_eq!(
            PendingRoom::expected_services_for(MatchMode::Random),
            vec![Service::Game]
        );
        assert_eq!(
            PendingRoom::expected_services_for(MatchMode::Video),
            vec![Service::Video]
        );
    }

    #[test]
    fn test_room_ids_are_unique() {
        let a = PendingRoom::new(peer("a", "s1"), peer("b", "s2"), MatchMode::Random);
        let b = PendingRoom::new(peer("a", "s1"), peer("b", "s2"), MatchMode::Random);
        assert_ne!(a.room_id, b.room_id);
        assert!(a.room_id.starts_with("room_"));
    }

    #[test]
    fn test_video_room_ready_after_video_only() {
        let mut room = PendingRoom::new(peer("hank", "s1"), peer("ivy", "s2"), MatchMode::Video);
        assert!(!room.all_ready());
        room.mark_ready(Service::Video);
        assert!(room.all_ready());
    }

    #[test]
    fn test_game_room_ignores_video_readiness() {
        let mut room = PendingRoom::new(peer("a", "s1"), peer("b", "s2"), MatchMode::Random);
        room.mark_ready(Service::Video);
        assert!(!room.all_ready());
        room.mark_ready(Service::Game);
        assert!(room.all_ready());
    }

    #[test]
    fn test_roles_and_peers() {
        let room = PendingRoom::new(peer("a", "s1"), peer("b", "s2"), MatchMode::Random);
        assert_eq!(room.role_of("a"), Some(Role::A));
        assert_eq!(room.role_of("b"), Some(Role::B));
        assert_eq!(room.role_of("c"), None);
        assert_eq!(room.peer_of("a").unwrap().uid, "b");
        assert_eq!(room.peer_of("b").unwrap().socket_id, "s1");
        assert!(room.contains("a") && !room.contains("c"));
    }

    #[test]
    fn test_expiry_boundary() {
        let room = PendingRoom::new(peer("a", "s1"), peer("b", "s2"), MatchMode::Random);
        assert!(!room.is_expired(room.created_at + HANDSHAKE_TIMEOUT_MS));
        assert!(room.is_expired(room.created_at + HANDSHAKE_TIMEOUT_MS + 1));
    }
}
