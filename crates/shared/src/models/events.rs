use serde::{Deserialize, Serialize};

use super::ice::IceConfig;
use super::queue::{Gender, MatchMode, Preferences};
use super::session::Role;

/// An opaque SDP/ICE envelope. The broker never looks past the routing
/// fields; everything else rides along untouched in `payload`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default, rename = "targetUid", skip_serializing_if = "Option::is_none")]
    pub target_uid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, rename = "fromUid", skip_serializing_if = "Option::is_none")]
    pub from_uid: Option<String>,
    #[serde(flatten)]
    pub payload: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JoinQueueRequest {
    pub mode: MatchMode,
    #[serde(default)]
    pub preferences: Preferences,
    /// Guest-profile fallback: honored only when the profile provider has no
    /// record for the uid.
    #[serde(default)]
    pub gender: Option<Gender>,
    #[serde(default)]
    pub location: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionStableRequest {
    #[serde(rename = "roomId")]
    pub room_id: String,
    pub service: super::session::Service,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SendInviteRequest {
    #[serde(rename = "targetUid")]
    pub target_uid: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InviteReplyRequest {
    #[serde(rename = "inviterUid")]
    pub inviter_uid: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdminUserRequest {
    pub uid: String,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdminBanRequest {
    pub uid: String,
    pub reason: String,
    #[serde(rename = "durationMinutes")]
    pub duration_minutes: i64,
}

/// Everything a client can send. The surface is closed; unknown event names
/// fail to parse and are answered with an error event.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    #[serde(rename = "join_queue")]
    JoinQueue(JoinQueueRequest),
    #[serde(rename = "leave_queue")]
    LeaveQueue,
    #[serde(rename = "skip_match")]
    SkipMatch,
    #[serde(rename = "connection_stable")]
    ConnectionStable(ConnectionStableRequest),
    #[serde(rename = "reconnect")]
    Reconnect,
    #[serde(rename = "get_ice_servers")]
    GetIceServers,
    #[serde(rename = "offer")]
    Offer(SignalFrame),
    #[serde(rename = "answer")]
    Answer(SignalFrame),
    #[serde(rename = "ice-candidate")]
    IceCandidate(SignalFrame),
    #[serde(rename = "video-offer")]
    VideoOffer(SignalFrame),
    #[serde(rename = "video-answer")]
    VideoAnswer(SignalFrame),
    #[serde(rename = "video-ice-candidate")]
    VideoIceCandidate(SignalFrame),
    #[serde(rename = "send_invite")]
    SendInvite(SendInviteRequest),
    #[serde(rename = "accept_invite")]
    AcceptInvite(InviteReplyRequest),
    #[serde(rename = "reject_invite")]
    RejectInvite(InviteReplyRequest),
    #[serde(rename = "admin_kick_user")]
    AdminKickUser(AdminUserRequest),
    #[serde(rename = "admin_ban_user")]
    AdminBanUser(AdminBanRequest),
    #[serde(rename = "admin_unban_user")]
    AdminUnbanUser(AdminUserRequest),
    #[serde(rename = "admin_force_disconnect")]
    AdminForceDisconnect(AdminUserRequest),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchFoundPayload {
    #[serde(rename = "roomId")]
    pub room_id: String,
    pub role: Role,
    /// The peer's current socket id.
    #[serde(rename = "opponentId")]
    pub opponent_id: String,
    #[serde(rename = "opponentUid")]
    pub opponent_uid: String,
    #[serde(rename = "isInitiator")]
    pub is_initiator: bool,
    #[serde(rename = "iceServers")]
    pub ice_servers: IceConfig,
    #[serde(
        rename = "isReconnection",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub is_reconnection: Option<bool>,
}

/// Everything the server can emit, relayed signaling frames included (those
/// reuse the inbound event names).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "match_found")]
    MatchFound(MatchFoundPayload),
    #[serde(rename = "session_established")]
    SessionEstablished {
        #[serde(rename = "roomId")]
        room_id: String,
    },
    #[serde(rename = "match_skipped")]
    MatchSkipped,
    #[serde(rename = "match_error")]
    MatchError { message: String },
    #[serde(rename = "opponent_reconnected")]
    OpponentReconnected {
        #[serde(rename = "opponentSocketId")]
        opponent_socket_id: String,
    },
    #[serde(rename = "start_bot_mode")]
    StartBotMode { reason: String },
    #[serde(rename = "no_match_found")]
    NoMatchFound {
        reason: String,
        #[serde(rename = "waitedMs")]
        waited_ms: i64,
    },
    #[serde(rename = "banned")]
    Banned {
        reason: String,
        #[serde(rename = "remainingMinutes")]
        remaining_minutes: i64,
        message: String,
    },
    #[serde(rename = "kicked")]
    Kicked { reason: String },
    #[serde(rename = "ice_servers_config")]
    IceServersConfig {
        #[serde(rename = "iceServers")]
        ice_servers: IceConfig,
    },
    #[serde(rename = "receive_invite")]
    ReceiveInvite {
        #[serde(rename = "inviterUid")]
        inviter_uid: String,
        #[serde(rename = "inviterSocketId")]
        inviter_socket_id: String,
        mode: MatchMode,
    },
    #[serde(rename = "invite_rejected")]
    InviteRejected {
        #[serde(rename = "targetUid")]
        target_uid: String,
    },
    #[serde(rename = "invite_error")]
    InviteError { message: String },
    #[serde(rename = "error")]
    Error { message: String },
    #[serde(rename = "offer")]
    Offer(SignalFrame),
    #[serde(rename = "answer")]
    Answer(SignalFrame),
    #[serde(rename = "ice-candidate")]
    IceCandidate(SignalFrame),
    #[serde(rename = "video-offer")]
    VideoOffer(SignalFrame),
    #[serde(rename = "video-answer")]
    VideoAnswer(SignalFrame),
    #[serde(rename = "video-ice-candidate")]
    VideoIceCandidate(SignalFrame),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::queue::Tier;

    #[test]
    fn test_join_queue_parses_with_preferences() {
        let raw = r#"{
            "event": "join_queue",
            "data": {
                "mode": "video",
                "preferences": {"gender": "male", "location": "IN"}
            }
        }"#;
        let event: ClientEvent = serde_json::from_str(raw).unwrap();
        match event {
            ClientEvent::JoinQueue(req) => {
                assert_eq!(req.mode, MatchMode::Video);
                assert_eq!(req.preferences.gender, Some(Gender::Male));
                assert_eq!(req.preferences.location, Some("IN".to_string()));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_payloadless_events_parse_without_data() {
        let event: ClientEvent = serde_json::from_str(r#"{"event": "leave_queue"}"#).unwrap();
        assert!(matches!(event, ClientEvent::LeaveQueue));
        let event: ClientEvent = serde_json::from_str(r#"{"event": "reconnect"}"#).unwrap();
        assert!(matches!(event, ClientEvent::Reconnect));
    }

    #[test]
    fn test_unknown_event_is_rejected() {
        assert!(serde_json::from_str::<ClientEvent>(r#"{"event": "shutdown"}"#).is_err());
    }

    #[test]
    fn test_signal_frame_preserves_payload() {
        let raw = r#"{
            "event": "video-offer",
            "data": {"to": "socket-9", "sdp": {"type": "offer", "description": "v=0"}}
        }"#;
        let event: ClientEvent = serde_json::from_str(raw).unwrap();
        let ClientEvent::VideoOffer(frame) = event else {
            panic!("expected video-offer");
        };
        assert_eq!(frame.to.as_deref(), Some("socket-9"));
        assert_eq!(frame.target_uid, None);
        assert_eq!(
            frame.payload.get("sdp").and_then(|v| v.get("type")),
            Some(&serde_json::json!("offer"))
        );
    }

    #[test]
    fn test_relayed_frame_serializes_with_from_fields() {
        let mut frame = SignalFrame::default();
        frame.from = Some("socket-1".to_string());
        frame.from_uid = Some("alice".to_string());
        frame
            .payload
            .insert("candidate".to_string(), serde_json::json!("cand:1"));
        let value = serde_json::to_value(ServerEvent::IceCandidate(frame)).unwrap();
        assert_eq!(value["event"], "ice-candidate");
        assert_eq!(value["data"]["from"], "socket-1");
        assert_eq!(value["data"]["fromUid"], "alice");
        assert_eq!(value["data"]["candidate"], "cand:1");
        assert!(value["data"].get("to").is_none());
    }

    #[test]
    fn test_match_found_wire_shape() {
        let payload = MatchFoundPayload {
            room_id: "room_1_ab".to_string(),
            role: Role::A,
            opponent_id: "socket-2".to_string(),
            opponent_uid: "bob".to_string(),
            is_initiator: true,
            ice_servers: IceConfig {
                game: vec![],
                video: vec![],
            },
            is_reconnection: None,
        };
        let value = serde_json::to_value(ServerEvent::MatchFound(payload)).unwrap();
        assert_eq!(value["event"], "match_found");
        assert_eq!(value["data"]["roomId"], "room_1_ab");
        assert_eq!(value["data"]["role"], "A");
        assert_eq!(value["data"]["isInitiator"], true);
        assert!(value["data"].get("isReconnection").is_none());
    }

    #[test]
    fn test_tier_wire_names() {
        assert_eq!(serde_json::to_value(Tier::Diamond).unwrap(), "DIAMOND");
        assert_eq!(
            serde_json::from_value::<Tier>(serde_json::json!("FREE")).unwrap(),
            Tier::Free
        );
    }
}
