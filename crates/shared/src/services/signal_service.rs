use std::sync::Arc;

use tracing::warn;

use crate::models::events::SignalFrame;
use crate::repositories::session_repository::SessionRepository;
use crate::repositories::socket_repository::SocketRepository;
use crate::services::errors::signal_service_errors::SignalServiceError;

/// Routes SDP/ICE envelopes to the peer's live socket. Pure decision over
/// the registry and session tables; the transport emit happens at the caller.
/// Best-effort and at-most-once: an unresolvable target drops the frame.
#[derive(Clone)]
pub struct SignalService {
    socket_repository: Arc<dyn SocketRepository>,
    session_repository: Arc<dyn SessionRepository>,
}

impl SignalService {
    pub fn new(
        socket_repository: Arc<dyn SocketRepository>,
        session_repository: Arc<dyn SessionRepository>,
    ) -> Self {
        Self {
            socket_repository,
            session_repository,
        }
    }

    /// Resolves the target socket for a frame and stamps the sender fields.
    /// Precedence: explicit socket id, explicit uid, then the sender's
    /// session opponent. `None` means the frame is dropped.
    pub async fn route(
        &self,
        sender_socket_id: &str,
        frame: &SignalFrame,
        is_offer: bool,
    ) -> Result<Option<(String, SignalFrame)>, SignalServiceError> {
        let sender_uid = self
            .socket_repository
            .uid_for_socket(sender_socket_id)
            .await
            .map_err(|e| SignalServiceError::RepositoryError(e.to_string()))?;

        let target = if let Some(to) = &frame.to {
            if to == sender_socket_id {
                None
            } else {
                Some(to.clone())
            }
        } else if let Some(target_uid) = &frame.target_uid {
            if sender_uid.as_deref() == Some(target_uid.as_str()) {
                // Loopback protection.
                None
            } else {
                self.socket_repository
                    .socket_for_uid(target_uid)
                    .await
                    .map_err(|e| SignalServiceError::RepositoryError(e.to_string()))?
            }
        } else if let Some(uid) = &sender_uid {
            match self
                .session_repository
                .get_session(uid)
                .await
                .map_err(|e| SignalServiceError::RepositoryError(e.to_string()))?
            {
                Some(entry) => self
                    .socket_repository
                    .socket_for_uid(&entry.opponent_uid)
                    .await
                    .map_err(|e| SignalServiceError::RepositoryError(e.to_string()))?,
                None => None,
            }
        } else {
            None
        };

        let Some(target) = target else {
            warn!(
                "Dropping signaling frame from socket {}: no reachable target",
                sender_socket_id
            );
            return Ok(None);
        };

        let mut forwarded = frame.clone();
        forwarded.from = Some(sender_socket_id.to_string());
        if is_offer {
            forwarded.from_uid = sender_uid;
        }
        Ok(Some((target, forwarded)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::session::{Role, SessionEntry};
    use crate::repositories::session_repository::MemorySessionRepository;
    use crate::repositories::socket_repository::MemorySocketRepository;

    async fn fixture() -> (SignalService, Arc<MemorySocketRepository>, Arc<MemorySessionRepository>) {
        let sockets = Arc::new(MemorySocketRepository::new());
        let sessions = Arc::new(MemorySessionRepository::new());
        (
            SignalService::new(sockets.clone(), sessions.clone()),
            sockets,
            sessions,
        )
    }

    fn frame_to(to: Option<&str>, target_uid: Option<&str>) -> SignalFrame {
        let mut frame = SignalFrame::default();
        frame.to = to.map(str::to_string);
        frame.target_uid = target_uid.map(str::to_string);
        frame
            .payload
            .insert("sdp".to_string(), serde_json::json!("v=0"));
        frame
    }

    #[tokio::test]
    async fn test_explicit_socket_takes_precedence() {
        let (service, sockets, _) = fixture().await;
        sockets.register("s1", "alice").await.unwrap();
        sockets.register("s2", "bob").await.unwrap();

        let routed = service
            .route("s1", &frame_to(Some("s2"), Some("ignored")), true)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(routed.0, "s2");
        assert_eq!(routed.1.from.as_deref(), Some("s1"));
        assert_eq!(routed.1.from_uid.as_deref(), Some("alice"));
        assert_eq!(routed.1.payload.get("sdp"), Some(&serde_json::json!("v=0")));
    }

    #[tokio::test]
    async fn test_target_uid_resolves_current_socket() {
        let (service, sockets, _) = fixture().await;
        sockets.register("s1", "alice").await.unwrap();
        sockets.register("s2", "bob").await.unwrap();
        sockets.register("s3", "bob").await.unwrap(); // newer tab wins

        let routed = service
            .route("s1", &frame_to(None, Some("bob")), false)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(routed.0, "s3");
        // Non-offers carry only the socket-level sender stamp.
        assert_eq!(routed.1.from_uid, None);
    }

    #[tokio::test]
    async fn test_falls_back_to_session_opponent() {
        let (service, sockets, sessions) = fixture().await;
        sockets.register("s1", "alice").await.unwrap();
        sockets.register("s2", "bob").await.unwrap();
        sessions
            .put_session(
                "alice",
                &SessionEntry {
                    room_id: "room_1_ab".to_string(),
                    opponent_uid: "bob".to_string(),
                    role: Role::A,
                    start_time: 0,
                },
            )
            .await
            .unwrap();

        let routed = service
            .route("s1", &frame_to(None, None), false)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(routed.0, "s2");
    }

    #[tokio::test]
    async fn test_loopback_frames_are_dropped() {
        let (service, sockets, _) = fixture().await;
        sockets.register("s1", "alice").await.unwrap();
        let routed = service
            .route("s1", &frame_to(None, Some("alice")), false)
            .await
            .unwrap();
        assert!(routed.is_none());
    }

    #[tokio::test]
    async fn test_offline_target_drops_frame() {
        let (service, sockets, _) = fixture().await;
        sockets.register("s1", "alice").await.unwrap();
        let routed = service
            .route("s1", &frame_to(None, Some("bob")), false)
            .await
            .unwrap();
        assert!(routed.is_none());
    }
}
