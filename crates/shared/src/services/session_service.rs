use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};

use crate::models::events::{MatchFoundPayload, ServerEvent};
use crate::models::queue::{MatchMode, QueueUser};
use crate::models::session::{PendingRoom, Role, RoomPeer, Service, SessionEntry};
use crate::repositories::queue_repository::QueueRepository;
use crate::repositories::session_repository::SessionRepository;
use crate::repositories::socket_repository::SocketRepository;
use crate::services::analytics::{AnalyticsSink, MatchEndReason};
use crate::services::emitter::Emitter;
use crate::services::errors::session_service_errors::SessionServiceError;
use crate::services::ice_service::IceService;
use crate::services::profile::ProfileProvider;

/// The session registry: pending-room handshakes, established sessions, and
/// every teardown path. Everything is keyed by uid or room id; sockets are
/// always re-resolved from the registry at the moment they are needed.
pub struct SessionService {
    session_repository: Arc<dyn SessionRepository>,
    socket_repository: Arc<dyn SocketRepository>,
    queue_repository: Arc<dyn QueueRepository>,
    ice_service: Arc<IceService>,
    profile_provider: Arc<dyn ProfileProvider>,
    analytics: Arc<dyn AnalyticsSink>,
    emitter: Arc<dyn Emitter>,
}

impl SessionService {
    pub fn new(
        session_repository: Arc<dyn SessionRepository>,
        socket_repository: Arc<dyn SocketRepository>,
        queue_repository: Arc<dyn QueueRepository>,
        ice_service: Arc<IceService>,
        profile_provider: Arc<dyn ProfileProvider>,
        analytics: Arc<dyn AnalyticsSink>,
        emitter: Arc<dyn Emitter>,
    ) -> Self {
        Self {
            session_repository,
            socket_repository,
            queue_repository,
            ice_service,
            profile_provider,
            analytics,
            emitter,
        }
    }

    /// Turns a pair picked by the match engine into a pending room. The
    /// engine has already dequeued both sides; if one of them lost its socket
    /// in the meantime, the survivor is re-enqueued with its original
    /// joined-at and told to keep waiting.
    pub async fn execute_match(
        &self,
        a: &QueueUser,
        b: &QueueUser,
        mode: MatchMode,
    ) -> Result<Option<String>, SessionServiceError> {
        let socket_a = self.resolve_socket(&a.uid).await?;
        let socket_b = self.resolve_socket(&b.uid).await?;
        match (socket_a, socket_b) {
            (Some(socket_a), Some(socket_b)) => {
                let room = self
                    .open_room(&a.uid, &socket_a, &b.uid, &socket_b, mode)
                    .await?;
                Ok(Some(room.room_id))
            }
            (survivor_a, survivor_b) => {
                warn!(
                    "Abandoning match between {} and {}: a socket went away",
                    a.uid, b.uid
                );
                if survivor_a.is_some() {
                    self.requeue_survivor(a).await?;
                } else if survivor_b.is_some() {
                    self.requeue_survivor(b).await?;
                }
                Ok(None)
            }
        }
    }

    /// Pairs two uids outside the queue (the invite path). Returns the room
    /// id, or `None` when either side has no live socket.
    pub async fn create_direct_room(
        &self,
        initiator_uid: &str,
        acceptor_uid: &str,
        mode: MatchMode,
    ) -> Result<Option<String>, SessionServiceError> {
        let socket_a = self.resolve_socket(initiator_uid).await?;
        let socket_b = self.resolve_socket(acceptor_uid).await?;
        let (Some(socket_a), Some(socket_b)) = (socket_a, socket_b) else {
            return Ok(None);
        };
        // Direct pairings must not leave either side waiting in a partition.
        for uid in [initiator_uid, acceptor_uid] {
            self.queue_repository
                .remove_by_uid(uid)
                .await
                .map_err(|e| SessionServiceError::RepositoryError(e.to_string()))?;
        }
        let room = self
            .open_room(initiator_uid, &socket_a, acceptor_uid, &socket_b, mode)
            .await?;
        Ok(Some(room.room_id))
    }

    async fn open_room(
        &self,
        a_uid: &str,
        a_socket: &str,
        b_uid: &str,
        b_socket: &str,
        mode: MatchMode,
    ) -> Result<PendingRoom, SessionServiceError> {
        let room = PendingRoom::new(
            RoomPeer {
                uid: a_uid.to_string(),
                socket_id: a_socket.to_string(),
            },
            RoomPeer {
                uid: b_uid.to_string(),
                socket_id: b_socket.to_string(),
            },
            mode,
        );
        self.session_repository
            .put_room(&room)
            .await
            .map_err(|e| SessionServiceError::RepositoryError(e.to_string()))?;
        self.emit_match_found(&room, Role::A, false).await;
        self.emit_match_found(&room, Role::B, false).await;
        info!(
            "Created room {} for {} and {} (mode: {})",
            room.room_id,
            a_uid,
            b_uid,
            mode.as_str()
        );
        Ok(room)
    }

    async fn emit_match_found(&self, room: &PendingRoom, to: Role, is_reconnection: bool) {
        let (me, opponent) = match to {
            Role::A => (&room.player_a, &room.player_b),
            Role::B => (&room.player_b, &room.player_a),
        };
        let payload = MatchFoundPayload {
            room_id: room.room_id.clone(),
            role: to,
            opponent_id: opponent.socket_id.clone(),
            opponent_uid: opponent.uid.clone(),
            is_initiator: to == Role::A,
            ice_servers: self.ice_service.mint_for_user(&me.uid),
            is_reconnection: is_reconnection.then_some(true),
        };
        self.emitter
            .emit(&me.socket_id, ServerEvent::MatchFound(payload))
            .await;
    }

    async fn requeue_survivor(&self, user: &QueueUser) -> Result<(), SessionServiceError> {
        self.queue_repository
            .join_queue(user)
            .await
            .map_err(|e| SessionServiceError::RepositoryError(e.to_string()))?;
        let waited_ms = Utc::now().timestamp_millis() - user.joined_at;
        self.emitter
            .emit(
                &user.socket_id,
                ServerEvent::NoMatchFound {
                    reason: "opponent_unavailable".to_string(),
                    waited_ms,
                },
            )
            .await;
        info!("Re-enqueued {} after opponent went offline", user.uid);
        Ok(())
    }

    /// Marks one service ready in a pending room; promotes the room to an
    /// active session once every expected service has reported in.
    pub async fn handle_connection_stable(
        &self,
        socket_id: &str,
        room_id: &str,
        service: Service,
    ) -> Result<bool, SessionServiceError> {
        let Some(mut room) = self
            .session_repository
            .get_room(room_id)
            .await
            .map_err(|e| SessionServiceError::RepositoryError(e.to_string()))?
        else {
            warn!(
                "connection_stable for unknown room {} from socket {}",
                room_id, socket_id
            );
            return Ok(false);
        };
        let uid = self.uid_for(socket_id).await?;
        let Some(uid) = uid.filter(|uid| room.contains(uid)) else {
            warn!(
                "connection_stable for room {} from non-member socket {}",
                room_id, socket_id
            );
            return Ok(false);
        };

        room.mark_ready(service);
        info!(
            "Service {} ready in room {} (reported by {})",
            service.as_str(),
            room_id,
            uid
        );
        if !room.all_ready() {
            self.session_repository
                .put_room(&room)
                .await
                .map_err(|e| SessionServiceError::RepositoryError(e.to_string()))?;
            return Ok(false);
        }

        self.finalize_room(&room).await?;
        Ok(true)
    }

    async fn finalize_room(&self, room: &PendingRoom) -> Result<(), SessionServiceError> {
        let start_time = Utc::now().timestamp_millis();
        let entry_a = SessionEntry {
            room_id: room.room_id.clone(),
            opponent_uid: room.player_b.uid.clone(),
            role: Role::A,
            start_time,
        };
        let entry_b = SessionEntry {
            room_id: room.room_id.clone(),
            opponent_uid: room.player_a.uid.clone(),
            role: Role::B,
            start_time,
        };
        self.session_repository
            .put_session(&room.player_a.uid, &entry_a)
            .await
            .map_err(|e| SessionServiceError::RepositoryError(e.to_string()))?;
        self.session_repository
            .put_session(&room.player_b.uid, &entry_b)
            .await
            .map_err(|e| SessionServiceError::RepositoryError(e.to_string()))?;

        for peer in [&room.player_a, &room.player_b] {
            self.emitter
                .emit(
                    &peer.socket_id,
                    ServerEvent::SessionEstablished {
                        room_id: room.room_id.clone(),
                    },
                )
                .await;
            if !crate::models::is_guest(&peer.uid) {
                self.profile_provider.increment_matches(&peer.uid).await;
            }
        }

        self.session_repository
            .delete_room(&room.room_id)
            .await
            .map_err(|e| SessionServiceError::RepositoryError(e.to_string()))?;
        self.analytics.match_started(
            &room.room_id,
            &room.player_a.uid,
            &room.player_b.uid,
            room.mode,
        );
        info!("Room {} established", room.room_id);
        Ok(())
    }

    /// A returning tab announces itself. With an active session the rejoiner
    /// gets a reconnection-flavored match_found (opponent socket resolved
    /// live) and the opponent learns the new socket id; with only a pending
    /// room the stored socket is refreshed and match_found re-emitted.
    pub async fn handle_reconnection(
        &self,
        socket_id: &str,
        uid: &str,
    ) -> Result<(), SessionServiceError> {
        if let Some(entry) = self
            .session_repository
            .get_session(uid)
            .await
            .map_err(|e| SessionServiceError::RepositoryError(e.to_string()))?
        {
            let opponent_socket = self.resolve_socket(&entry.opponent_uid).await?;
            let payload = MatchFoundPayload {
                room_id: entry.room_id.clone(),
                role: entry.role,
                opponent_id: opponent_socket.clone().unwrap_or_default(),
                opponent_uid: entry.opponent_uid.clone(),
                is_initiator: entry.role == Role::A,
                ice_servers: self.ice_service.mint_for_user(uid),
                is_reconnection: Some(true),
            };
            self.emitter
                .emit(socket_id, ServerEvent::MatchFound(payload))
                .await;
            if let Some(opponent_socket) = opponent_socket {
                self.emitter
                    .emit(
                        &opponent_socket,
                        ServerEvent::OpponentReconnected {
                            opponent_socket_id: socket_id.to_string(),
                        },
                    )
                    .await;
            }
            info!("User {} reconnected into session {}", uid, entry.room_id);
            return Ok(());
        }

        let rooms = self
            .session_repository
            .list_rooms()
            .await
            .map_err(|e| SessionServiceError::RepositoryError(e.to_string()))?;
        for mut room in rooms {
            if !room.contains(uid) {
                continue;
            }
            if let Some(peer) = room.peer_mut(uid) {
                peer.socket_id = socket_id.to_string();
            }
            self.session_repository
                .put_room(&room)
                .await
                .map_err(|e| SessionServiceError::RepositoryError(e.to_string()))?;
            let role = match room.role_of(uid) {
                Some(role) => role,
                None => continue,
            };
            self.emit_match_found(&room, role, true).await;
            info!(
                "User {} reconnected into pending room {}",
                uid, room.room_id
            );
            break;
        }
        Ok(())
    }

    /// The user gave up on the current partner. Leaves the queue too, so a
    /// skip while still searching acts as a clean exit.
    pub async fn handle_skip(&self, socket_id: &str) -> Result<(), SessionServiceError> {
        let Some(uid) = self.uid_for(socket_id).await? else {
            return Ok(());
        };
        self.queue_repository
            .remove_by_uid(&uid)
            .await
            .map_err(|e| SessionServiceError::RepositoryError(e.to_string()))?;
        self.teardown_for_uid(&uid, MatchEndReason::Skip).await
    }

    /// Socket-level disconnect. Bindings and queue entries owned by this
    /// socket go away unconditionally; the session is only torn down when the
    /// departing socket was still the uid's current one, so a stale tab
    /// closing cannot kill a session a newer tab is using.
    pub async fn handle_disconnect(&self, socket_id: &str) -> Result<(), SessionServiceError> {
        let uid = self.uid_for(socket_id).await?;
        let was_current = match &uid {
            Some(uid) => self.resolve_socket(uid).await?.as_deref() == Some(socket_id),
            None => false,
        };
        self.socket_repository
            .unregister(socket_id)
            .await
            .map_err(|e| SessionServiceError::RepositoryError(e.to_string()))?;
        self.queue_repository
            .remove_by_socket(socket_id)
            .await
            .map_err(|e| SessionServiceError::RepositoryError(e.to_string()))?;
        if let (Some(uid), true) = (uid, was_current) {
            self.teardown_for_uid(&uid, MatchEndReason::Disconnect)
                .await?;
        }
        Ok(())
    }

    /// Tears down the user's active session and/or pending room, notifying
    /// both parties' current sockets. Both session entries go together.
    pub async fn teardown_for_uid(
        &self,
        uid: &str,
        reason: MatchEndReason,
    ) -> Result<(), SessionServiceError> {
        if let Some(entry) = self
            .session_repository
            .get_session(uid)
            .await
            .map_err(|e| SessionServiceError::RepositoryError(e.to_string()))?
        {
            let opponent_uid = entry.opponent_uid.clone();
            self.session_repository
                .delete_session(uid)
                .await
                .map_err(|e| SessionServiceError::RepositoryError(e.to_string()))?;
            self.session_repository
                .delete_session(&opponent_uid)
                .await
                .map_err(|e| SessionServiceError::RepositoryError(e.to_string()))?;
            for party in [uid, opponent_uid.as_str()] {
                if let Some(socket) = self.resolve_socket(party).await? {
                    self.emitter.emit(&socket, ServerEvent::MatchSkipped).await;
                }
            }
            self.analytics.match_ended(&entry.room_id, reason);
            info!(
                "Tore down session {} ({} vs {}, reason: {})",
                entry.room_id,
                uid,
                opponent_uid,
                reason.as_str()
            );
        }

        let rooms = self
            .session_repository
            .list_rooms()
            .await
            .map_err(|e| SessionServiceError::RepositoryError(e.to_string()))?;
        for room in rooms {
            if !room.contains(uid) {
                continue;
            }
            self.session_repository
                .delete_room(&room.room_id)
                .await
                .map_err(|e| SessionServiceError::RepositoryError(e.to_string()))?;
            if let Some(peer) = room.peer_of(uid) {
                if let Some(socket) = self.resolve_socket(&peer.uid).await? {
                    self.emitter.emit(&socket, ServerEvent::MatchSkipped).await;
                }
            }
            info!("Discarded pending room {} on teardown", room.room_id);
            break;
        }
        Ok(())
    }

    /// Deletes rooms whose handshake has been pending longer than the
    /// timeout, telling both sides the match failed. Returns how many rooms
    /// were reaped.
    pub async fn reap_stale_rooms(&self) -> Result<usize, SessionServiceError> {
        let now = Utc::now().timestamp_millis();
        let rooms = self
            .session_repository
            .list_rooms()
            .await
            .map_err(|e| SessionServiceError::RepositoryError(e.to_string()))?;
        let mut reaped = 0;
        for room in rooms {
            if !room.is_expired(now) {
                continue;
            }
            if let Err(e) = self.session_repository.delete_room(&room.room_id).await {
                error!("Failed to delete stale room {}: {}", room.room_id, e);
                continue;
            }
            for peer in [&room.player_a, &room.player_b] {
                let socket = self
                    .resolve_socket(&peer.uid)
                    .await?
                    .unwrap_or_else(|| peer.socket_id.clone());
                self.emitter
                    .emit(
                        &socket,
                        ServerEvent::MatchError {
                            message: "Match setup timed out".to_string(),
                        },
                    )
                    .await;
            }
            warn!("Reaped stale room {}", room.room_id);
            reaped += 1;
        }
        Ok(reaped)
    }

    async fn resolve_socket(&self, uid: &str) -> Result<Option<String>, SessionServiceError> {
        self.socket_repository
            .socket_for_uid(uid)
            .await
            .map_err(|e| SessionServiceError::RepositoryError(e.to_string()))
    }

    async fn uid_for(&self, socket_id: &str) -> Result<Option<String>, SessionServiceError> {
        self.socket_repository
            .uid_for_socket(socket_id)
            .await
            .map_err(|e| SessionServiceError::RepositoryError(e.to_string()))
    }
}
