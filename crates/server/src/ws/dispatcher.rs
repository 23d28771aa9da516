use tracing::{error, info, warn};

use shared::models::events::{
    AdminBanRequest, ClientEvent, InviteReplyRequest, JoinQueueRequest, SendInviteRequest,
    ServerEvent, SignalFrame,
};
use shared::models::queue::MatchMode;
use shared::services::analytics::MatchEndReason;
use shared::services::auth_service::AuthContext;
use shared::services::errors::queue_service_errors::QueueServiceError;
use shared::services::queue_service::JoinQueueOutcome;

use crate::state::AppState;

/// Parses one inbound frame and fans it to the owning service. Every inbound
/// event name maps to exactly one arm here; anything else gets an error
/// event back.
pub async fn dispatch(state: &AppState, ctx: &AuthContext, socket_id: &str, raw: &str) {
    let event = match serde_json::from_str::<ClientEvent>(raw) {
        Ok(event) => event,
        Err(e) => {
            warn!("Unparseable event from socket {}: {}", socket_id, e);
            state
                .emitter
                .emit(
                    socket_id,
                    ServerEvent::Error {
                        message: "Unknown or malformed event".to_string(),
                    },
                )
                .await;
            return;
        }
    };

    match event {
        ClientEvent::JoinQueue(request) => join_queue(state, ctx, socket_id, request).await,
        ClientEvent::LeaveQueue => {
            if let Err(e) = state.queue_service.leave_queue(&ctx.uid).await {
                error!("leave_queue failed for {}: {}", ctx.uid, e);
            }
        }
        ClientEvent::SkipMatch => {
            if let Err(e) = state.session_service.handle_skip(socket_id).await {
                error!("skip_match failed for socket {}: {}", socket_id, e);
            }
        }
        ClientEvent::ConnectionStable(request) => {
            if let Err(e) = state
                .session_service
                .handle_connection_stable(socket_id, &request.room_id, request.service)
                .await
            {
                error!(
                    "connection_stable failed for room {}: {}",
                    request.room_id, e
                );
            }
        }
        ClientEvent::Reconnect => {
            if let Err(e) = state
                .session_service
                .handle_reconnection(socket_id, &ctx.uid)
                .await
            {
                error!("reconnect failed for {}: {}", ctx.uid, e);
            }
        }
        ClientEvent::GetIceServers => {
            state
                .emitter
                .emit(
                    socket_id,
                    ServerEvent::IceServersConfig {
                        ice_servers: state.ice_service.mint_for_user(&ctx.uid),
                    },
                )
                .await;
        }
        ClientEvent::Offer(frame) => relay(state, socket_id, frame, ServerEvent::Offer, true).await,
        ClientEvent::Answer(frame) => {
            relay(state, socket_id, frame, ServerEvent::Answer, false).await
        }
        ClientEvent::IceCandidate(frame) => {
            relay(state, socket_id, frame, ServerEvent::IceCandidate, false).await
        }
        ClientEvent::VideoOffer(frame) => {
            relay(state, socket_id, frame, ServerEvent::VideoOffer, true).await
        }
        ClientEvent::VideoAnswer(frame) => {
            relay(state, socket_id, frame, ServerEvent::VideoAnswer, false).await
        }
        ClientEvent::VideoIceCandidate(frame) => {
            relay(state, socket_id, frame, ServerEvent::VideoIceCandidate, false).await
        }
        ClientEvent::SendInvite(request) => send_invite(state, ctx, socket_id, request).await,
        ClientEvent::AcceptInvite(request) => accept_invite(state, ctx, socket_id, request).await,
        ClientEvent::RejectInvite(request) => reject_invite(state, ctx, request).await,
        ClientEvent::AdminKickUser(request) => {
            if require_admin(state, ctx, socket_id).await {
                kick_user(state, &request.uid, request.reason.as_deref(), true).await;
            }
        }
        ClientEvent::AdminBanUser(request) => {
            if require_admin(state, ctx, socket_id).await {
                admin_ban(state, request).await;
            }
        }
        ClientEvent::AdminUnbanUser(request) => {
            if require_admin(state, ctx, socket_id).await {
                if let Err(e) = state.ban_service.unban_user(&request.uid).await {
                    error!("admin_unban_user failed for {}: {}", request.uid, e);
                }
            }
        }
        ClientEvent::AdminForceDisconnect(request) => {
            if require_admin(state, ctx, socket_id).await {
                kick_user(state, &request.uid, None, false).await;
            }
        }
    }
}

async fn join_queue(
    state: &AppState,
    ctx: &AuthContext,
    socket_id: &str,
    request: JoinQueueRequest,
) {
    // Joining while paired abandons the current partner first; a uid must
    // never sit in a partition and an active session at the same time.
    if let Err(e) = state
        .session_service
        .teardown_for_uid(&ctx.uid, MatchEndReason::Skip)
        .await
    {
        error!("Pre-join teardown failed for {}: {}", ctx.uid, e);
    }
    match state
        .queue_service
        .join_queue(&ctx.uid, socket_id, &request)
        .await
    {
        Ok(JoinQueueOutcome::Joined(user)) => {
            info!(
                "User {} queued for {} matchmaking",
                user.uid,
                user.mode.as_str()
            );
        }
        Ok(JoinQueueOutcome::Banned(entry)) => {
            let remaining_ms = state
                .ban_service
                .remaining_ban_ms(&ctx.uid)
                .await
                .unwrap_or(-1);
            let remaining_minutes = if remaining_ms < 0 {
                -1
            } else {
                (remaining_ms + 59_999) / 60_000
            };
            state
                .emitter
                .emit(
                    socket_id,
                    ServerEvent::Banned {
                        reason: entry.reason,
                        remaining_minutes,
                        message: "You are banned from matchmaking".to_string(),
                    },
                )
                .await;
        }
        Err(QueueServiceError::ProfileMissing) => {
            state
                .emitter
                .emit(
                    socket_id,
                    ServerEvent::Error {
                        message: "Complete your profile before joining the queue".to_string(),
                    },
                )
                .await;
        }
        Err(e) => {
            error!("join_queue failed for {}: {}", ctx.uid, e);
            state
                .emitter
                .emit(
                    socket_id,
                    ServerEvent::Error {
                        message: "Failed to join the queue".to_string(),
                    },
                )
                .await;
        }
    }
}

async fn relay(
    state: &AppState,
    socket_id: &str,
    frame: SignalFrame,
    wrap: fn(SignalFrame) -> ServerEvent,
    is_offer: bool,
) {
    match state.signal_service.route(socket_id, &frame, is_offer).await {
        Ok(Some((target, forwarded))) => {
            state.emitter.emit(&target, wrap(forwarded)).await;
        }
        Ok(None) => {}
        Err(e) => error!("Signal routing failed for socket {}: {}", socket_id, e),
    }
}

async fn send_invite(
    state: &AppState,
    ctx: &AuthContext,
    socket_id: &str,
    request: SendInviteRequest,
) {
    if request.target_uid == ctx.uid {
        state
            .emitter
            .emit(
                socket_id,
                ServerEvent::InviteError {
                    message: "You cannot invite yourself".to_string(),
                },
            )
            .await;
        return;
    }
    match state
        .socket_repository
        .socket_for_uid(&request.target_uid)
        .await
    {
        Ok(Some(target_socket)) => {
            state
                .emitter
                .emit(
                    &target_socket,
                    ServerEvent::ReceiveInvite {
                        inviter_uid: ctx.uid.clone(),
                        inviter_socket_id: socket_id.to_string(),
                        mode: MatchMode::Video,
                    },
                )
                .await;
        }
        Ok(None) => {
            state
                .emitter
                .emit(
                    socket_id,
                    ServerEvent::InviteError {
                        message: "User is offline".to_string(),
                    },
                )
                .await;
        }
        Err(e) => error!("send_invite lookup failed: {}", e),
    }
}

async fn accept_invite(
    state: &AppState,
    ctx: &AuthContext,
    socket_id: &str,
    request: InviteReplyRequest,
) {
    // The inviter initiates, exactly as role A does on a queue match.
    match state
        .session_service
        .create_direct_room(&request.inviter_uid, &ctx.uid, MatchMode::Video)
        .await
    {
        Ok(Some(room_id)) => {
            info!(
                "Invite accepted: {} and {} in room {}",
                request.inviter_uid, ctx.uid, room_id
            );
        }
        Ok(None) => {
            state
                .emitter
                .emit(
                    socket_id,
                    ServerEvent::InviteError {
                        message: "User is offline".to_string(),
                    },
                )
                .await;
        }
        Err(e) => {
            error!("accept_invite failed for {}: {}", ctx.uid, e);
            state
                .emitter
                .emit(
                    socket_id,
                    ServerEvent::InviteError {
                        message: "Could not start the match".to_string(),
                    },
                )
                .await;
        }
    }
}

async fn reject_invite(state: &AppState, ctx: &AuthContext, request: InviteReplyRequest) {
    match state
        .socket_repository
        .socket_for_uid(&request.inviter_uid)
        .await
    {
        Ok(Some(inviter_socket)) => {
            state
                .emitter
                .emit(
                    &inviter_socket,
                    ServerEvent::InviteRejected {
                        target_uid: ctx.uid.clone(),
                    },
                )
                .await;
        }
        Ok(None) => {}
        Err(e) => error!("reject_invite lookup failed: {}", e),
    }
}

async fn require_admin(state: &AppState, ctx: &AuthContext, socket_id: &str) -> bool {
    if ctx.is_admin {
        return true;
    }
    warn!("Non-admin {} attempted an admin event", ctx.uid);
    state
        .emitter
        .emit(
            socket_id,
            ServerEvent::Error {
                message: "Admin privileges required".to_string(),
            },
        )
        .await;
    false
}

/// Shared teardown for kick and force-disconnect: notify when asked, then
/// run the full disconnect path against the user's current socket.
async fn kick_user(state: &AppState, uid: &str, reason: Option<&str>, notify: bool) {
    let socket = match state.socket_repository.socket_for_uid(uid).await {
        Ok(Some(socket)) => socket,
        Ok(None) => {
            info!("Admin action on offline user {}", uid);
            return;
        }
        Err(e) => {
            error!("Admin lookup failed for {}: {}", uid, e);
            return;
        }
    };
    if notify {
        state
            .emitter
            .emit(
                &socket,
                ServerEvent::Kicked {
                    reason: reason.unwrap_or("kicked_by_admin").to_string(),
                },
            )
            .await;
    }
    if let Err(e) = state.session_service.handle_disconnect(&socket).await {
        error!("Admin teardown failed for {}: {}", uid, e);
    }
}

async fn admin_ban(state: &AppState, request: AdminBanRequest) {
    match state
        .ban_service
        .ban_user(&request.uid, &request.reason, request.duration_minutes)
        .await
    {
        Ok(entry) => {
            if let Ok(Some(socket)) = state.socket_repository.socket_for_uid(&request.uid).await {
                let remaining_minutes = if entry.is_permanent() {
                    -1
                } else {
                    request.duration_minutes
                };
                state
                    .emitter
                    .emit(
                        &socket,
                        ServerEvent::Banned {
                            reason: entry.reason.clone(),
                            remaining_minutes,
                            message: "You have been banned from matchmaking".to_string(),
                        },
                    )
                    .await;
            }
            kick_user(state, &request.uid, Some(&request.reason), false).await;
        }
        Err(e) => error!("admin_ban_user failed for {}: {}", request.uid, e),
    }
}
