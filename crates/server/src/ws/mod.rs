pub mod dispatcher;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use shared::services::auth_service::{AuthContext, Credentials};

use crate::state::AppState;

/// Handshake credentials ride the upgrade request's query string.
#[derive(Debug, Deserialize)]
pub struct AuthParams {
    token: Option<String>,
    #[serde(rename = "userId")]
    user_id: Option<String>,
    #[serde(rename = "serverKey")]
    server_key: Option<String>,
}

pub async fn ws_handler(
    Query(params): Query<AuthParams>,
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> Response {
    let credentials = Credentials {
        token: params.token,
        user_id: params.user_id,
        server_key: params.server_key,
    };
    let ctx = match state.auth_service.authenticate(&credentials) {
        Ok(ctx) => ctx,
        Err(e) => {
            warn!("Refused connection: {}", e);
            return (StatusCode::UNAUTHORIZED, e.to_string()).into_response();
        }
    };
    ws.on_upgrade(move |socket| handle_socket(socket, state, ctx))
}

/// One task per connection: inbound frames are dispatched serially, outbound
/// events drain from the emitter channel, and the teardown path runs exactly
/// once when either side closes.
async fn handle_socket(socket: WebSocket, state: AppState, ctx: AuthContext) {
    let socket_id = Uuid::new_v4().to_string();
    let mut outbound = state.connections.attach(&socket_id);
    if let Err(e) = state.socket_repository.register(&socket_id, &ctx.uid).await {
        error!("Failed to register socket {}: {}", socket_id, e);
        state.connections.detach(&socket_id);
        return;
    }
    info!("User {} connected on socket {}", ctx.uid, socket_id);

    let (mut sender, mut receiver) = socket.split();
    loop {
        tokio::select! {
            Some(event) = outbound.recv() => {
                match serde_json::to_string(&event) {
                    Ok(text) => {
                        if sender.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => error!("Failed to serialize outbound event: {}", e),
                }
            }
            inbound = receiver.next() => {
                let Some(Ok(message)) = inbound else { break };
                match message {
                    Message::Text(text) => {
                        dispatcher::dispatch(&state, &ctx, &socket_id, &text).await;
                    }
                    Message::Ping(payload) => {
                        let _ = sender.send(Message::Pong(payload)).await;
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        }
    }

    state.connections.detach(&socket_id);
    if let Err(e) = state.session_service.handle_disconnect(&socket_id).await {
        error!("Teardown failed for socket {}: {}", socket_id, e);
    }
    info!("Socket {} disconnected", socket_id);
}
