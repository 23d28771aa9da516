use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::StreamExt;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, warn};

use shared::keys;
use shared::models::events::ServerEvent;
use shared::services::emitter::Emitter;

/// Sockets attached to this process: socket id to the outbound channel its
/// connection task drains. An old receiver sees its channel close when a
/// reconnecting socket id re-attaches.
#[derive(Default)]
pub struct LocalEmitter {
    connections: DashMap<String, mpsc::UnboundedSender<ServerEvent>>,
}

impl LocalEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, socket_id: &str) -> mpsc::UnboundedReceiver<ServerEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.connections.insert(socket_id.to_string(), tx);
        rx
    }

    pub fn detach(&self, socket_id: &str) {
        self.connections.remove(socket_id);
    }

    pub fn try_send(&self, socket_id: &str, event: ServerEvent) -> bool {
        match self.connections.get(socket_id) {
            Some(sender) => sender.send(event).is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl Emitter for LocalEmitter {
    async fn emit(&self, socket_id: &str, event: ServerEvent) -> bool {
        let delivered = self.try_send(socket_id, event);
        if !delivered {
            warn!("No local connection for socket {}; event dropped", socket_id);
        }
        delivered
    }
}

#[derive(Serialize, Deserialize)]
struct EmitEnvelope {
    socket_id: String,
    event: ServerEvent,
}

/// Multi-replica emitter: local delivery when the socket lives here,
/// otherwise a pub/sub hop to whichever replica owns it.
pub struct FanoutEmitter {
    local: Arc<LocalEmitter>,
    connection: MultiplexedConnection,
}

impl FanoutEmitter {
    pub fn new(local: Arc<LocalEmitter>, connection: MultiplexedConnection) -> Self {
        Self { local, connection }
    }
}

#[async_trait]
impl Emitter for FanoutEmitter {
    async fn emit(&self, socket_id: &str, event: ServerEvent) -> bool {
        if self.local.try_send(socket_id, event.clone()) {
            return true;
        }
        let envelope = EmitEnvelope {
            socket_id: socket_id.to_string(),
            event,
        };
        let payload = match serde_json::to_string(&envelope) {
            Ok(payload) => payload,
            Err(e) => {
                error!("Failed to serialize emit envelope: {}", e);
                return false;
            }
        };
        let mut conn = self.connection.clone();
        match conn.publish::<_, _, ()>(keys::EMIT_CHANNEL, payload).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Fan-out publish for socket {} failed: {}", socket_id, e);
                false
            }
        }
    }
}

/// Long-running subscriber that delivers fanned-out events to sockets owned
/// by this replica. Envelopes for sockets living elsewhere are ignored.
pub async fn run_fanout_subscriber(client: redis::Client, local: Arc<LocalEmitter>) {
    loop {
        match client.get_async_pubsub().await {
            Ok(mut pubsub) => {
                if let Err(e) = pubsub.subscribe(keys::EMIT_CHANNEL).await {
                    error!("Failed to subscribe to {}: {}", keys::EMIT_CHANNEL, e);
                } else {
                    let mut messages = pubsub.on_message();
                    while let Some(message) = messages.next().await {
                        let payload: String = match message.get_payload() {
                            Ok(payload) => payload,
                            Err(e) => {
                                warn!("Unreadable fan-out payload: {}", e);
                                continue;
                            }
                        };
                        match serde_json::from_str::<EmitEnvelope>(&payload) {
                            Ok(envelope) => {
                                local.try_send(&envelope.socket_id, envelope.event);
                            }
                            Err(e) => warn!("Malformed fan-out envelope: {}", e),
                        }
                    }
                }
            }
            Err(e) => error!("Fan-out subscriber cannot connect: {}", e),
        }
        tokio::time::sleep(Duration::from_secs(5)).await;
    }
}
