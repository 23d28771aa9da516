use async_trait::async_trait;

use crate::models::events::ServerEvent;

/// The transport boundary: "deliver this event to socket S, wherever it is".
/// Implementations are best-effort; a `false` return means the socket has no
/// live connection reachable from this process or its fan-out fabric.
#[async_trait]
pub trait Emitter: Send + Sync {
    async fn emit(&self, socket_id: &str, event: ServerEvent) -> bool;
}

#[cfg(test)]
pub mod recording {
    use std::sync::Mutex;

    use super::*;

    /// Test double that records every emit in order.
    #[derive(Default)]
    pub struct RecordingEmitter {
        events: Mutex<Vec<(String, ServerEvent)>>,
    }

    impl RecordingEmitter {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn events_for(&self, socket_id: &str) -> Vec<ServerEvent> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .filter(|(sid, _)| sid == socket_id)
                .map(|(_, event)| event.clone())
                .collect()
        }
    }

    #[async_trait]
    impl Emitter for RecordingEmitter {
        async fn emit(&self, socket_id: &str, event: ServerEvent) -> bool {
            self.events
                .lock()
                .unwrap()
                .push((socket_id.to_string(), event));
            true
        }
    }
}
