use tracing::info;

use crate::models::queue::MatchMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchEndReason {
    Skip,
    Disconnect,
}

impl MatchEndReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchEndReason::Skip => "skip",
            MatchEndReason::Disconnect => "disconnect",
        }
    }
}

/// One-way analytics sink. The broker only ever writes; nothing downstream
/// feeds back into matchmaking decisions.
pub trait AnalyticsSink: Send + Sync {
    fn match_started(&self, room_id: &str, uid_a: &str, uid_b: &str, mode: MatchMode);

    fn match_ended(&self, room_id: &str, reason: MatchEndReason);
}

/// Default sink: structured log lines under the `analytics` target.
pub struct TracingAnalytics;

impl AnalyticsSink for TracingAnalytics {
    fn match_started(&self, room_id: &str, uid_a: &str, uid_b: &str, mode: MatchMode) {
        info!(
            target: "analytics",
            room_id, uid_a, uid_b, mode = mode.as_str(), "match_started"
        );
    }

    fn match_ended(&self, room_id: &str, reason: MatchEndReason) {
        info!(target: "analytics", room_id, reason = reason.as_str(), "match_ended");
    }
}
