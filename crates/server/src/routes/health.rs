use axum::Json;
use serde_json::{json, Value};

/// Liveness probe; the broker carries no other HTTP surface.
pub async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok", "service": "matchmaking" }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_health_check_shape() {
        let Json(body) = health_check().await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "matchmaking");
    }
}
