pub mod auth_service_errors;
pub mod ban_service_errors;
pub mod matchmaking_service_errors;
pub mod queue_service_errors;
pub mod session_service_errors;
pub mod signal_service_errors;
