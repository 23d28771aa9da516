use std::env;

use shared::services::ice_service::TurnEndpoint;

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort(String),
    PartialTurnConfig(&'static str),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidPort(value) => write!(f, "PORT is not a valid port: {}", value),
            ConfigError::PartialTurnConfig(prefix) => write!(
                f,
                "{}_URL and {}_SECRET must be set together",
                prefix, prefix
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Everything the broker reads from the environment. A missing REDIS_URL is
/// not an error: the broker then runs single-node with in-memory tables, no
/// cross-replica lease and no fan-out.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub ws_path: String,
    pub redis_url: Option<String>,
    pub jwt_secret: Option<String>,
    pub server_key: Option<String>,
    pub game_turn: Option<TurnEndpoint>,
    pub video_turn: Option<TurnEndpoint>,
}

impl Config {
    pub fn from_env() -> Result<Config, ConfigError> {
        let port = match env::var("PORT") {
            Ok(value) => value
                .parse()
                .map_err(|_| ConfigError::InvalidPort(value))?,
            Err(_) => 8080,
        };
        Ok(Config {
            port,
            ws_path: non_empty(env::var("SOCKET_IO_PATH").ok()).unwrap_or_else(|| "/ws".to_string()),
            redis_url: non_empty(env::var("REDIS_URL").ok()),
            jwt_secret: non_empty(env::var("JWT_SECRET").ok()),
            server_key: non_empty(env::var("MATCHMAKING_SERVER_KEY").ok()),
            game_turn: turn_endpoint(
                "GAME_TURN",
                non_empty(env::var("GAME_TURN_URL").ok()),
                non_empty(env::var("GAME_TURN_SECRET").ok()),
            )?,
            video_turn: turn_endpoint(
                "VIDEO_TURN",
                non_empty(env::var("VIDEO_TURN_URL").ok()),
                non_empty(env::var("VIDEO_TURN_SECRET").ok()),
            )?,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// A TURN endpoint needs both halves; one without the other is a
/// misconfigured credential store and refuses startup.
fn turn_endpoint(
    prefix: &'static str,
    url: Option<String>,
    secret: Option<String>,
) -> Result<Option<TurnEndpoint>, ConfigError> {
    match (url, secret) {
        (Some(url), Some(secret)) => Ok(Some(TurnEndpoint { url, secret })),
        (None, None) => Ok(None),
        _ => Err(ConfigError::PartialTurnConfig(prefix)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turn_endpoint_requires_both_halves() {
        assert!(turn_endpoint("GAME_TURN", None, None).unwrap().is_none());
        let endpoint = turn_endpoint(
            "GAME_TURN",
            Some("turn:relay.example.com:3478".to_string()),
            Some("secret".to_string()),
        )
        .unwrap()
        .unwrap();
        assert_eq!(endpoint.url, "turn:relay.example.com:3478");

        assert!(turn_endpoint("GAME_TURN", Some("turn:x".to_string()), None).is_err());
        assert!(turn_endpoint("GAME_TURN", None, Some("secret".to_string())).is_err());
    }

    #[test]
    fn test_non_empty_filters_blank_values() {
        assert_eq!(non_empty(Some(String::new())), None);
        assert_eq!(non_empty(Some("x".to_string())), Some("x".to_string()));
        assert_eq!(non_empty(None), None);
    }
}
