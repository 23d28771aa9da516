use base64::{engine::general_purpose, Engine as _};
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha1::Sha1;

use crate::models::ice::{IceConfig, IceServer};

type HmacSha1 = Hmac<Sha1>;

/// Minted TURN credentials stay valid for one day.
pub const CREDENTIAL_TTL_SECS: i64 = 86_400;

/// Public STUN entries every list starts with; usable even with no TURN
/// infrastructure configured.
pub const STUN_URLS: [&str; 2] = [
    "stun:stun.l.google.com:19302",
    "stun:stun1.l.google.com:19302",
];

/// One relay endpoint plus the shared secret its REST credential API expects.
#[derive(Debug, Clone)]
pub struct TurnEndpoint {
    pub url: String,
    pub secret: String,
}

/// Mints per-user ICE server lists, one for the game channel and one for
/// video. TURN credentials follow the time-limited convention:
/// `username = "{expiry_unix_ts}:{uid}"`, `credential = base64(HMAC-SHA1)`.
pub struct IceService {
    game_turn: Option<TurnEndpoint>,
    video_turn: Option<TurnEndpoint>,
}

impl IceService {
    pub fn new(game_turn: Option<TurnEndpoint>, video_turn: Option<TurnEndpoint>) -> Self {
        Self {
            game_turn,
            video_turn,
        }
    }

    pub fn mint_for_user(&self, uid: &str) -> IceConfig {
        self.mint_at(uid, Utc::now().timestamp())
    }

    fn mint_at(&self, uid: &str, now_unix: i64) -> IceConfig {
        IceConfig {
            game: Self::mint_list(&self.game_turn, uid, now_unix),
            video: Self::mint_list(&self.video_turn, uid, now_unix),
        }
    }

    fn mint_list(endpoint: &Option<TurnEndpoint>, uid: &str, now_unix: i64) -> Vec<IceServer> {
        let mut servers: Vec<IceServer> =
            STUN_URLS.iter().map(|&url| IceServer::stun(url)).collect();
        if let Some(endpoint) = endpoint {
            let username = format!("{}:{}", now_unix + CREDENTIAL_TTL_SECS, uid);
            let mut mac = HmacSha1::new_from_slice(endpoint.secret.as_bytes())
                .expect("HMAC accepts keys of any length");
            mac.update(username.as_bytes());
            let credential = general_purpose::STANDARD.encode(mac.finalize().into_bytes());
            servers.push(IceServer {
                urls: vec![endpoint.url.clone()],
                username: Some(username),
                credential: Some(credential),
            });
        }
        servers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint() -> TurnEndpoint {
        TurnEndpoint {
            url: "turn:turn.example.com:3478".to_string(),
            secret: "north-secret".to_string(),
        }
    }

    #[test]
    fn test_stun_only_without_turn_config() {
        let service = IceService::new(None, None);
        let config = service.mint_for_user("alice");
        assert_eq!(config.game.len(), STUN_URLS.len());
        assert_eq!(config.video.len(), STUN_URLS.len());
        assert!(config.game.iter().all(|s| s.credential.is_none()));
    }

    #[test]
    fn test_credential_is_deterministic_hmac_sha1() {
        let service = IceService::new(Some(endpoint()), None);
        let config = service.mint_at("alice", 1_757_000_000);
        let turn = config.game.last().unwrap();
        assert_eq!(turn.username.as_deref(), Some("1757086400:alice"));
        // HMAC-SHA1("north-secret", "1757086400:alice"), base64-encoded.
        assert_eq!(
            turn.credential.as_deref(),
            Some("1V0nruY0K1n9FN6I9kWkkti3lcc=")
        );
    }

    #[test]
    fn test_username_embeds_one_day_expiry() {
        let service = IceService::new(Some(endpoint()), Some(endpoint()));
        let now = 1_757_000_000;
        let config = service.mint_at("bob", now);
        for list in [&config.game, &config.video] {
            let username = list.last().unwrap().username.as_deref().unwrap();
            let expiry: i64 = username.split(':').next().unwrap().parse().unwrap();
            assert_eq!(expiry, now + CREDENTIAL_TTL_SECS);
        }
    }

    #[test]
    fn test_lists_are_independent_per_channel() {
        let service = IceService::new(Some(endpoint()), None);
        let config = service.mint_for_user("carol");
        assert_eq!(config.game.len(), STUN_URLS.len() + 1);
        assert_eq!(config.video.len(), STUN_URLS.len());
    }
}
