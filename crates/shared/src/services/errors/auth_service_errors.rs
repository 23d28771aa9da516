#[derive(Debug, PartialEq)]
pub enum AuthServiceError {
    MissingCredentials,
    InvalidToken,
    InvalidServerKey,
}

impl std::fmt::Display for AuthServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthServiceError::MissingCredentials => write!(f, "No credentials supplied"),
            AuthServiceError::InvalidToken => write!(f, "Token rejected"),
            AuthServiceError::InvalidServerKey => write!(f, "Server key rejected"),
        }
    }
}

impl std::error::Error for AuthServiceError {}
