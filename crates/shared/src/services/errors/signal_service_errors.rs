#[derive(Debug)]
pub enum SignalServiceError {
    RepositoryError(String),
}

impl std::fmt::Display for SignalServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalServiceError::RepositoryError(msg) => write!(f, "Repository error: {}", msg),
        }
    }
}

impl std::error::Error for SignalServiceError {}
