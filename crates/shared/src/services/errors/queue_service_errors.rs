#[derive(Debug)]
pub enum QueueServiceError {
    ValidationError(String),
    ProfileMissing,
    RepositoryError(String),
}

impl std::fmt::Display for QueueServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueServiceError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            QueueServiceError::ProfileMissing => {
                write!(f, "Profile is missing required matchmaking fields")
            }
            QueueServiceError::RepositoryError(msg) => write!(f, "Repository error: {}", msg),
        }
    }
}

impl std::error::Error for QueueServiceError {}
