#[derive(Debug)]
pub enum BanServiceError {
    RepositoryError(String),
}

impl std::fmt::Display for BanServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BanServiceError::RepositoryError(msg) => write!(f, "Repository error: {}", msg),
        }
    }
}

impl std::error::Error for BanServiceError {}
