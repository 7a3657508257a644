use thiserror::Error;

pub type InterludeResult<T> = Result<T, InterludeError>;

#[derive(Error, Debug)]
pub enum InterludeError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Duplicate interstitial name: {0}")]
    DuplicateName(String),

    #[error("Entity store error: {0}")]
    Store(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Session store error: {0}")]
    Session(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl InterludeError {
    /// Whether the error is the administrative "entity not found" signal.
    pub fn is_not_found(&self) -> bool {
        matches!(self, InterludeError::NotFound(_))
    }
}
