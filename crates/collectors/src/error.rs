use thiserror::Error;

pub type Result<T> = std::result::Result<T, CollectorError>;

#[derive(Error, Debug)]
pub enum CollectorError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("Failed to parse JSON: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Collaborator failure: {0}")]
    CollaboratorError(#[from] scoring::collaborators::CollaboratorFailure),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Verification error: {0}")]
    VerificationError(String),
}
