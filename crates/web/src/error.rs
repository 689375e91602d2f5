use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use scoring::collaborators::CollaboratorFailure;
use scoring::{ErrorClass, ScoringError, StorageError};
use serde_json::json;
use std::fmt;
use validator::ValidationErrors;

/// Web layer errors
#[derive(Debug)]
pub enum WebError {
    Scoring(ScoringError),
    Validation(ValidationErrors),
    BadRequest(String),
    Unauthorized,
    /// The gateway did not forward a caller identity.
    MissingIdentity,
}

impl fmt::Display for WebError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scoring(e) => write!(f, "{}", e),
            Self::Validation(e) => write!(f, "Validation error: {}", e),
            Self::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            Self::Unauthorized => write!(f, "Unauthorized"),
            Self::MissingIdentity => write!(f, "Missing caller identity"),
        }
    }
}

impl WebError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Scoring(e) => scoring_status(e),
            Self::Validation(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized | Self::MissingIdentity => StatusCode::UNAUTHORIZED,
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Scoring(e) => e.class(),
            _ => ErrorClass::FixInput,
        }
    }
}

fn scoring_status(error: &ScoringError) -> StatusCode {
    match error {
        ScoringError::Validation(_) => StatusCode::BAD_REQUEST,
        ScoringError::InvalidVote(_) => StatusCode::UNPROCESSABLE_ENTITY,
        ScoringError::Lifecycle(_)
        | ScoringError::PrematureFinalization
        | ScoringError::CommitmentExists(_)
        | ScoringError::NoCommitment
        | ScoringError::ReferenceExists(_) => StatusCode::CONFLICT,
        ScoringError::Collaborator(failure) => match failure {
            CollaboratorFailure::RepoUnreachable(_) | CollaboratorFailure::AuthRequired(_) => {
                StatusCode::BAD_GATEWAY
            }
            CollaboratorFailure::ChainUnavailable(_)
            | CollaboratorFailure::InsufficientFunds(_) => StatusCode::SERVICE_UNAVAILABLE,
            CollaboratorFailure::Timeout(..) => StatusCode::GATEWAY_TIMEOUT,
        },
        ScoringError::Forbidden => StatusCode::FORBIDDEN,
        ScoringError::NotFound => StatusCode::NOT_FOUND,
        ScoringError::Storage(StorageError::ConstraintViolation(_)) => StatusCode::CONFLICT,
        ScoringError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let status_code = self.status_code();
        let class = self.class();

        let body = match &self {
            Self::Scoring(ScoringError::NotFound) => {
                json!({
                    "error": "Resource not found",
                    "class": class
                })
            }
            Self::Scoring(ScoringError::Storage(StorageError::ConstraintViolation(msg))) => {
                json!({
                    "error": msg,
                    "class": class
                })
            }
            Self::Scoring(ScoringError::Storage(e)) => {
                tracing::error!("Storage error: {:?}", e);
                json!({
                    "error": "An internal error occurred",
                    "class": class
                })
            }
            Self::Scoring(ScoringError::Collaborator(failure)) => {
                tracing::warn!("Collaborator failure: {}", failure);
                json!({
                    "error": failure.to_string(),
                    "class": class
                })
            }
            Self::Scoring(e) => {
                json!({
                    "error": e.to_string(),
                    "class": class
                })
            }
            Self::Validation(errors) => {
                let field_errors: Vec<String> = errors
                    .field_errors()
                    .iter()
                    .flat_map(|(field, errors)| {
                        errors.iter().map(move |e| {
                            format!(
                                "{}: {}",
                                field,
                                e.message
                                    .as_ref()
                                    .map(|m| m.to_string())
                                    .unwrap_or_else(|| e.code.to_string())
                            )
                        })
                    })
                    .collect();

                json!({
                    "error": "Validation failed",
                    "class": class,
                    "details": field_errors
                })
            }
            Self::BadRequest(msg) => {
                json!({
                    "error": msg,
                    "class": class
                })
            }
            Self::Unauthorized => {
                json!({
                    "error": "Unauthorized",
                    "class": class
                })
            }
            Self::MissingIdentity => {
                json!({
                    "error": "Missing x-identity-id header",
                    "class": class
                })
            }
        };

        (status_code, Json(body)).into_response()
    }
}

impl From<ScoringError> for WebError {
    fn from(error: ScoringError) -> Self {
        Self::Scoring(error)
    }
}

impl From<ValidationErrors> for WebError {
    fn from(error: ValidationErrors) -> Self {
        Self::Validation(error)
    }
}

pub type ApiResult<T> = Result<T, WebError>;
