use thiserror::Error;

use crate::collaborators::CollaboratorFailure;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Stored value could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Not found")]
    NotFound,

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),
}

impl StorageError {
    pub fn is_unique_violation(&self) -> bool {
        matches!(
            self,
            StorageError::Database(sqlx::Error::Database(e))
                if e.code().as_deref() == Some("23505")
        )
    }

    pub fn is_foreign_key_violation(&self) -> bool {
        matches!(
            self,
            StorageError::Database(sqlx::Error::Database(e))
                if e.code().as_deref() == Some("23503")
        )
    }
}

/// Why a vote was refused. The ledger is left untouched in every case.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VoteRejection {
    #[error("members cannot rate themselves")]
    SelfVote,

    #[error("score {0} is outside the 1-5 range")]
    ScoreOutOfRange(i32),

    #[error("voter is not a member of this project")]
    VoterNotMember,

    #[error("ratee is not a member of this project")]
    RateeNotMember,

    #[error("the voting window closed at the voting deadline")]
    OutsideWindow,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleViolation {
    #[error("project is still a draft")]
    NotActive,

    #[error("project rules can only change while the project is a draft")]
    NotDraft,

    /// A repeated finalize request. The stored results stand.
    #[error("project is already finalized")]
    AlreadyFinalized,

    /// Any other change requested after finalization.
    #[error("project is finalized and accepts no further changes")]
    Finalized,

    #[error("project cannot be finalized before the voting deadline")]
    FinalizeBeforeDeadline,

    #[error("members can only join before the contribution deadline")]
    MembershipClosed,

    #[error("project has no repository to analyze")]
    NoRepository,

    #[error("project has no members")]
    NoMembers,
}

/// How a caller should react to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// The request itself is wrong or arrived at the wrong time.
    FixInput,
    /// An external collaborator failed; nothing changed, try again.
    RetryLater,
    /// The operation already happened; the existing result stands.
    AlreadyHappened,
    Internal,
}

#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid vote: {0}")]
    InvalidVote(#[from] VoteRejection),

    #[error("Lifecycle violation: {0}")]
    Lifecycle(#[from] LifecycleViolation),

    #[error("Final scores requested before the project may be finalized")]
    PrematureFinalization,

    #[error("Commitment already exists: {0}")]
    CommitmentExists(String),

    #[error("No commitment has been made for this project")]
    NoCommitment,

    #[error("Commitment already carries external reference {0}")]
    ReferenceExists(String),

    #[error("Collaborator failure: {0}")]
    Collaborator(#[from] CollaboratorFailure),

    #[error("Only the project creator may do this")]
    Forbidden,

    #[error("Not found")]
    NotFound,

    #[error(transparent)]
    Storage(StorageError),
}

impl From<StorageError> for ScoringError {
    fn from(error: StorageError) -> Self {
        match error {
            StorageError::NotFound => Self::NotFound,
            other => Self::Storage(other),
        }
    }
}

impl From<validator::ValidationErrors> for ScoringError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Validation(errors.to_string())
    }
}

impl ScoringError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Validation(_)
            | Self::InvalidVote(_)
            | Self::PrematureFinalization
            | Self::NoCommitment
            | Self::Forbidden
            | Self::NotFound => ErrorClass::FixInput,
            Self::Lifecycle(LifecycleViolation::AlreadyFinalized)
            | Self::CommitmentExists(_)
            | Self::ReferenceExists(_) => ErrorClass::AlreadyHappened,
            Self::Lifecycle(_) => ErrorClass::FixInput,
            Self::Collaborator(_) => ErrorClass::RetryLater,
            Self::Storage(_) => ErrorClass::Internal,
        }
    }
}

pub type Result<T> = std::result::Result<T, ScoringError>;
pub type StorageResult<T> = std::result::Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classes_separate_input_retry_and_history() {
        assert_eq!(
            ScoringError::from(VoteRejection::SelfVote).class(),
            ErrorClass::FixInput
        );
        assert_eq!(
            ScoringError::from(CollaboratorFailure::ChainUnavailable("down".into())).class(),
            ErrorClass::RetryLater
        );
        assert_eq!(
            ScoringError::CommitmentExists("ab".into()).class(),
            ErrorClass::AlreadyHappened
        );
        assert_eq!(
            ScoringError::from(LifecycleViolation::AlreadyFinalized).class(),
            ErrorClass::AlreadyHappened
        );
        assert_eq!(
            ScoringError::from(LifecycleViolation::Finalized).class(),
            ErrorClass::FixInput
        );
    }

    #[test]
    fn test_storage_not_found_maps_to_not_found() {
        assert!(matches!(
            ScoringError::from(StorageError::NotFound),
            ScoringError::NotFound
        ));
    }
}
