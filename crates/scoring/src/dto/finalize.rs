use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::models::{Commitment, ScoreRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FinalizeStatus {
    /// This request finalized the project.
    Finalized,
    /// An earlier request did; the stored results are returned unchanged.
    AlreadyFinalized,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FinalizeResponse {
    pub status: FinalizeStatus,
    pub commitment: Commitment,
    pub records: Vec<ScoreRecord>,
}

/// A ledger reference obtained outside the publish call.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct ExternalReferenceRequest {
    #[validate(length(min = 1, max = 255))]
    pub reference: String,
}
