use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::Member;

/// A rating of one teammate. Range and membership are checked by the ledger.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct VoteRequest {
    pub ratee_id: Uuid,
    /// 1 to 5.
    pub score: i32,
}

/// Teammates the caller has not rated yet.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RemainingRateesResponse {
    pub voter_id: Uuid,
    pub ratees: Vec<Member>,
}
