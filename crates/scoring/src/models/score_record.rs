use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Final score of one member, written once when the project is finalized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct ScoreRecord {
    pub project_id: Uuid,
    pub member_id: Uuid,
    pub code_score: Decimal,
    pub time_score: Decimal,
    pub peer_score: Decimal,
    pub final_score: Decimal,
    pub rank: i32,
    /// SHA-256 over the record's canonical encoding, hex encoded.
    pub record_hash: String,
    pub created_at: DateTime<Utc>,
}
