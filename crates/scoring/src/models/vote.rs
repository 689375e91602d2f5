use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// A peer rating. At most one per (project, voter, ratee); resubmission replaces it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Vote {
    pub project_id: Uuid,
    pub voter_id: Uuid,
    pub ratee_id: Uuid,
    pub score: i32,
    pub submitted_at: DateTime<Utc>,
}
