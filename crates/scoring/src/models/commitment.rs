use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Hash binding a project's final results, plus where it was published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Commitment {
    pub project_id: Uuid,
    pub hash: String,
    pub schema_version: i16,
    pub created_at: DateTime<Utc>,
    pub external_reference: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

impl Commitment {
    pub fn is_published(&self) -> bool {
        self.external_reference.is_some()
    }
}
