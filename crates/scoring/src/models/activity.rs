use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Raw git measurements for one member, as produced by one analysis run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct GitActivitySample {
    pub member_id: Uuid,
    pub commit_count: u32,
    pub lines_added: u64,
    pub lines_removed: u64,
    pub files_touched: u32,
    pub active_days: u32,
    pub first_commit_at: Option<DateTime<Utc>>,
    pub last_commit_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub commit_timestamps: Vec<DateTime<Utc>>,
}

impl GitActivitySample {
    pub fn empty(member_id: Uuid) -> Self {
        Self {
            member_id,
            ..Self::default()
        }
    }

    pub fn lines_changed(&self) -> u64 {
        self.lines_added.saturating_add(self.lines_removed)
    }
}

/// One complete analysis of a project's repository.
///
/// Runs are never merged: a newer run replaces the stored one as a whole.
/// Ordering between runs is `(completed_at, version)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AnalysisRun {
    pub run_id: Uuid,
    pub project_id: Uuid,
    pub version: i64,
    pub requested_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    /// Set when the run was taken after the contribution deadline.
    pub after_contribution_deadline: bool,
    pub samples: Vec<GitActivitySample>,
}

impl AnalysisRun {
    pub fn supersedes(&self, other: &AnalysisRun) -> bool {
        (self.completed_at, self.version) > (other.completed_at, other.version)
    }
}
