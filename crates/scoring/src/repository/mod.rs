use uuid::Uuid;

use crate::error::StorageResult;
use crate::models::{AnalysisRun, Commitment, Member, Project, ScoreRecord, Vote};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgProjectRepository;

/// Persistence of projects and everything they own.
///
/// Implementations do no lifecycle checking of their own beyond the atomic
/// `finalize` write; callers serialize mutations per project.
#[async_trait::async_trait]
pub trait ProjectStore: Send + Sync {
    async fn insert_project(&self, project: &Project, members: &[Member]) -> StorageResult<()>;

    /// Overwrites the project's rules and phase.
    async fn update_project(&self, project: &Project) -> StorageResult<()>;

    async fn get_project(&self, project_id: Uuid) -> StorageResult<Project>;

    /// Projects newest first, plus the total count.
    async fn list_projects(&self, offset: u32, limit: u32) -> StorageResult<(Vec<Project>, i64)>;

    async fn list_members(&self, project_id: Uuid) -> StorageResult<Vec<Member>>;

    /// Fails with `ConstraintViolation` when the identity already joined.
    async fn insert_member(&self, member: &Member) -> StorageResult<()>;

    /// Inserts the vote or replaces the one with the same (voter, ratee).
    async fn upsert_vote(&self, vote: &Vote) -> StorageResult<Vote>;

    async fn list_votes(&self, project_id: Uuid) -> StorageResult<Vec<Vote>>;

    async fn latest_analysis(&self, project_id: Uuid) -> StorageResult<Option<AnalysisRun>>;

    /// Stores `run` unless the stored run supersedes it. Returns whether it was stored.
    async fn replace_analysis(&self, run: &AnalysisRun) -> StorageResult<bool>;

    /// Moves an active project to finalized together with its records and
    /// commitment, all or nothing.
    async fn finalize(
        &self,
        project_id: Uuid,
        records: &[ScoreRecord],
        commitment: &Commitment,
    ) -> StorageResult<()>;

    /// Records ordered by rank.
    async fn score_records(&self, project_id: Uuid) -> StorageResult<Vec<ScoreRecord>>;

    async fn commitment(&self, project_id: Uuid) -> StorageResult<Option<Commitment>>;

    /// Sets the external reference of a commitment that has none yet.
    async fn save_external_reference(&self, commitment: &Commitment) -> StorageResult<()>;
}
