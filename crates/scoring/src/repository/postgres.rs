use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::error::{StorageError, StorageResult};
use crate::models::{
    AnalysisRun, Commitment, GitActivitySample, Member, MemberRole, Phase, Project, ScoreRecord,
    Vote, Weights,
};
use crate::repository::ProjectStore;

const PROJECT_COLUMNS: &str = r#"
    project_id, name, repo_url, weight_code, weight_time, weight_peer,
    contribution_start, contribution_deadline, voting_deadline,
    phase, creator_id, created_at
"#;

#[derive(FromRow)]
struct ProjectRow {
    project_id: Uuid,
    name: String,
    repo_url: Option<String>,
    weight_code: Decimal,
    weight_time: Decimal,
    weight_peer: Decimal,
    contribution_start: DateTime<Utc>,
    contribution_deadline: DateTime<Utc>,
    voting_deadline: DateTime<Utc>,
    phase: String,
    creator_id: Uuid,
    created_at: DateTime<Utc>,
}

impl TryFrom<ProjectRow> for Project {
    type Error = StorageError;

    fn try_from(row: ProjectRow) -> Result<Self, Self::Error> {
        let phase = row
            .phase
            .parse::<Phase>()
            .map_err(StorageError::ConstraintViolation)?;

        Ok(Project {
            project_id: row.project_id,
            name: row.name,
            repo_url: row.repo_url,
            weights: Weights::new(row.weight_code, row.weight_time, row.weight_peer),
            contribution_start: row.contribution_start,
            contribution_deadline: row.contribution_deadline,
            voting_deadline: row.voting_deadline,
            phase,
            creator_id: row.creator_id,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct MemberRow {
    member_id: Uuid,
    project_id: Uuid,
    external_id: String,
    display_name: String,
    avatar_url: Option<String>,
    wallet_address: Option<String>,
    role: String,
    joined_at: DateTime<Utc>,
}

impl TryFrom<MemberRow> for Member {
    type Error = StorageError;

    fn try_from(row: MemberRow) -> Result<Self, Self::Error> {
        let role = MemberRole::parse(&row.role).ok_or_else(|| {
            StorageError::ConstraintViolation(format!("unknown member role '{}'", row.role))
        })?;

        Ok(Member {
            member_id: row.member_id,
            project_id: row.project_id,
            external_id: row.external_id,
            display_name: row.display_name,
            avatar_url: row.avatar_url,
            wallet_address: row.wallet_address,
            role,
            joined_at: row.joined_at,
        })
    }
}

#[derive(FromRow)]
struct AnalysisRow {
    run_id: Uuid,
    project_id: Uuid,
    version: i64,
    requested_at: DateTime<Utc>,
    completed_at: DateTime<Utc>,
    after_contribution_deadline: bool,
    samples: Json<Vec<GitActivitySample>>,
}

impl From<AnalysisRow> for AnalysisRun {
    fn from(row: AnalysisRow) -> Self {
        AnalysisRun {
            run_id: row.run_id,
            project_id: row.project_id,
            version: row.version,
            requested_at: row.requested_at,
            completed_at: row.completed_at,
            after_contribution_deadline: row.after_contribution_deadline,
            samples: row.samples.0,
        }
    }
}

pub struct PgProjectRepository {
    pool: PgPool,
}

impl PgProjectRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn ensure_project(&self, project_id: Uuid) -> StorageResult<()> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM projects WHERE project_id = $1)",
        )
        .bind(project_id)
        .fetch_one(&self.pool)
        .await?;

        if exists {
            Ok(())
        } else {
            Err(StorageError::NotFound)
        }
    }
}

fn map_constraint(error: sqlx::Error, message: impl FnOnce() -> String) -> StorageError {
    let error = StorageError::from(error);
    if error.is_unique_violation() {
        StorageError::ConstraintViolation(message())
    } else if error.is_foreign_key_violation() {
        StorageError::NotFound
    } else {
        error
    }
}

async fn insert_member_with<'e, E>(executor: E, member: &Member) -> StorageResult<()>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    sqlx::query(
        r#"
        INSERT INTO project_members (
            member_id, project_id, external_id, display_name,
            avatar_url, wallet_address, role, joined_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(member.member_id)
    .bind(member.project_id)
    .bind(&member.external_id)
    .bind(&member.display_name)
    .bind(&member.avatar_url)
    .bind(&member.wallet_address)
    .bind(member.role.as_str())
    .bind(member.joined_at)
    .execute(executor)
    .await
    .map_err(|e| {
        map_constraint(e, || {
            format!("{} is already a member of this project", member.external_id)
        })
    })?;

    Ok(())
}

#[async_trait::async_trait]
impl ProjectStore for PgProjectRepository {
    async fn insert_project(&self, project: &Project, members: &[Member]) -> StorageResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO projects (
                project_id, name, repo_url, weight_code, weight_time, weight_peer,
                contribution_start, contribution_deadline, voting_deadline,
                phase, creator_id, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(project.project_id)
        .bind(&project.name)
        .bind(&project.repo_url)
        .bind(project.weights.code)
        .bind(project.weights.time)
        .bind(project.weights.peer)
        .bind(project.contribution_start)
        .bind(project.contribution_deadline)
        .bind(project.voting_deadline)
        .bind(project.phase.as_str())
        .bind(project.creator_id)
        .bind(project.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_constraint(e, || format!("project {} already exists", project.project_id)))?;

        for member in members {
            insert_member_with(&mut *tx, member).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn update_project(&self, project: &Project) -> StorageResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE projects
            SET name = $2,
                repo_url = $3,
                weight_code = $4,
                weight_time = $5,
                weight_peer = $6,
                contribution_start = $7,
                contribution_deadline = $8,
                voting_deadline = $9,
                phase = $10
            WHERE project_id = $1
            "#,
        )
        .bind(project.project_id)
        .bind(&project.name)
        .bind(&project.repo_url)
        .bind(project.weights.code)
        .bind(project.weights.time)
        .bind(project.weights.peer)
        .bind(project.contribution_start)
        .bind(project.contribution_deadline)
        .bind(project.voting_deadline)
        .bind(project.phase.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }

        Ok(())
    }

    async fn get_project(&self, project_id: Uuid) -> StorageResult<Project> {
        let row = sqlx::query_as::<_, ProjectRow>(&format!(
            "SELECT {} FROM projects WHERE project_id = $1",
            PROJECT_COLUMNS
        ))
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StorageError::NotFound)?;

        Project::try_from(row)
    }

    async fn list_projects(&self, offset: u32, limit: u32) -> StorageResult<(Vec<Project>, i64)> {
        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM projects")
            .fetch_one(&self.pool)
            .await?;

        let mut query = QueryBuilder::<Postgres>::new(format!("SELECT {} FROM projects", PROJECT_COLUMNS));
        query.push(" ORDER BY created_at DESC, project_id ASC LIMIT ");
        query.push_bind(i64::from(limit));
        query.push(" OFFSET ");
        query.push_bind(i64::from(offset));

        let rows = query
            .build_query_as::<ProjectRow>()
            .fetch_all(&self.pool)
            .await?;

        let projects = rows
            .into_iter()
            .map(Project::try_from)
            .collect::<StorageResult<Vec<_>>>()?;

        Ok((projects, total))
    }

    async fn list_members(&self, project_id: Uuid) -> StorageResult<Vec<Member>> {
        self.ensure_project(project_id).await?;

        let rows = sqlx::query_as::<_, MemberRow>(
            r#"
            SELECT member_id, project_id, external_id, display_name,
                   avatar_url, wallet_address, role, joined_at
            FROM project_members
            WHERE project_id = $1
            ORDER BY joined_at, member_id
            "#,
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Member::try_from).collect()
    }

    async fn insert_member(&self, member: &Member) -> StorageResult<()> {
        insert_member_with(&self.pool, member).await
    }

    async fn upsert_vote(&self, vote: &Vote) -> StorageResult<Vote> {
        let stored = sqlx::query_as::<_, Vote>(
            r#"
            INSERT INTO votes (project_id, voter_id, ratee_id, score, submitted_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (project_id, voter_id, ratee_id)
            DO UPDATE SET score = EXCLUDED.score, submitted_at = EXCLUDED.submitted_at
            RETURNING project_id, voter_id, ratee_id, score, submitted_at
            "#,
        )
        .bind(vote.project_id)
        .bind(vote.voter_id)
        .bind(vote.ratee_id)
        .bind(vote.score)
        .bind(vote.submitted_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_constraint(e, || "vote conflicts with an existing row".to_string()))?;

        Ok(stored)
    }

    async fn list_votes(&self, project_id: Uuid) -> StorageResult<Vec<Vote>> {
        self.ensure_project(project_id).await?;

        let votes = sqlx::query_as::<_, Vote>(
            r#"
            SELECT project_id, voter_id, ratee_id, score, submitted_at
            FROM votes
            WHERE project_id = $1
            ORDER BY voter_id, ratee_id
            "#,
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(votes)
    }

    async fn latest_analysis(&self, project_id: Uuid) -> StorageResult<Option<AnalysisRun>> {
        self.ensure_project(project_id).await?;

        let row = sqlx::query_as::<_, AnalysisRow>(
            r#"
            SELECT run_id, project_id, version, requested_at, completed_at,
                   after_contribution_deadline, samples
            FROM analysis_runs
            WHERE project_id = $1
            "#,
        )
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(AnalysisRun::from))
    }

    async fn replace_analysis(&self, run: &AnalysisRun) -> StorageResult<bool> {
        // The WHERE clause keeps the stored run when it is at least as new.
        let result = sqlx::query(
            r#"
            INSERT INTO analysis_runs (
                project_id, run_id, version, requested_at, completed_at,
                after_contribution_deadline, samples
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (project_id) DO UPDATE
            SET run_id = EXCLUDED.run_id,
                version = EXCLUDED.version,
                requested_at = EXCLUDED.requested_at,
                completed_at = EXCLUDED.completed_at,
                after_contribution_deadline = EXCLUDED.after_contribution_deadline,
                samples = EXCLUDED.samples
            WHERE (analysis_runs.completed_at, analysis_runs.version)
                < (EXCLUDED.completed_at, EXCLUDED.version)
            "#,
        )
        .bind(run.project_id)
        .bind(run.run_id)
        .bind(run.version)
        .bind(run.requested_at)
        .bind(run.completed_at)
        .bind(run.after_contribution_deadline)
        .bind(Json(&run.samples))
        .execute(&self.pool)
        .await
        .map_err(|e| map_constraint(e, || "analysis run conflicts with an existing row".to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn finalize(
        &self,
        project_id: Uuid,
        records: &[ScoreRecord],
        commitment: &Commitment,
    ) -> StorageResult<()> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE projects SET phase = 'finalized' WHERE project_id = $1 AND phase = 'active'",
        )
        .bind(project_id)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(StorageError::ConstraintViolation(format!(
                "project {} is not active",
                project_id
            )));
        }

        for record in records {
            sqlx::query(
                r#"
                INSERT INTO score_records (
                    project_id, member_id, code_score, time_score, peer_score,
                    final_score, rank, record_hash, created_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(record.project_id)
            .bind(record.member_id)
            .bind(record.code_score)
            .bind(record.time_score)
            .bind(record.peer_score)
            .bind(record.final_score)
            .bind(record.rank)
            .bind(&record.record_hash)
            .bind(record.created_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                map_constraint(e, || format!("project {} already has final results", project_id))
            })?;
        }

        sqlx::query(
            r#"
            INSERT INTO commitments (
                project_id, hash, schema_version, created_at,
                external_reference, published_at
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(commitment.project_id)
        .bind(&commitment.hash)
        .bind(commitment.schema_version)
        .bind(commitment.created_at)
        .bind(&commitment.external_reference)
        .bind(commitment.published_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_constraint(e, || format!("project {} already has a commitment", project_id)))?;

        tx.commit().await?;
        Ok(())
    }

    async fn score_records(&self, project_id: Uuid) -> StorageResult<Vec<ScoreRecord>> {
        self.ensure_project(project_id).await?;

        let records = sqlx::query_as::<_, ScoreRecord>(
            r#"
            SELECT project_id, member_id, code_score, time_score, peer_score,
                   final_score, rank, record_hash, created_at
            FROM score_records
            WHERE project_id = $1
            ORDER BY rank
            "#,
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn commitment(&self, project_id: Uuid) -> StorageResult<Option<Commitment>> {
        self.ensure_project(project_id).await?;

        let commitment = sqlx::query_as::<_, Commitment>(
            r#"
            SELECT project_id, hash, schema_version, created_at,
                   external_reference, published_at
            FROM commitments
            WHERE project_id = $1
            "#,
        )
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(commitment)
    }

    async fn save_external_reference(&self, commitment: &Commitment) -> StorageResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE commitments
            SET external_reference = $2, published_at = $3
            WHERE project_id = $1 AND external_reference IS NULL
            "#,
        )
        .bind(commitment.project_id)
        .bind(&commitment.external_reference)
        .bind(commitment.published_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return match self.commitment(commitment.project_id).await? {
                None => Err(StorageError::NotFound),
                Some(_) => Err(StorageError::ConstraintViolation(
                    "commitment already carries an external reference".to_string(),
                )),
            };
        }

        Ok(())
    }
}
