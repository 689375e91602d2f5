use std::collections::HashMap;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{StorageError, StorageResult};
use crate::models::{AnalysisRun, Commitment, Member, Phase, Project, ScoreRecord, Vote};
use crate::repository::ProjectStore;
use crate::services::vote_ledger;

#[derive(Debug, Clone)]
struct ProjectState {
    project: Project,
    members: Vec<Member>,
    votes: Vec<Vote>,
    analysis: Option<AnalysisRun>,
    records: Vec<ScoreRecord>,
    commitment: Option<Commitment>,
}

/// Process-local store used in tests and when no database is configured.
#[derive(Debug, Default)]
pub struct MemoryStore {
    projects: RwLock<HashMap<Uuid, ProjectState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl ProjectStore for MemoryStore {
    async fn insert_project(&self, project: &Project, members: &[Member]) -> StorageResult<()> {
        let mut projects = self.projects.write().await;
        if projects.contains_key(&project.project_id) {
            return Err(StorageError::ConstraintViolation(format!(
                "project {} already exists",
                project.project_id
            )));
        }

        projects.insert(
            project.project_id,
            ProjectState {
                project: project.clone(),
                members: members.to_vec(),
                votes: Vec::new(),
                analysis: None,
                records: Vec::new(),
                commitment: None,
            },
        );
        Ok(())
    }

    async fn update_project(&self, project: &Project) -> StorageResult<()> {
        let mut projects = self.projects.write().await;
        let state = projects
            .get_mut(&project.project_id)
            .ok_or(StorageError::NotFound)?;
        state.project = project.clone();
        Ok(())
    }

    async fn get_project(&self, project_id: Uuid) -> StorageResult<Project> {
        let projects = self.projects.read().await;
        projects
            .get(&project_id)
            .map(|s| s.project.clone())
            .ok_or(StorageError::NotFound)
    }

    async fn list_projects(&self, offset: u32, limit: u32) -> StorageResult<(Vec<Project>, i64)> {
        let projects = self.projects.read().await;
        let mut all: Vec<Project> = projects.values().map(|s| s.project.clone()).collect();
        all.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.project_id.cmp(&b.project_id))
        });

        let total = all.len() as i64;
        let page = all
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();
        Ok((page, total))
    }

    async fn list_members(&self, project_id: Uuid) -> StorageResult<Vec<Member>> {
        let projects = self.projects.read().await;
        let state = projects.get(&project_id).ok_or(StorageError::NotFound)?;
        Ok(state.members.clone())
    }

    async fn insert_member(&self, member: &Member) -> StorageResult<()> {
        let mut projects = self.projects.write().await;
        let state = projects
            .get_mut(&member.project_id)
            .ok_or(StorageError::NotFound)?;

        if state
            .members
            .iter()
            .any(|m| m.external_id.eq_ignore_ascii_case(&member.external_id))
        {
            return Err(StorageError::ConstraintViolation(format!(
                "{} is already a member of this project",
                member.external_id
            )));
        }

        state.members.push(member.clone());
        Ok(())
    }

    async fn upsert_vote(&self, vote: &Vote) -> StorageResult<Vote> {
        let mut projects = self.projects.write().await;
        let state = projects
            .get_mut(&vote.project_id)
            .ok_or(StorageError::NotFound)?;
        Ok(vote_ledger::upsert(&mut state.votes, vote.clone()))
    }

    async fn list_votes(&self, project_id: Uuid) -> StorageResult<Vec<Vote>> {
        let projects = self.projects.read().await;
        let state = projects.get(&project_id).ok_or(StorageError::NotFound)?;
        Ok(state.votes.clone())
    }

    async fn latest_analysis(&self, project_id: Uuid) -> StorageResult<Option<AnalysisRun>> {
        let projects = self.projects.read().await;
        let state = projects.get(&project_id).ok_or(StorageError::NotFound)?;
        Ok(state.analysis.clone())
    }

    async fn replace_analysis(&self, run: &AnalysisRun) -> StorageResult<bool> {
        let mut projects = self.projects.write().await;
        let state = projects
            .get_mut(&run.project_id)
            .ok_or(StorageError::NotFound)?;

        match &state.analysis {
            Some(stored) if !run.supersedes(stored) => Ok(false),
            _ => {
                state.analysis = Some(run.clone());
                Ok(true)
            }
        }
    }

    async fn finalize(
        &self,
        project_id: Uuid,
        records: &[ScoreRecord],
        commitment: &Commitment,
    ) -> StorageResult<()> {
        let mut projects = self.projects.write().await;
        let state = projects.get_mut(&project_id).ok_or(StorageError::NotFound)?;

        if state.project.phase != Phase::Active {
            return Err(StorageError::ConstraintViolation(format!(
                "project {} is {}, not active",
                project_id, state.project.phase
            )));
        }
        if state.commitment.is_some() || !state.records.is_empty() {
            return Err(StorageError::ConstraintViolation(format!(
                "project {} already has final results",
                project_id
            )));
        }

        let mut ordered = records.to_vec();
        ordered.sort_by_key(|r| r.rank);
        state.records = ordered;
        state.commitment = Some(commitment.clone());
        state.project.phase = Phase::Finalized;
        Ok(())
    }

    async fn score_records(&self, project_id: Uuid) -> StorageResult<Vec<ScoreRecord>> {
        let projects = self.projects.read().await;
        let state = projects.get(&project_id).ok_or(StorageError::NotFound)?;
        Ok(state.records.clone())
    }

    async fn commitment(&self, project_id: Uuid) -> StorageResult<Option<Commitment>> {
        let projects = self.projects.read().await;
        let state = projects.get(&project_id).ok_or(StorageError::NotFound)?;
        Ok(state.commitment.clone())
    }

    async fn save_external_reference(&self, commitment: &Commitment) -> StorageResult<()> {
        let mut projects = self.projects.write().await;
        let state = projects
            .get_mut(&commitment.project_id)
            .ok_or(StorageError::NotFound)?;

        match state.commitment.as_mut() {
            None => Err(StorageError::NotFound),
            Some(stored) if stored.external_reference.is_some() => {
                Err(StorageError::ConstraintViolation(
                    "commitment already carries an external reference".to_string(),
                ))
            }
            Some(stored) => {
                stored.external_reference = commitment.external_reference.clone();
                stored.published_at = commitment.published_at;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MemberRole, Weights};
    use chrono::{Duration, Utc};

    fn project() -> (Project, Member) {
        let now = Utc::now();
        let project_id = Uuid::new_v4();
        let owner = Member {
            member_id: Uuid::new_v4(),
            project_id,
            external_id: "alice".to_string(),
            display_name: "Alice".to_string(),
            avatar_url: None,
            wallet_address: None,
            role: MemberRole::Owner,
            joined_at: now,
        };
        let project = Project {
            project_id,
            name: "capstone".to_string(),
            repo_url: None,
            weights: Weights::default(),
            contribution_start: now,
            contribution_deadline: now + Duration::days(7),
            voting_deadline: now + Duration::days(9),
            phase: Phase::Active,
            creator_id: owner.member_id,
            created_at: now,
        };
        (project, owner)
    }

    fn commitment(project_id: Uuid) -> Commitment {
        Commitment {
            project_id,
            hash: "ab".repeat(32),
            schema_version: 1,
            created_at: Utc::now(),
            external_reference: None,
            published_at: None,
        }
    }

    #[tokio::test]
    async fn test_duplicate_identity_rejected() {
        let store = MemoryStore::new();
        let (project, owner) = project();
        store.insert_project(&project, &[owner.clone()]).await.unwrap();

        let duplicate = Member {
            member_id: Uuid::new_v4(),
            external_id: "ALICE".to_string(),
            ..owner
        };
        let err = store.insert_member(&duplicate).await.unwrap_err();
        assert!(matches!(err, StorageError::ConstraintViolation(_)));
    }

    #[tokio::test]
    async fn test_finalize_only_once() {
        let store = MemoryStore::new();
        let (project, owner) = project();
        store.insert_project(&project, &[owner]).await.unwrap();

        store
            .finalize(project.project_id, &[], &commitment(project.project_id))
            .await
            .unwrap();
        assert_eq!(
            store.get_project(project.project_id).await.unwrap().phase,
            Phase::Finalized
        );

        let err = store
            .finalize(project.project_id, &[], &commitment(project.project_id))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::ConstraintViolation(_)));
    }

    #[tokio::test]
    async fn test_stale_analysis_is_not_stored() {
        let store = MemoryStore::new();
        let (project, owner) = project();
        store.insert_project(&project, &[owner]).await.unwrap();

        let now = Utc::now();
        let newer = AnalysisRun {
            run_id: Uuid::new_v4(),
            project_id: project.project_id,
            version: 2,
            requested_at: now,
            completed_at: now,
            after_contribution_deadline: false,
            samples: Vec::new(),
        };
        let older = AnalysisRun {
            run_id: Uuid::new_v4(),
            version: 1,
            completed_at: now - Duration::seconds(30),
            ..newer.clone()
        };

        assert!(store.replace_analysis(&newer).await.unwrap());
        assert!(!store.replace_analysis(&older).await.unwrap());
        assert_eq!(
            store.latest_analysis(project.project_id).await.unwrap().unwrap().run_id,
            newer.run_id
        );
    }

    #[tokio::test]
    async fn test_list_projects_paginates() {
        let store = MemoryStore::new();
        for _ in 0..3 {
            let (project, owner) = project();
            store.insert_project(&project, &[owner]).await.unwrap();
        }

        let (page, total) = store.list_projects(2, 2).await.unwrap();
        assert_eq!(total, 3);
        assert_eq!(page.len(), 1);
    }
}
