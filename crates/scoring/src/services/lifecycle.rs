//! Project lifecycle: `draft -> active -> finalized`.
//!
//! Every mutation of a project runs under that project's async mutex, so
//! reads and writes of one project never interleave. Collaborator calls are
//! bounded by a timeout. Git analysis runs outside the mutex and its result is
//! applied under it after re-checking the phase; ledger publication runs
//! inside it so a commitment is published at most once.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SubsecRound, Utc};
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::clock::Clock;
use crate::collaborators::{
    AnalysisRequest, AuthorActivity, CollaboratorFailure, GitAnalyzer, LedgerPublisher,
    PublicationRequest,
};
use crate::dto::analysis::AnalysisResponse;
use crate::dto::common::{PaginatedResponse, PaginationParams};
use crate::dto::dashboard::{DashboardResponse, LeaderboardEntry};
use crate::dto::finalize::{FinalizeResponse, FinalizeStatus};
use crate::dto::project::{
    CreateProjectRequest, NewMemberRequest, ProjectDetailResponse, UpdateRulesRequest,
};
use crate::dto::vote::RemainingRateesResponse;
use crate::error::{LifecycleViolation, Result, ScoringError, StorageError, VoteRejection};
use crate::models::{
    AnalysisRun, Commitment, GitActivitySample, Identity, Member, MemberRole, Phase, Project,
    Vote,
};
use crate::repository::ProjectStore;
use crate::services::normalizer::NormalizerConfig;
use crate::services::{commitment, scoring, vote_ledger};

#[derive(Debug, Clone)]
pub struct LifecycleSettings {
    pub normalizer: NormalizerConfig,
    pub collaborator_timeout: Duration,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            normalizer: NormalizerConfig::default(),
            collaborator_timeout: Duration::from_secs(30),
        }
    }
}

pub struct ProjectLifecycle {
    store: Arc<dyn ProjectStore>,
    analyzer: Arc<dyn GitAnalyzer>,
    publisher: Arc<dyn LedgerPublisher>,
    clock: Arc<dyn Clock>,
    settings: LifecycleSettings,
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

fn require_active(project: &Project) -> Result<()> {
    match project.phase {
        Phase::Active => Ok(()),
        Phase::Draft => Err(LifecycleViolation::NotActive.into()),
        Phase::Finalized => Err(LifecycleViolation::Finalized.into()),
    }
}

fn require_draft(project: &Project) -> Result<()> {
    match project.phase {
        Phase::Draft => Ok(()),
        Phase::Active => Err(LifecycleViolation::NotDraft.into()),
        Phase::Finalized => Err(LifecycleViolation::Finalized.into()),
    }
}

fn require_creator<'a>(
    project: &Project,
    members: &'a [Member],
    actor: &Identity,
) -> Result<&'a Member> {
    match actor.resolve(members) {
        Some(member) if project.is_creator(member.member_id) => Ok(member),
        _ => Err(ScoringError::Forbidden),
    }
}

fn new_member(
    project_id: Uuid,
    request: &NewMemberRequest,
    role: MemberRole,
    now: DateTime<Utc>,
) -> Member {
    Member {
        member_id: Uuid::new_v4(),
        project_id,
        external_id: request.external_id.trim().to_string(),
        display_name: request.display_name.trim().to_string(),
        avatar_url: request.avatar_url.clone(),
        wallet_address: request.wallet_address.clone(),
        role,
        joined_at: now,
    }
}

/// Folds author activity into one sample per member. Authors that match no
/// member are returned separately.
pub fn attribute_activity(
    members: &[Member],
    activity: &[AuthorActivity],
) -> (Vec<GitActivitySample>, Vec<String>) {
    let mut samples: Vec<GitActivitySample> = members
        .iter()
        .map(|m| GitActivitySample::empty(m.member_id))
        .collect();
    let mut reported_days = vec![0u32; members.len()];
    let mut unmatched = Vec::new();

    for author in activity {
        let Some(index) = members.iter().position(|m| m.matches_author(&author.author)) else {
            unmatched.push(author.author.clone());
            continue;
        };

        let sample = &mut samples[index];
        sample.commit_count = sample.commit_count.saturating_add(author.commit_count);
        sample.lines_added = sample.lines_added.saturating_add(author.lines_added);
        sample.lines_removed = sample.lines_removed.saturating_add(author.lines_removed);
        sample.files_touched = sample.files_touched.saturating_add(author.files_touched);
        sample.commit_timestamps.extend(author.commit_timestamps.iter().copied());
        reported_days[index] = reported_days[index].max(author.active_days);
    }

    for (sample, reported) in samples.iter_mut().zip(reported_days) {
        sample.commit_timestamps.sort();
        let distinct_days = sample
            .commit_timestamps
            .iter()
            .map(|t| t.date_naive())
            .collect::<BTreeSet<_>>()
            .len() as u32;

        sample.active_days = reported.max(distinct_days);
        sample.first_commit_at = sample.commit_timestamps.first().copied();
        sample.last_commit_at = sample.commit_timestamps.last().copied();
    }

    (samples, unmatched)
}

impl ProjectLifecycle {
    pub fn new(
        store: Arc<dyn ProjectStore>,
        analyzer: Arc<dyn GitAnalyzer>,
        publisher: Arc<dyn LedgerPublisher>,
        clock: Arc<dyn Clock>,
        settings: LifecycleSettings,
    ) -> Self {
        Self {
            store,
            analyzer,
            publisher,
            clock,
            settings,
            locks: DashMap::new(),
        }
    }

    /// Takes the mutex of an existing project. Unknown ids fail with
    /// `NotFound` before a lock entry is created for them.
    async fn lock_project(&self, project_id: Uuid) -> Result<OwnedMutexGuard<()>> {
        self.store.get_project(project_id).await?;
        let lock = self
            .locks
            .entry(project_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        Ok(lock.lock_owned().await)
    }

    pub async fn create_project(
        &self,
        creator: &Identity,
        request: CreateProjectRequest,
    ) -> Result<ProjectDetailResponse> {
        request.validate()?;

        let now = self.clock.now();
        let weights = request.weights.unwrap_or_default();
        weights.validate().map_err(ScoringError::Validation)?;

        let contribution_start = request.contribution_start.unwrap_or(now);
        Project::validate_schedule(
            contribution_start,
            request.contribution_deadline,
            request.voting_deadline,
        )
        .map_err(ScoringError::Validation)?;

        let project_id = Uuid::new_v4();
        let owner_request = NewMemberRequest {
            external_id: creator.external_id.clone(),
            display_name: creator.display_name.clone(),
            avatar_url: creator.avatar_url.clone(),
            wallet_address: request.creator_wallet_address.clone(),
        };
        owner_request.validate()?;

        let mut members = vec![new_member(project_id, &owner_request, MemberRole::Owner, now)];
        for invited in &request.members {
            if members
                .iter()
                .any(|m| m.external_id.eq_ignore_ascii_case(invited.external_id.trim()))
            {
                return Err(ScoringError::Validation(format!(
                    "{} is listed more than once",
                    invited.external_id
                )));
            }
            members.push(new_member(project_id, invited, MemberRole::Member, now));
        }

        let project = Project {
            project_id,
            name: request.name.trim().to_string(),
            repo_url: request.repo_url.clone(),
            weights,
            contribution_start,
            contribution_deadline: request.contribution_deadline,
            voting_deadline: request.voting_deadline,
            phase: if request.draft { Phase::Draft } else { Phase::Active },
            creator_id: members[0].member_id,
            created_at: now,
        };

        self.store.insert_project(&project, &members).await?;

        info!(
            project_id = %project.project_id,
            phase = %project.phase,
            members = members.len(),
            "Project created"
        );

        Ok(ProjectDetailResponse { project, members })
    }

    pub async fn get_project(&self, project_id: Uuid) -> Result<ProjectDetailResponse> {
        let project = self.store.get_project(project_id).await?;
        let members = self.store.list_members(project_id).await?;
        Ok(ProjectDetailResponse { project, members })
    }

    pub async fn list_projects(
        &self,
        params: &PaginationParams,
    ) -> Result<PaginatedResponse<Project>> {
        params.validate()?;
        let (projects, total) = self
            .store
            .list_projects(params.offset(), params.limit())
            .await?;
        Ok(PaginatedResponse::new(projects, params, total))
    }

    /// Changes the rules of a draft project. Creator only.
    pub async fn update_rules(
        &self,
        project_id: Uuid,
        actor: &Identity,
        update: UpdateRulesRequest,
    ) -> Result<Project> {
        update.validate()?;
        if update.is_empty() {
            return Err(ScoringError::Validation("no rule changes given".to_string()));
        }

        let _guard = self.lock_project(project_id).await?;

        let mut project = self.store.get_project(project_id).await?;
        let members = self.store.list_members(project_id).await?;
        require_creator(&project, &members, actor)?;
        require_draft(&project)?;

        update.apply(&mut project).map_err(ScoringError::Validation)?;
        self.store.update_project(&project).await?;

        info!(project_id = %project_id, "Project rules updated");
        Ok(project)
    }

    /// Moves a draft project to active. Creator only.
    pub async fn activate(&self, project_id: Uuid, actor: &Identity) -> Result<Project> {
        let _guard = self.lock_project(project_id).await?;

        let mut project = self.store.get_project(project_id).await?;
        let members = self.store.list_members(project_id).await?;
        require_creator(&project, &members, actor)?;
        require_draft(&project)?;

        project.phase = Phase::Active;
        self.store.update_project(&project).await?;

        info!(project_id = %project_id, "Project activated");
        Ok(project)
    }

    /// Enrolls a member before the contribution deadline. Creator only.
    pub async fn add_member(
        &self,
        project_id: Uuid,
        actor: &Identity,
        request: NewMemberRequest,
    ) -> Result<Member> {
        request.validate()?;

        let _guard = self.lock_project(project_id).await?;

        let project = self.store.get_project(project_id).await?;
        let members = self.store.list_members(project_id).await?;
        require_creator(&project, &members, actor)?;
        if project.phase == Phase::Finalized {
            return Err(LifecycleViolation::Finalized.into());
        }

        let now = self.clock.now();
        if now >= project.contribution_deadline {
            return Err(LifecycleViolation::MembershipClosed.into());
        }

        if members
            .iter()
            .any(|m| m.external_id.eq_ignore_ascii_case(request.external_id.trim()))
        {
            return Err(ScoringError::Validation(format!(
                "{} is already a member of this project",
                request.external_id
            )));
        }

        let member = new_member(project_id, &request, MemberRole::Member, now);
        self.store.insert_member(&member).await?;

        info!(project_id = %project_id, member_id = %member.member_id, "Member added");
        Ok(member)
    }

    /// Records the caller's rating of a teammate, replacing an earlier one.
    pub async fn submit_vote(
        &self,
        project_id: Uuid,
        voter: &Identity,
        ratee_id: Uuid,
        score: i32,
    ) -> Result<Vote> {
        let _guard = self.lock_project(project_id).await?;

        let project = self.store.get_project(project_id).await?;
        let members = self.store.list_members(project_id).await?;
        // Phase errors take precedence over membership errors.
        require_active(&project)?;
        let voter_id = voter
            .resolve(&members)
            .map(|m| m.member_id)
            .ok_or(VoteRejection::VoterNotMember)?;

        let vote = vote_ledger::prepare_vote(
            &project,
            &members,
            voter_id,
            ratee_id,
            score,
            self.clock.now(),
        )?;
        let stored = self.store.upsert_vote(&vote).await?;

        debug!(project_id = %project_id, voter_id = %voter_id, ratee_id = %ratee_id, "Vote recorded");
        Ok(stored)
    }

    pub async fn eligible_ratees(
        &self,
        project_id: Uuid,
        voter: &Identity,
    ) -> Result<RemainingRateesResponse> {
        self.store.get_project(project_id).await?;
        let members = self.store.list_members(project_id).await?;
        let voter_id = voter
            .resolve(&members)
            .map(|m| m.member_id)
            .ok_or(VoteRejection::VoterNotMember)?;
        let votes = self.store.list_votes(project_id).await?;

        let ratees = vote_ledger::eligible_ratees(&members, &votes, voter_id)
            .into_iter()
            .cloned()
            .collect();

        Ok(RemainingRateesResponse { voter_id, ratees })
    }

    /// Runs a fresh analysis of the project repository and stores it when it
    /// is newer than the stored run. A failed analysis changes nothing.
    pub async fn request_analysis(&self, project_id: Uuid) -> Result<AnalysisRun> {
        let project = self.store.get_project(project_id).await?;
        require_active(&project)?;
        let repo_url = project
            .repo_url
            .clone()
            .ok_or(LifecycleViolation::NoRepository)?;

        let requested_at = self.clock.now();
        let request = AnalysisRequest {
            repo_url,
            since: project.contribution_start,
            until: project.contribution_deadline,
        };

        let activity = match tokio::time::timeout(
            self.settings.collaborator_timeout,
            self.analyzer.analyze(&request),
        )
        .await
        {
            Ok(Ok(activity)) => activity,
            Ok(Err(failure)) => {
                warn!(project_id = %project_id, error = %failure, "Git analysis failed");
                return Err(failure.into());
            }
            Err(_) => {
                warn!(project_id = %project_id, "Git analysis timed out");
                return Err(CollaboratorFailure::Timeout(
                    "git analysis",
                    self.settings.collaborator_timeout,
                )
                .into());
            }
        };

        let _guard = self.lock_project(project_id).await?;

        let project = self.store.get_project(project_id).await?;
        require_active(&project)?;
        let members = self.store.list_members(project_id).await?;

        let (samples, unmatched) = attribute_activity(&members, &activity);
        for author in &unmatched {
            warn!(project_id = %project_id, author = %author, "Ignoring commits from non-member author");
        }

        let previous = self.store.latest_analysis(project_id).await?;
        let run = AnalysisRun {
            run_id: Uuid::new_v4(),
            project_id,
            version: previous.as_ref().map_or(1, |p| p.version + 1),
            requested_at,
            completed_at: self.clock.now(),
            after_contribution_deadline: requested_at >= project.contribution_deadline,
            samples,
        };

        if self.store.replace_analysis(&run).await? {
            info!(project_id = %project_id, version = run.version, "Analysis stored");
            Ok(run)
        } else {
            debug!(project_id = %project_id, "Stored analysis is newer, keeping it");
            self.store
                .latest_analysis(project_id)
                .await?
                .ok_or(ScoringError::NotFound)
        }
    }

    /// Latest analysis with provisional scores.
    pub async fn analysis_preview(&self, project_id: Uuid) -> Result<AnalysisResponse> {
        let project = self.store.get_project(project_id).await?;
        let members = self.store.list_members(project_id).await?;
        let analysis = self.store.latest_analysis(project_id).await?;
        let votes = self.store.list_votes(project_id).await?;

        let mut preview = scoring::score_members(
            &project,
            &members,
            analysis.as_ref(),
            &votes,
            &self.settings.normalizer,
        );
        scoring::sort_by_rank(&mut preview);

        Ok(AnalysisResponse { analysis, preview })
    }

    /// Finalizes the project once its voting deadline has passed. Creator only.
    ///
    /// Repeating the request after success returns the stored results with
    /// `AlreadyFinalized`; they are never recomputed.
    pub async fn request_finalize(
        &self,
        project_id: Uuid,
        actor: &Identity,
    ) -> Result<FinalizeResponse> {
        let _guard = self.lock_project(project_id).await?;

        let project = self.store.get_project(project_id).await?;
        if project.phase == Phase::Finalized {
            let records = self.store.score_records(project_id).await?;
            let commitment = self
                .store
                .commitment(project_id)
                .await?
                .ok_or(ScoringError::NoCommitment)?;

            debug!(project_id = %project_id, "Finalize repeated, returning stored results");
            return Ok(FinalizeResponse {
                status: FinalizeStatus::AlreadyFinalized,
                commitment,
                records,
            });
        }

        let members = self.store.list_members(project_id).await?;
        require_creator(&project, &members, actor)?;
        require_active(&project)?;

        // Stored timestamps keep microseconds, so the replayed results match.
        let now = self.clock.now().trunc_subsecs(6);
        if now < project.voting_deadline {
            return Err(LifecycleViolation::FinalizeBeforeDeadline.into());
        }
        if members.is_empty() {
            return Err(LifecycleViolation::NoMembers.into());
        }

        let analysis = self.store.latest_analysis(project_id).await?;
        let votes = self.store.list_votes(project_id).await?;

        let records = scoring::compute_final_scores(
            &project,
            &members,
            analysis.as_ref(),
            &votes,
            now,
            &self.settings.normalizer,
        )?;
        let existing = self.store.commitment(project_id).await?;
        let commitment = commitment::commit(existing.as_ref(), &project, &records, now)?;

        self.store
            .finalize(project_id, &records, &commitment)
            .await
            .map_err(|error| match error {
                StorageError::ConstraintViolation(_) => LifecycleViolation::AlreadyFinalized.into(),
                other => ScoringError::from(other),
            })?;

        info!(
            project_id = %project_id,
            members = records.len(),
            commitment = %commitment.hash,
            "Project finalized"
        );

        Ok(FinalizeResponse {
            status: FinalizeStatus::Finalized,
            commitment,
            records,
        })
    }

    /// Publishes the commitment to the ledger and records the returned
    /// reference. Once a reference exists, it is returned without publishing.
    ///
    /// The ledger call runs under the project mutex so that concurrent
    /// requests publish at most once.
    pub async fn publish_commitment(&self, project_id: Uuid) -> Result<Commitment> {
        let _guard = self.lock_project(project_id).await?;

        let project = self.store.get_project(project_id).await?;
        let existing = self
            .store
            .commitment(project_id)
            .await?
            .ok_or(ScoringError::NoCommitment)?;
        if existing.is_published() {
            debug!(project_id = %project_id, "Commitment already published");
            return Ok(existing);
        }

        let request = PublicationRequest {
            project_id,
            commitment_hash: existing.hash.clone(),
            weights: project.weights,
            contribution_deadline: project.contribution_deadline,
            voting_deadline: project.voting_deadline,
        };

        let reference = match tokio::time::timeout(
            self.settings.collaborator_timeout,
            self.publisher.publish(&request),
        )
        .await
        {
            Ok(Ok(reference)) => reference,
            Ok(Err(failure)) => {
                warn!(project_id = %project_id, error = %failure, "Commitment publication failed");
                return Err(failure.into());
            }
            Err(_) => {
                warn!(project_id = %project_id, "Commitment publication timed out");
                return Err(CollaboratorFailure::Timeout(
                    "ledger publication",
                    self.settings.collaborator_timeout,
                )
                .into());
            }
        };

        self.record_reference_locked(Some(existing), &reference.0).await
    }

    /// Attaches an external reference obtained out of band.
    pub async fn record_external_reference(
        &self,
        project_id: Uuid,
        reference: &str,
    ) -> Result<Commitment> {
        let _guard = self.lock_project(project_id).await?;

        let current = self.store.commitment(project_id).await?;
        self.record_reference_locked(current, reference).await
    }

    async fn record_reference_locked(
        &self,
        current: Option<Commitment>,
        reference: &str,
    ) -> Result<Commitment> {
        let already = current
            .as_ref()
            .and_then(|c| c.external_reference.clone());
        let updated = commitment::record_external_reference(current, reference, self.clock.now())?;

        if already.is_none() {
            self.store.save_external_reference(&updated).await?;
            info!(
                project_id = %updated.project_id,
                reference = updated.external_reference.as_deref().unwrap_or_default(),
                "Commitment published"
            );
        }

        Ok(updated)
    }

    pub async fn dashboard(&self, project_id: Uuid) -> Result<DashboardResponse> {
        let project = self.store.get_project(project_id).await?;
        let members = self.store.list_members(project_id).await?;
        let votes = self.store.list_votes(project_id).await?;
        let commitment = self.store.commitment(project_id).await?;

        let display_name = |member_id: Uuid| {
            members
                .iter()
                .find(|m| m.member_id == member_id)
                .map(|m| m.display_name.clone())
                .unwrap_or_default()
        };

        let provisional = project.phase != Phase::Finalized;
        let leaderboard = if provisional {
            let analysis = self.store.latest_analysis(project_id).await?;
            let mut scores = scoring::score_members(
                &project,
                &members,
                analysis.as_ref(),
                &votes,
                &self.settings.normalizer,
            );
            scoring::sort_by_rank(&mut scores);

            scores
                .into_iter()
                .enumerate()
                .map(|(index, score)| LeaderboardEntry {
                    rank: index as i32 + 1,
                    member_id: score.member_id,
                    display_name: display_name(score.member_id),
                    code_score: score.code_score,
                    time_score: score.time_score,
                    peer_score: score.peer_score,
                    final_score: score.final_score,
                    reputation_units: scoring::reputation_units(score.final_score),
                    record_hash: None,
                })
                .collect()
        } else {
            self.store
                .score_records(project_id)
                .await?
                .into_iter()
                .map(|record| LeaderboardEntry {
                    rank: record.rank,
                    member_id: record.member_id,
                    display_name: display_name(record.member_id),
                    code_score: record.code_score,
                    time_score: record.time_score,
                    peer_score: record.peer_score,
                    final_score: record.final_score,
                    reputation_units: scoring::reputation_units(record.final_score),
                    record_hash: Some(record.record_hash),
                })
                .collect()
        };

        Ok(DashboardResponse {
            project,
            members,
            provisional,
            leaderboard,
            votes_cast: votes.len(),
            commitment,
        })
    }
}
