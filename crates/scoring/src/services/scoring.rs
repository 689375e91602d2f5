use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{Result, ScoringError};
use crate::models::{AnalysisRun, Member, Phase, Project, ScoreRecord, Vote, Weights};
use crate::services::commitment::{self, ScoreTuple};
use crate::services::normalizer::{self, ContributionWindow, NormalizerConfig};
use crate::services::vote_ledger;

/// Unranked per-member scores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct MemberScore {
    pub member_id: Uuid,
    pub code_score: Decimal,
    pub time_score: Decimal,
    pub peer_score: Decimal,
    pub final_score: Decimal,
}

/// Scores every member from the current samples and votes without any
/// lifecycle checks. Used for previews while the project is still active.
pub fn score_members(
    project: &Project,
    members: &[Member],
    analysis: Option<&AnalysisRun>,
    votes: &[Vote],
    config: &NormalizerConfig,
) -> Vec<MemberScore> {
    let member_ids: Vec<Uuid> = members.iter().map(|m| m.member_id).collect();
    let samples = analysis.map(|run| run.samples.as_slice()).unwrap_or_default();
    let window = ContributionWindow::from(project);

    normalizer::normalize(&member_ids, samples, &window, config)
        .into_iter()
        .map(|metrics| {
            let peer_score = vote_ledger::aggregate_peer_score(votes, metrics.member_id);
            let final_score = combine(
                &project.weights,
                metrics.code_score,
                metrics.time_score,
                peer_score,
            );

            MemberScore {
                member_id: metrics.member_id,
                code_score: metrics.code_score,
                time_score: metrics.time_score,
                peer_score,
                final_score,
            }
        })
        .collect()
}

/// `w_code * code + w_time * time + w_peer * peer`, rounded to hundredths.
pub fn combine(weights: &Weights, code: Decimal, time: Decimal, peer: Decimal) -> Decimal {
    (weights.code * code + weights.time * time + weights.peer * peer)
        .clamp(Decimal::ZERO, Decimal::ONE_HUNDRED)
        .round_dp(2)
}

/// Final score descending, then member id ascending.
fn ranking_order(a: &MemberScore, b: &MemberScore) -> Ordering {
    b.final_score
        .cmp(&a.final_score)
        .then_with(|| a.member_id.cmp(&b.member_id))
}

/// Sorts scores into rank order; index 0 is rank 1.
pub fn sort_by_rank(scores: &mut [MemberScore]) {
    scores.sort_by(ranking_order);
}

/// Computes the ranked score records of a project.
///
/// Only legal on an active project at or after its voting deadline; anything
/// else fails with `PrematureFinalization`. The result depends only on its
/// arguments, so the same inputs always give the same records.
pub fn compute_final_scores(
    project: &Project,
    members: &[Member],
    analysis: Option<&AnalysisRun>,
    votes: &[Vote],
    now: DateTime<Utc>,
    config: &NormalizerConfig,
) -> Result<Vec<ScoreRecord>> {
    if project.phase != Phase::Active || now < project.voting_deadline {
        return Err(ScoringError::PrematureFinalization);
    }

    let mut scores = score_members(project, members, analysis, votes, config);
    sort_by_rank(&mut scores);

    let records: Vec<ScoreRecord> = scores
        .into_iter()
        .enumerate()
        .map(|(index, score)| {
            let rank = index as u32 + 1;
            let tuple = ScoreTuple {
                code: score.code_score,
                time: score.time_score,
                peer: score.peer_score,
                final_score: score.final_score,
            };

            ScoreRecord {
                project_id: project.project_id,
                member_id: score.member_id,
                code_score: score.code_score,
                time_score: score.time_score,
                peer_score: score.peer_score,
                final_score: score.final_score,
                rank: rank as i32,
                record_hash: commitment::record_hash(project.project_id, score.member_id, tuple, rank),
                created_at: now,
            }
        })
        .collect();

    debug!(
        project_id = %project.project_id,
        members = records.len(),
        "Computed final scores"
    );

    Ok(records)
}

/// Reputation units awarded for a final score.
pub fn reputation_units(final_score: Decimal) -> u32 {
    const TIERS: [(i64, u32); 5] = [(90, 100), (80, 80), (70, 60), (60, 40), (50, 20)];

    TIERS
        .iter()
        .find(|(floor, _)| final_score >= Decimal::from(*floor))
        .map(|(_, units)| *units)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GitActivitySample, MemberRole};
    use chrono::{Duration, TimeZone};

    struct Fixture {
        project: Project,
        alice: Member,
        bob: Member,
    }

    fn member(project_id: Uuid, id: u128, name: &str) -> Member {
        Member {
            member_id: Uuid::from_u128(id),
            project_id,
            external_id: name.to_string(),
            display_name: name.to_string(),
            avatar_url: None,
            wallet_address: None,
            role: MemberRole::Member,
            joined_at: Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap(),
        }
    }

    fn fixture() -> Fixture {
        let start = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        let project_id = Uuid::from_u128(100);
        let alice = member(project_id, 1, "alice");
        let bob = member(project_id, 2, "bob");
        let project = Project {
            project_id,
            name: "capstone".to_string(),
            repo_url: Some("https://example.com/team/capstone.git".to_string()),
            weights: Weights::new(Decimal::new(4, 1), Decimal::new(3, 1), Decimal::new(3, 1)),
            contribution_start: start,
            contribution_deadline: start + Duration::days(10),
            voting_deadline: start + Duration::days(12),
            phase: Phase::Active,
            creator_id: alice.member_id,
            created_at: start,
        };
        Fixture {
            project,
            alice,
            bob,
        }
    }

    fn analysis(f: &Fixture) -> AnalysisRun {
        let start = f.project.contribution_start;
        let timestamps: Vec<_> = (0..5)
            .flat_map(|d| {
                let t = start + Duration::days(d) + Duration::hours(9);
                [t, t + Duration::hours(3)]
            })
            .collect();

        AnalysisRun {
            run_id: Uuid::from_u128(7),
            project_id: f.project.project_id,
            version: 1,
            requested_at: start + Duration::days(9),
            completed_at: start + Duration::days(9),
            after_contribution_deadline: false,
            samples: vec![
                GitActivitySample {
                    member_id: f.alice.member_id,
                    commit_count: 10,
                    lines_added: 500,
                    lines_removed: 0,
                    files_touched: 0,
                    active_days: 5,
                    first_commit_at: timestamps.first().copied(),
                    last_commit_at: timestamps.last().copied(),
                    commit_timestamps: timestamps,
                },
                GitActivitySample::empty(f.bob.member_id),
            ],
        }
    }

    fn votes(f: &Fixture) -> Vec<Vote> {
        let at = f.project.contribution_deadline;
        vec![
            Vote {
                project_id: f.project.project_id,
                voter_id: f.alice.member_id,
                ratee_id: f.bob.member_id,
                score: 5,
                submitted_at: at,
            },
            Vote {
                project_id: f.project.project_id,
                voter_id: f.bob.member_id,
                ratee_id: f.alice.member_id,
                score: 5,
                submitted_at: at,
            },
        ]
    }

    #[test]
    fn test_two_member_scenario() {
        let f = fixture();
        let members = vec![f.alice.clone(), f.bob.clone()];
        let run = analysis(&f);

        let records = compute_final_scores(
            &f.project,
            &members,
            Some(&run),
            &votes(&f),
            f.project.voting_deadline,
            &NormalizerConfig::default(),
        )
        .unwrap();

        let a = &records[0];
        assert_eq!(a.member_id, f.alice.member_id);
        assert_eq!(a.code_score, Decimal::from(100));
        assert_eq!(a.time_score, Decimal::from(100));
        assert_eq!(a.peer_score, Decimal::from(100));
        assert_eq!(a.final_score, Decimal::from(100));
        assert_eq!(a.rank, 1);

        let b = &records[1];
        assert_eq!(b.member_id, f.bob.member_id);
        assert_eq!(b.code_score, Decimal::ZERO);
        assert_eq!(b.time_score, Decimal::ZERO);
        assert_eq!(b.peer_score, Decimal::from(100));
        assert_eq!(b.final_score, Decimal::from(30));
        assert_eq!(b.rank, 2);
    }

    #[test]
    fn test_identical_inputs_give_identical_records() {
        let f = fixture();
        let members = vec![f.alice.clone(), f.bob.clone()];
        let run = analysis(&f);
        let votes = votes(&f);
        let now = f.project.voting_deadline + Duration::hours(1);
        let config = NormalizerConfig::default();

        let first = compute_final_scores(&f.project, &members, Some(&run), &votes, now, &config).unwrap();
        let reversed: Vec<Member> = members.iter().rev().cloned().collect();
        let second = compute_final_scores(&f.project, &reversed, Some(&run), &votes, now, &config).unwrap();

        assert_eq!(
            serde_json::to_vec(&first).unwrap(),
            serde_json::to_vec(&second).unwrap()
        );
    }

    #[test]
    fn test_ties_break_by_member_id() {
        let f = fixture();
        let members = vec![f.bob.clone(), f.alice.clone()];

        let records = compute_final_scores(
            &f.project,
            &members,
            None,
            &[],
            f.project.voting_deadline,
            &NormalizerConfig::default(),
        )
        .unwrap();

        assert!(records.iter().all(|r| r.final_score.is_zero()));
        assert_eq!(records[0].member_id, f.alice.member_id);
        assert_eq!(records[1].member_id, f.bob.member_id);
        assert_eq!((records[0].rank, records[1].rank), (1, 2));
    }

    #[test]
    fn test_refuses_before_voting_deadline() {
        let f = fixture();
        let err = compute_final_scores(
            &f.project,
            &[f.alice.clone()],
            None,
            &[],
            f.project.voting_deadline - Duration::seconds(1),
            &NormalizerConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ScoringError::PrematureFinalization));
    }

    #[test]
    fn test_refuses_unless_active() {
        let mut f = fixture();
        f.project.phase = Phase::Finalized;
        let err = compute_final_scores(
            &f.project,
            &[f.alice.clone()],
            None,
            &[],
            f.project.voting_deadline,
            &NormalizerConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ScoringError::PrematureFinalization));
    }

    #[test]
    fn test_reputation_tiers() {
        assert_eq!(reputation_units(Decimal::from(100)), 100);
        assert_eq!(reputation_units(Decimal::new(8999, 2)), 80);
        assert_eq!(reputation_units(Decimal::from(50)), 20);
        assert_eq!(reputation_units(Decimal::new(4999, 2)), 0);
    }
}
