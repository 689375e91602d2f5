use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::{LifecycleViolation, Result, VoteRejection};
use crate::models::{Member, Phase, Project, Vote};

pub const MIN_SCORE: i32 = 1;
pub const MAX_SCORE: i32 = 5;

/// Checks a vote against the ledger rules and builds the vote to store.
///
/// Nothing is written here; the caller persists the returned vote with
/// replace-on-conflict semantics for the (voter, ratee) pair.
pub fn prepare_vote(
    project: &Project,
    members: &[Member],
    voter_id: Uuid,
    ratee_id: Uuid,
    score: i32,
    now: DateTime<Utc>,
) -> Result<Vote> {
    match project.phase {
        Phase::Active => {}
        Phase::Draft => return Err(LifecycleViolation::NotActive.into()),
        Phase::Finalized => return Err(LifecycleViolation::Finalized.into()),
    }

    if !members.iter().any(|m| m.member_id == voter_id) {
        return Err(VoteRejection::VoterNotMember.into());
    }
    if !members.iter().any(|m| m.member_id == ratee_id) {
        return Err(VoteRejection::RateeNotMember.into());
    }
    if voter_id == ratee_id {
        return Err(VoteRejection::SelfVote.into());
    }
    if !(MIN_SCORE..=MAX_SCORE).contains(&score) {
        return Err(VoteRejection::ScoreOutOfRange(score).into());
    }
    if now >= project.voting_deadline {
        return Err(VoteRejection::OutsideWindow.into());
    }

    Ok(Vote {
        project_id: project.project_id,
        voter_id,
        ratee_id,
        score,
        submitted_at: now,
    })
}

/// Inserts `vote` or replaces the existing vote of the same (voter, ratee) pair.
pub fn upsert(votes: &mut Vec<Vote>, vote: Vote) -> Vote {
    match votes
        .iter_mut()
        .find(|v| v.voter_id == vote.voter_id && v.ratee_id == vote.ratee_id)
    {
        Some(existing) => *existing = vote.clone(),
        None => votes.push(vote.clone()),
    }
    vote
}

/// Mean rating received by `ratee`, scaled from 1..5 to 0..100.
/// A member nobody rated gets 0.
pub fn aggregate_peer_score(votes: &[Vote], ratee: Uuid) -> Decimal {
    let received: Vec<i32> = votes
        .iter()
        .filter(|v| v.ratee_id == ratee)
        .map(|v| v.score)
        .collect();

    if received.is_empty() {
        return Decimal::ZERO;
    }

    let total: i64 = received.iter().map(|s| i64::from(*s)).sum();
    let mean = Decimal::from(total) / Decimal::from(received.len());
    let scaled = (mean - Decimal::from(MIN_SCORE)) / Decimal::from(MAX_SCORE - MIN_SCORE)
        * Decimal::ONE_HUNDRED;

    scaled
        .clamp(Decimal::ZERO, Decimal::ONE_HUNDRED)
        .round_dp(2)
}

/// Members `voter` has not rated yet, excluding the voter.
pub fn eligible_ratees<'a>(members: &'a [Member], votes: &[Vote], voter: Uuid) -> Vec<&'a Member> {
    members
        .iter()
        .filter(|m| m.member_id != voter)
        .filter(|m| {
            !votes
                .iter()
                .any(|v| v.voter_id == voter && v.ratee_id == m.member_id)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScoringError;
    use crate::models::{MemberRole, Weights};
    use chrono::Duration;

    fn member(project_id: Uuid, name: &str) -> Member {
        Member {
            member_id: Uuid::new_v4(),
            project_id,
            external_id: name.to_string(),
            display_name: name.to_string(),
            avatar_url: None,
            wallet_address: None,
            role: MemberRole::Member,
            joined_at: Utc::now(),
        }
    }

    fn fixture() -> (Project, Vec<Member>, DateTime<Utc>) {
        let now = Utc::now();
        let project_id = Uuid::new_v4();
        let members = vec![
            member(project_id, "alice"),
            member(project_id, "bob"),
            member(project_id, "carol"),
        ];
        let project = Project {
            project_id,
            name: "capstone".to_string(),
            repo_url: None,
            weights: Weights::default(),
            contribution_start: now - Duration::days(10),
            contribution_deadline: now + Duration::days(1),
            voting_deadline: now + Duration::days(2),
            phase: Phase::Active,
            creator_id: members[0].member_id,
            created_at: now - Duration::days(10),
        };
        (project, members, now)
    }

    #[test]
    fn test_valid_vote_is_prepared() {
        let (project, members, now) = fixture();
        let vote = prepare_vote(&project, &members, members[0].member_id, members[1].member_id, 4, now)
            .unwrap();
        assert_eq!(vote.score, 4);
        assert_eq!(vote.submitted_at, now);
    }

    #[test]
    fn test_self_vote_rejected() {
        let (project, members, now) = fixture();
        let id = members[0].member_id;
        let err = prepare_vote(&project, &members, id, id, 5, now).unwrap_err();
        assert!(matches!(err, ScoringError::InvalidVote(VoteRejection::SelfVote)));
    }

    #[test]
    fn test_out_of_range_scores_rejected() {
        let (project, members, now) = fixture();
        for score in [0, 6, -1] {
            let err = prepare_vote(&project, &members, members[0].member_id, members[1].member_id, score, now)
                .unwrap_err();
            assert!(matches!(
                err,
                ScoringError::InvalidVote(VoteRejection::ScoreOutOfRange(_))
            ));
        }
    }

    #[test]
    fn test_non_member_rejected() {
        let (project, members, now) = fixture();
        let err = prepare_vote(&project, &members, Uuid::new_v4(), members[1].member_id, 3, now)
            .unwrap_err();
        assert!(matches!(err, ScoringError::InvalidVote(VoteRejection::VoterNotMember)));

        let err = prepare_vote(&project, &members, members[0].member_id, Uuid::new_v4(), 3, now)
            .unwrap_err();
        assert!(matches!(err, ScoringError::InvalidVote(VoteRejection::RateeNotMember)));
    }

    #[test]
    fn test_window_closes_at_voting_deadline() {
        let (project, members, _) = fixture();
        let (a, b) = (members[0].member_id, members[1].member_id);
        let just_before = project.voting_deadline - Duration::seconds(1);
        assert!(prepare_vote(&project, &members, a, b, 3, just_before).is_ok());

        let err = prepare_vote(&project, &members, a, b, 3, project.voting_deadline).unwrap_err();
        assert!(matches!(err, ScoringError::InvalidVote(VoteRejection::OutsideWindow)));
    }

    #[test]
    fn test_vote_after_finalize_is_lifecycle_violation() {
        let (mut project, members, now) = fixture();
        project.phase = Phase::Finalized;
        let err = prepare_vote(&project, &members, members[0].member_id, members[1].member_id, 3, now)
            .unwrap_err();
        assert!(matches!(
            err,
            ScoringError::Lifecycle(LifecycleViolation::Finalized)
        ));
        assert_eq!(err.class(), crate::error::ErrorClass::FixInput);
    }

    #[test]
    fn test_resubmission_replaces_previous_vote() {
        let (project, members, now) = fixture();
        let (a, b) = (members[0].member_id, members[1].member_id);
        let mut votes = Vec::new();

        upsert(&mut votes, prepare_vote(&project, &members, a, b, 1, now).unwrap());
        upsert(&mut votes, prepare_vote(&project, &members, a, b, 5, now).unwrap());

        assert_eq!(votes.len(), 1);
        assert_eq!(aggregate_peer_score(&votes, b), Decimal::ONE_HUNDRED);
    }

    #[test]
    fn test_peer_score_scaling() {
        let (project, members, now) = fixture();
        let (a, b, c) = (members[0].member_id, members[1].member_id, members[2].member_id);
        let mut votes = Vec::new();
        upsert(&mut votes, prepare_vote(&project, &members, a, c, 2, now).unwrap());
        upsert(&mut votes, prepare_vote(&project, &members, b, c, 4, now).unwrap());

        // mean 3 => (3 - 1) / 4 * 100
        assert_eq!(aggregate_peer_score(&votes, c), Decimal::from(50));
        assert_eq!(aggregate_peer_score(&votes, a), Decimal::ZERO);
    }

    #[test]
    fn test_eligible_ratees_shrink_as_votes_arrive() {
        let (project, members, now) = fixture();
        let voter = members[0].member_id;
        let mut votes = Vec::new();
        assert_eq!(eligible_ratees(&members, &votes, voter).len(), 2);

        upsert(&mut votes, prepare_vote(&project, &members, voter, members[1].member_id, 3, now).unwrap());
        let remaining = eligible_ratees(&members, &votes, voter);
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].member_id, members[2].member_id);
    }
}
