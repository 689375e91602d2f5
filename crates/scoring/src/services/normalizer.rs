//! Turns raw git activity into bounded code and time scores.
//!
//! Code score: each raw dimension (commits, lines changed, files touched) is
//! scaled against the most active member on that dimension, then combined
//! with the dimension weights of [`NormalizerConfig`]. Dimensions nobody
//! touched are left out of the combination.
//!
//! Time score: `100 * (coverage / max_coverage) * consistency_factor`, where
//! `coverage = active_days / window_days` and the consistency factor punishes
//! bursty day-to-day activity and last-minute pushes.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::{Decimal, MathematicalOps};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::{GitActivitySample, Project};

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// Tunable constants of the normalizer. These are internal to the code and
/// time sub-scores and unrelated to the project's final-score weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct NormalizerConfig {
    pub commit_weight: Decimal,
    pub lines_weight: Decimal,
    pub files_weight: Decimal,
    /// Spam penalty applies above this many commits...
    pub spam_min_commits: u32,
    /// ...when the mean lines changed per commit is below this.
    pub spam_max_lines_per_commit: Decimal,
    pub spam_penalty: Decimal,
    /// Coefficient of variation of daily commit counts tolerated without penalty.
    pub cv_threshold: Decimal,
    /// Share of commits in the final 24 hours above which the burst penalty applies.
    pub last_day_share_threshold: Decimal,
    pub last_day_penalty: Decimal,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            commit_weight: Decimal::new(3, 1),
            lines_weight: Decimal::new(4, 1),
            files_weight: Decimal::new(3, 1),
            spam_min_commits: 10,
            spam_max_lines_per_commit: Decimal::from(5),
            spam_penalty: Decimal::new(7, 1),
            cv_threshold: Decimal::ONE,
            last_day_share_threshold: Decimal::new(3, 1),
            last_day_penalty: Decimal::new(7, 1),
        }
    }
}

impl NormalizerConfig {
    pub fn validate(&self) -> Result<(), String> {
        let weights = [self.commit_weight, self.lines_weight, self.files_weight];
        if weights.iter().any(|w| w.is_sign_negative()) {
            return Err("normalizer dimension weights must not be negative".to_string());
        }
        if weights.iter().all(|w| w.is_zero()) {
            return Err("at least one normalizer dimension weight must be positive".to_string());
        }
        for (name, factor) in [
            ("spam_penalty", self.spam_penalty),
            ("last_day_penalty", self.last_day_penalty),
            ("last_day_share_threshold", self.last_day_share_threshold),
        ] {
            if factor.is_sign_negative() || factor > Decimal::ONE {
                return Err(format!("{} must be between 0 and 1", name));
            }
        }
        if self.cv_threshold <= Decimal::ZERO {
            return Err("cv_threshold must be positive".to_string());
        }
        Ok(())
    }
}

/// The contribution window the time score is measured against.
#[derive(Debug, Clone, Copy)]
pub struct ContributionWindow {
    pub start: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
}

impl ContributionWindow {
    pub fn days(&self) -> i64 {
        (self.deadline - self.start).num_days().max(1)
    }
}

impl From<&Project> for ContributionWindow {
    fn from(project: &Project) -> Self {
        Self {
            start: project.contribution_start,
            deadline: project.contribution_deadline,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct NormalizedMetrics {
    pub member_id: Uuid,
    pub code_score: Decimal,
    pub time_score: Decimal,
}

/// Normalizes the samples of `members`, one result per member in the given
/// order. Members without a sample score zero; samples of non-members are
/// ignored.
pub fn normalize(
    members: &[Uuid],
    samples: &[GitActivitySample],
    window: &ContributionWindow,
    config: &NormalizerConfig,
) -> Vec<NormalizedMetrics> {
    let by_member: HashMap<Uuid, &GitActivitySample> =
        samples.iter().map(|s| (s.member_id, s)).collect();
    let relevant: Vec<GitActivitySample> = members
        .iter()
        .map(|id| {
            by_member
                .get(id)
                .map(|s| (*s).clone())
                .unwrap_or_else(|| GitActivitySample::empty(*id))
        })
        .collect();

    let max_commits = relevant.iter().map(|s| u64::from(s.commit_count)).max().unwrap_or(0);
    let max_lines = relevant.iter().map(|s| s.lines_changed()).max().unwrap_or(0);
    let max_files = relevant.iter().map(|s| u64::from(s.files_touched)).max().unwrap_or(0);

    let window_days = window.days();
    let coverages: Vec<Decimal> = relevant.iter().map(|s| coverage(s, window_days)).collect();
    let max_coverage = coverages.iter().copied().max().unwrap_or(Decimal::ZERO);

    relevant
        .iter()
        .zip(coverages)
        .map(|(sample, coverage)| {
            let code_score = code_score(sample, (max_commits, max_lines, max_files), config);
            let time_score = if max_coverage.is_zero() {
                Decimal::ZERO
            } else {
                finish(HUNDRED * coverage / max_coverage * consistency_factor(sample, window, config))
            };

            NormalizedMetrics {
                member_id: sample.member_id,
                code_score,
                time_score,
            }
        })
        .collect()
}

fn code_score(
    sample: &GitActivitySample,
    (max_commits, max_lines, max_files): (u64, u64, u64),
    config: &NormalizerConfig,
) -> Decimal {
    let dimensions = [
        (u64::from(sample.commit_count), max_commits, config.commit_weight),
        (sample.lines_changed(), max_lines, config.lines_weight),
        (u64::from(sample.files_touched), max_files, config.files_weight),
    ];

    let mut weighted = Decimal::ZERO;
    let mut total_weight = Decimal::ZERO;
    for (value, max, weight) in dimensions {
        if max == 0 {
            continue;
        }
        weighted += weight * Decimal::from(value) / Decimal::from(max);
        total_weight += weight;
    }

    if total_weight.is_zero() {
        return Decimal::ZERO;
    }

    let mut score = HUNDRED * weighted / total_weight;

    if sample.commit_count > config.spam_min_commits {
        let lines_per_commit =
            Decimal::from(sample.lines_changed()) / Decimal::from(sample.commit_count);
        if lines_per_commit < config.spam_max_lines_per_commit {
            score *= config.spam_penalty;
        }
    }

    finish(score)
}

fn coverage(sample: &GitActivitySample, window_days: i64) -> Decimal {
    let days = Decimal::from(window_days);
    Decimal::from(sample.active_days).min(days) / days
}

/// Product of the variance term and the last-minute term, in [0, 1].
/// Samples without commit timestamps get 1.
pub fn consistency_factor(
    sample: &GitActivitySample,
    window: &ContributionWindow,
    config: &NormalizerConfig,
) -> Decimal {
    if sample.commit_timestamps.is_empty() {
        return Decimal::ONE;
    }

    let mut per_day: BTreeMap<NaiveDate, u32> = BTreeMap::new();
    for ts in &sample.commit_timestamps {
        *per_day.entry(ts.date_naive()).or_default() += 1;
    }

    let mut factor = Decimal::ONE;

    if let Some(cv) = coefficient_of_variation(per_day.values().copied())
        && cv > config.cv_threshold
    {
        factor *= config.cv_threshold / cv;
    }

    let last_day_start = window.deadline - Duration::hours(24);
    let last_day_commits = sample
        .commit_timestamps
        .iter()
        .filter(|ts| **ts > last_day_start && **ts <= window.deadline)
        .count();
    let share = Decimal::from(last_day_commits) / Decimal::from(sample.commit_timestamps.len());
    if share > config.last_day_share_threshold {
        factor *= config.last_day_penalty;
    }

    factor.clamp(Decimal::ZERO, Decimal::ONE)
}

/// Population coefficient of variation; `None` for empty or all-zero input.
fn coefficient_of_variation(values: impl Iterator<Item = u32>) -> Option<Decimal> {
    let values: Vec<Decimal> = values.map(Decimal::from).collect();
    if values.is_empty() {
        return None;
    }

    let n = Decimal::from(values.len());
    let mean = values.iter().sum::<Decimal>() / n;
    if mean.is_zero() {
        return None;
    }

    let variance = values
        .iter()
        .map(|v| (*v - mean) * (*v - mean))
        .sum::<Decimal>()
        / n;

    variance.sqrt().map(|std| std / mean)
}

fn finish(score: Decimal) -> Decimal {
    score.clamp(Decimal::ZERO, HUNDRED).round_dp(2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn window() -> ContributionWindow {
        let start = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        ContributionWindow {
            start,
            deadline: start + Duration::days(10),
        }
    }

    fn steady_sample(member_id: Uuid) -> GitActivitySample {
        let start = window().start;
        let timestamps = (0..5)
            .flat_map(|day| {
                let base = start + Duration::days(day) + Duration::hours(10);
                [base, base + Duration::hours(2)]
            })
            .collect::<Vec<_>>();

        GitActivitySample {
            member_id,
            commit_count: 10,
            lines_added: 400,
            lines_removed: 100,
            files_touched: 12,
            active_days: 5,
            first_commit_at: timestamps.first().copied(),
            last_commit_at: timestamps.last().copied(),
            commit_timestamps: timestamps,
        }
    }

    #[test]
    fn test_most_active_scores_hundred_and_idle_scores_zero() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let samples = vec![steady_sample(a), GitActivitySample::empty(b)];

        let result = normalize(&[a, b], &samples, &window(), &NormalizerConfig::default());

        assert_eq!(result[0].code_score, Decimal::ONE_HUNDRED);
        assert_eq!(result[0].time_score, Decimal::ONE_HUNDRED);
        assert_eq!(result[1].code_score, Decimal::ZERO);
        assert_eq!(result[1].time_score, Decimal::ZERO);
    }

    #[test]
    fn test_no_activity_never_divides_by_zero() {
        let members = [Uuid::new_v4(), Uuid::new_v4()];
        let result = normalize(&members, &[], &window(), &NormalizerConfig::default());

        assert_eq!(result.len(), 2);
        assert!(result
            .iter()
            .all(|m| m.code_score.is_zero() && m.time_score.is_zero()));
    }

    #[test]
    fn test_untouched_dimension_is_left_out() {
        let a = Uuid::new_v4();
        let mut sample = steady_sample(a);
        sample.files_touched = 0;

        let result = normalize(&[a], &[sample], &window(), &NormalizerConfig::default());
        assert_eq!(result[0].code_score, Decimal::ONE_HUNDRED);
    }

    #[test]
    fn test_partial_activity_scales_against_maximum() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let full = steady_sample(a);
        let half = GitActivitySample {
            member_id: b,
            commit_count: 5,
            lines_added: 200,
            lines_removed: 50,
            files_touched: 6,
            ..full.clone()
        };

        let result = normalize(&[a, b], &[full, half], &window(), &NormalizerConfig::default());
        assert_eq!(result[1].code_score, Decimal::from(50));
    }

    #[test]
    fn test_commit_spam_is_penalized() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let spammer = GitActivitySample {
            member_id: a,
            commit_count: 40,
            lines_added: 40,
            lines_removed: 0,
            files_touched: 1,
            ..GitActivitySample::default()
        };
        let other = GitActivitySample {
            member_id: b,
            commit_count: 1,
            lines_added: 1,
            lines_removed: 0,
            files_touched: 1,
            ..GitActivitySample::default()
        };

        let result = normalize(&[a, b], &[spammer, other], &window(), &NormalizerConfig::default());
        assert_eq!(result[0].code_score, Decimal::from(70));
    }

    #[test]
    fn test_last_minute_burst_lowers_consistency() {
        let w = window();
        let member_id = Uuid::new_v4();
        let mut timestamps = vec![w.start + Duration::hours(3)];
        timestamps.extend((0..4).map(|i| w.deadline - Duration::hours(i + 1)));
        let sample = GitActivitySample {
            member_id,
            commit_count: 5,
            active_days: 2,
            commit_timestamps: timestamps,
            ..GitActivitySample::default()
        };

        let factor = consistency_factor(&sample, &w, &NormalizerConfig::default());
        assert!(factor < Decimal::new(7, 1) + Decimal::new(1, 2));
        assert!(factor > Decimal::ZERO);
    }

    #[test]
    fn test_even_daily_activity_has_full_consistency() {
        let sample = steady_sample(Uuid::new_v4());
        assert_eq!(
            consistency_factor(&sample, &window(), &NormalizerConfig::default()),
            Decimal::ONE
        );
    }

    #[test]
    fn test_single_active_member_normalizes_against_itself() {
        let a = Uuid::new_v4();
        let mut sample = steady_sample(a);
        sample.active_days = 2;
        sample.commit_timestamps.clear();

        let result = normalize(&[a], &[sample], &window(), &NormalizerConfig::default());
        assert_eq!(result[0].time_score, Decimal::ONE_HUNDRED);
    }

    #[test]
    fn test_samples_of_non_members_are_ignored() {
        let a = Uuid::new_v4();
        let outsider = steady_sample(Uuid::new_v4());
        let mine = GitActivitySample {
            member_id: a,
            commit_count: 1,
            lines_added: 1,
            files_touched: 1,
            active_days: 1,
            ..GitActivitySample::default()
        };

        let result = normalize(&[a], &[outsider, mine], &window(), &NormalizerConfig::default());
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].code_score, Decimal::ONE_HUNDRED);
    }

    #[test]
    fn test_config_validation() {
        assert!(NormalizerConfig::default().validate().is_ok());
        let config = NormalizerConfig {
            commit_weight: Decimal::ZERO,
            lines_weight: Decimal::ZERO,
            files_weight: Decimal::ZERO,
            ..NormalizerConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
