//! Write-once commitment over a project's final scores.
//!
//! Canonical encoding, schema version 1. All integers are big-endian, all
//! decimals are fixed point with half-even rounding:
//!
//! ```text
//! commitment = "CONTRIB-COMMITMENT" 0x00
//!              u8  schema_version
//!              16  project_id
//!              i64 weight_code, weight_time, weight_peer   (millionths)
//!              u32 record_count
//!              per record, by member_id bytes ascending:
//!                  16  member_id
//!                  i64 code, time, peer, final             (hundredths)
//!
//! record     = "CONTRIB-RECORD" 0x00
//!              u8  schema_version
//!              16  project_id
//!              16  member_id
//!              i64 code, time, peer, final                 (hundredths)
//!              u32 rank
//! ```
//!
//! Hashes are lowercase hex SHA-256 of these byte strings.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{Result, ScoringError};
use crate::models::{Commitment, Project, ScoreRecord, Weights};

pub const SCHEMA_VERSION: u8 = 1;

const COMMITMENT_DOMAIN: &[u8] = b"CONTRIB-COMMITMENT";
const RECORD_DOMAIN: &[u8] = b"CONTRIB-RECORD";
const WEIGHT_SCALE: u32 = 6;
const SCORE_SCALE: u32 = 2;

/// Score fields of a record, in encoding order.
#[derive(Debug, Clone, Copy)]
pub struct ScoreTuple {
    pub code: Decimal,
    pub time: Decimal,
    pub peer: Decimal,
    pub final_score: Decimal,
}

impl From<&ScoreRecord> for ScoreTuple {
    fn from(record: &ScoreRecord) -> Self {
        Self {
            code: record.code_score,
            time: record.time_score,
            peer: record.peer_score,
            final_score: record.final_score,
        }
    }
}

fn fixed_point(value: Decimal, scale: u32) -> i64 {
    let scaled = (value * Decimal::from(10_i64.pow(scale)))
        .round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven);
    scaled.to_i64().unwrap_or(if scaled.is_sign_negative() {
        i64::MIN
    } else {
        i64::MAX
    })
}

fn push_scores(buf: &mut Vec<u8>, scores: ScoreTuple) {
    for value in [scores.code, scores.time, scores.peer, scores.final_score] {
        buf.extend_from_slice(&fixed_point(value, SCORE_SCALE).to_be_bytes());
    }
}

pub fn record_preimage(project_id: Uuid, member_id: Uuid, scores: ScoreTuple, rank: u32) -> Vec<u8> {
    let mut buf = Vec::with_capacity(RECORD_DOMAIN.len() + 1 + 1 + 16 + 16 + 32 + 4);
    buf.extend_from_slice(RECORD_DOMAIN);
    buf.push(0);
    buf.push(SCHEMA_VERSION);
    buf.extend_from_slice(project_id.as_bytes());
    buf.extend_from_slice(member_id.as_bytes());
    push_scores(&mut buf, scores);
    buf.extend_from_slice(&rank.to_be_bytes());
    buf
}

pub fn record_hash(project_id: Uuid, member_id: Uuid, scores: ScoreTuple, rank: u32) -> String {
    hex::encode(Sha256::digest(record_preimage(project_id, member_id, scores, rank)))
}

pub fn commitment_preimage(project_id: Uuid, weights: &Weights, records: &[ScoreRecord]) -> Vec<u8> {
    let mut ordered: Vec<&ScoreRecord> = records.iter().collect();
    ordered.sort_by(|a, b| a.member_id.as_bytes().cmp(b.member_id.as_bytes()));

    let mut buf = Vec::with_capacity(COMMITMENT_DOMAIN.len() + 46 + ordered.len() * 48);
    buf.extend_from_slice(COMMITMENT_DOMAIN);
    buf.push(0);
    buf.push(SCHEMA_VERSION);
    buf.extend_from_slice(project_id.as_bytes());
    for weight in [weights.code, weights.time, weights.peer] {
        buf.extend_from_slice(&fixed_point(weight, WEIGHT_SCALE).to_be_bytes());
    }
    buf.extend_from_slice(&(ordered.len() as u32).to_be_bytes());
    for record in ordered {
        buf.extend_from_slice(record.member_id.as_bytes());
        push_scores(&mut buf, ScoreTuple::from(record));
    }
    buf
}

pub fn commitment_hash(project_id: Uuid, weights: &Weights, records: &[ScoreRecord]) -> String {
    hex::encode(Sha256::digest(commitment_preimage(project_id, weights, records)))
}

/// Creates the project's commitment. Fails with `CommitmentExists`, carrying
/// the original hash, when one was already made.
pub fn commit(
    existing: Option<&Commitment>,
    project: &Project,
    records: &[ScoreRecord],
    now: DateTime<Utc>,
) -> Result<Commitment> {
    if let Some(commitment) = existing {
        return Err(ScoringError::CommitmentExists(commitment.hash.clone()));
    }

    Ok(Commitment {
        project_id: project.project_id,
        hash: commitment_hash(project.project_id, &project.weights, records),
        schema_version: i16::from(SCHEMA_VERSION),
        created_at: now,
        external_reference: None,
        published_at: None,
    })
}

/// Attaches the ledger's reference to an existing commitment. Recording the
/// same reference twice is a no-op; a different one is refused.
pub fn record_external_reference(
    existing: Option<Commitment>,
    reference: &str,
    now: DateTime<Utc>,
) -> Result<Commitment> {
    let mut commitment = existing.ok_or(ScoringError::NoCommitment)?;
    let reference = reference.trim();
    if reference.is_empty() {
        return Err(ScoringError::Validation(
            "external reference must not be empty".to_string(),
        ));
    }

    match &commitment.external_reference {
        Some(stored) if stored == reference => Ok(commitment),
        Some(stored) => Err(ScoringError::ReferenceExists(stored.clone())),
        None => {
            commitment.external_reference = Some(reference.to_string());
            commitment.published_at = Some(now);
            Ok(commitment)
        }
    }
}

/// Recomputes the commitment hash from published results.
pub fn verify(project_id: Uuid, weights: &Weights, records: &[ScoreRecord], expected: &str) -> bool {
    commitment_hash(project_id, weights, records).eq_ignore_ascii_case(expected.trim())
}
