use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::{Commitment, Member, Project, ScoreRecord};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LeaderboardEntry {
    pub rank: i32,
    pub member_id: Uuid,
    pub display_name: String,
    pub code_score: Decimal,
    pub time_score: Decimal,
    pub peer_score: Decimal,
    pub final_score: Decimal,
    pub reputation_units: u32,
    /// Present once the project is finalized.
    pub record_hash: Option<String>,
}

impl LeaderboardEntry {
    /// Rebuilds the stored record this entry was made from.
    pub fn to_record(&self, project: &Project, commitment: &Commitment) -> Option<ScoreRecord> {
        Some(ScoreRecord {
            project_id: project.project_id,
            member_id: self.member_id,
            code_score: self.code_score,
            time_score: self.time_score,
            peer_score: self.peer_score,
            final_score: self.final_score,
            rank: self.rank,
            record_hash: self.record_hash.clone()?,
            created_at: commitment.created_at,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DashboardResponse {
    pub project: Project,
    pub members: Vec<Member>,
    /// False once the leaderboard comes from final score records.
    pub provisional: bool,
    pub leaderboard: Vec<LeaderboardEntry>,
    pub votes_cast: usize,
    pub commitment: Option<Commitment>,
}
