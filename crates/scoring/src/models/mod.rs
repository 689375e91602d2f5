mod activity;
mod commitment;
mod member;
mod project;
mod score_record;
mod vote;

pub use activity::{AnalysisRun, GitActivitySample};
pub use commitment::Commitment;
pub use member::{Identity, Member, MemberRole, validate_wallet_address};
pub use project::{Phase, Project, Weights};
pub use score_record::ScoreRecord;
pub use vote::Vote;
