use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::AnalysisRun;
use crate::services::scoring::MemberScore;

/// Latest stored analysis with the scores it would produce right now.
/// Preview scores are provisional until the project is finalized.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AnalysisResponse {
    pub analysis: Option<AnalysisRun>,
    pub preview: Vec<MemberScore>,
}
