//! Contracts for the external systems the engine calls.
//!
//! The git analysis service and the ledger publication service are reached
//! through these traits; HTTP implementations live in the `collectors` crate.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::Weights;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollaboratorFailure {
    #[error("repository unreachable: {0}")]
    RepoUnreachable(String),

    #[error("repository requires authentication: {0}")]
    AuthRequired(String),

    #[error("ledger unavailable: {0}")]
    ChainUnavailable(String),

    #[error("insufficient funds to publish: {0}")]
    InsufficientFunds(String),

    #[error("{0} timed out after {1:?}")]
    Timeout(&'static str, Duration),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub repo_url: String,
    pub since: DateTime<Utc>,
    pub until: DateTime<Utc>,
}

/// Per-author activity as reported by the git analysis service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AuthorActivity {
    /// Author identity: an identity-provider id, username or e-mail.
    pub author: String,
    pub commit_count: u32,
    pub lines_added: u64,
    pub lines_removed: u64,
    pub files_touched: u32,
    pub active_days: u32,
    #[serde(default)]
    pub commit_timestamps: Vec<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicationRequest {
    pub project_id: Uuid,
    pub commitment_hash: String,
    pub weights: Weights,
    pub contribution_deadline: DateTime<Utc>,
    pub voting_deadline: DateTime<Utc>,
}

/// Identifier handed back by the ledger, e.g. an application or transaction id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ExternalReference(pub String);

#[async_trait::async_trait]
pub trait GitAnalyzer: Send + Sync {
    async fn analyze(
        &self,
        request: &AnalysisRequest,
    ) -> Result<Vec<AuthorActivity>, CollaboratorFailure>;
}

#[async_trait::async_trait]
pub trait LedgerPublisher: Send + Sync {
    async fn publish(
        &self,
        request: &PublicationRequest,
    ) -> Result<ExternalReference, CollaboratorFailure>;
}
