use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::models::{Member, Project, Weights, validate_wallet_address};

/// Request payload for creating a project. The caller becomes its owner.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateProjectRequest {
    #[validate(length(
        min = 1,
        max = 255,
        message = "Name must be between 1 and 255 characters"
    ))]
    pub name: String,

    #[validate(length(max = 2048))]
    #[validate(custom(function = "validate_repo_url"))]
    pub repo_url: Option<String>,

    /// Defaults to 0.4 / 0.3 / 0.3 (code / time / peer).
    pub weights: Option<Weights>,

    /// Defaults to the creation time.
    pub contribution_start: Option<DateTime<Utc>>,

    pub contribution_deadline: DateTime<Utc>,

    pub voting_deadline: DateTime<Utc>,

    #[validate(custom(function = "validate_wallet"))]
    pub creator_wallet_address: Option<String>,

    #[validate(nested)]
    #[serde(default)]
    pub members: Vec<NewMemberRequest>,

    /// Keep the project in draft so its rules can still be edited.
    #[serde(default)]
    pub draft: bool,
}

/// A member to enroll, identified by their identity-provider id.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct NewMemberRequest {
    #[validate(length(min = 1, max = 255))]
    pub external_id: String,

    #[validate(length(min = 1, max = 255))]
    pub display_name: String,

    #[validate(length(max = 2048))]
    pub avatar_url: Option<String>,

    #[validate(custom(function = "validate_wallet"))]
    pub wallet_address: Option<String>,
}

/// Rule changes for a draft project. Absent fields stay as they are.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateRulesRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,

    #[validate(length(max = 2048))]
    #[validate(custom(function = "validate_repo_url"))]
    pub repo_url: Option<String>,

    pub weights: Option<Weights>,

    pub contribution_start: Option<DateTime<Utc>>,

    pub contribution_deadline: Option<DateTime<Utc>>,

    pub voting_deadline: Option<DateTime<Utc>>,
}

impl UpdateRulesRequest {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.repo_url.is_none()
            && self.weights.is_none()
            && self.contribution_start.is_none()
            && self.contribution_deadline.is_none()
            && self.voting_deadline.is_none()
    }

    /// Applies the changes to `project` when the resulting rules are valid.
    /// On error the project is left as it was.
    pub fn apply(&self, project: &mut Project) -> Result<(), String> {
        let mut updated = project.clone();

        if let Some(name) = &self.name {
            updated.name = name.clone();
        }
        if let Some(repo_url) = &self.repo_url {
            updated.repo_url = Some(repo_url.clone());
        }
        if let Some(weights) = self.weights {
            weights.validate()?;
            updated.weights = weights;
        }
        if let Some(start) = self.contribution_start {
            updated.contribution_start = start;
        }
        if let Some(deadline) = self.contribution_deadline {
            updated.contribution_deadline = deadline;
        }
        if let Some(deadline) = self.voting_deadline {
            updated.voting_deadline = deadline;
        }

        Project::validate_schedule(
            updated.contribution_start,
            updated.contribution_deadline,
            updated.voting_deadline,
        )?;

        *project = updated;
        Ok(())
    }
}

/// A project together with its members.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProjectDetailResponse {
    pub project: Project,
    pub members: Vec<Member>,
}

fn validate_repo_url(url: &str) -> Result<(), validator::ValidationError> {
    let has_scheme = ["https://", "http://", "ssh://", "git@"]
        .iter()
        .any(|scheme| url.starts_with(scheme));

    if has_scheme && !url.chars().any(char::is_whitespace) {
        Ok(())
    } else {
        Err(validator::ValidationError::new("invalid_repo_url"))
    }
}

fn validate_wallet(address: &str) -> Result<(), validator::ValidationError> {
    validate_wallet_address(address).map_err(|reason| {
        let mut error = validator::ValidationError::new("invalid_wallet_address");
        error.message = Some(reason.into());
        error
    })
}
