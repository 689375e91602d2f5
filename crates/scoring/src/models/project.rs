use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Lifecycle phase. Transitions only move forward: draft, active, finalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Draft,
    Active,
    Finalized,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::Finalized => "finalized",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "active" => Ok(Self::Active),
            "finalized" => Ok(Self::Finalized),
            other => Err(format!("unknown project phase '{}'", other)),
        }
    }
}

/// Coefficients of the final-score convex combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Weights {
    pub code: Decimal,
    pub time: Decimal,
    pub peer: Decimal,
}

impl Weights {
    /// Allowed distance of the weight sum from 1.
    pub fn tolerance() -> Decimal {
        Decimal::new(1, 6)
    }

    pub fn new(code: Decimal, time: Decimal, peer: Decimal) -> Self {
        Self { code, time, peer }
    }

    pub fn sum(&self) -> Decimal {
        self.code + self.time + self.peer
    }

    pub fn validate(&self) -> Result<(), String> {
        for (name, value) in [("code", self.code), ("time", self.time), ("peer", self.peer)] {
            if value.is_sign_negative() || value > Decimal::ONE {
                return Err(format!("{} weight must be between 0 and 1, got {}", name, value));
            }
        }

        if (self.sum() - Decimal::ONE).abs() > Self::tolerance() {
            return Err(format!("weights must sum to 1.0, got {}", self.sum()));
        }

        Ok(())
    }
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            code: Decimal::new(4, 1),
            time: Decimal::new(3, 1),
            peer: Decimal::new(3, 1),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Project {
    pub project_id: Uuid,
    pub name: String,
    pub repo_url: Option<String>,
    pub weights: Weights,
    pub contribution_start: DateTime<Utc>,
    pub contribution_deadline: DateTime<Utc>,
    pub voting_deadline: DateTime<Utc>,
    pub phase: Phase,
    pub creator_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl Project {
    pub fn validate_schedule(
        contribution_start: DateTime<Utc>,
        contribution_deadline: DateTime<Utc>,
        voting_deadline: DateTime<Utc>,
    ) -> Result<(), String> {
        if contribution_deadline <= contribution_start {
            return Err("contribution_deadline must be after the contribution start".to_string());
        }
        if voting_deadline <= contribution_deadline {
            return Err("voting_deadline must be strictly after contribution_deadline".to_string());
        }
        Ok(())
    }

    pub fn is_creator(&self, member_id: Uuid) -> bool {
        self.creator_id == member_id
    }
}
