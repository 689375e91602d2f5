use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use scoring::services::normalizer::NormalizerConfig;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Without a database the server keeps its state in memory.
    pub database_url: Option<String>,
    pub api_keys: String,
    pub git_service_url: String,
    pub git_service_token: Option<String>,
    pub ledger_service_url: String,
    pub collaborator_timeout: Duration,
    pub normalizer: NormalizerConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let timeout_secs: u64 = optional_var("COLLABORATOR_TIMEOUT_SECS")?.unwrap_or(30);

        let mut normalizer = NormalizerConfig::default();
        if let Some(weight) = optional_var::<Decimal>("NORMALIZER_COMMIT_WEIGHT")? {
            normalizer.commit_weight = weight;
        }
        if let Some(weight) = optional_var::<Decimal>("NORMALIZER_LINES_WEIGHT")? {
            normalizer.lines_weight = weight;
        }
        if let Some(weight) = optional_var::<Decimal>("NORMALIZER_FILES_WEIGHT")? {
            normalizer.files_weight = weight;
        }
        if let Some(threshold) = optional_var::<Decimal>("NORMALIZER_CV_THRESHOLD")? {
            normalizer.cv_threshold = threshold;
        }

        Ok(Self {
            host: std::env::var("HOST").context("Cannot load HOST env variable")?,
            port: std::env::var("PORT")
                .context("PORT must be a number")?
                .parse()?,
            database_url: std::env::var("DATABASE_URL")
                .ok()
                .filter(|url| !url.trim().is_empty()),
            api_keys: std::env::var("API_KEYS").unwrap_or_default(),
            git_service_url: std::env::var("GIT_SERVICE_URL")
                .context("Cannot load GIT_SERVICE_URL env variable")?,
            git_service_token: std::env::var("GIT_SERVICE_TOKEN").ok(),
            ledger_service_url: std::env::var("LEDGER_SERVICE_URL")
                .context("Cannot load LEDGER_SERVICE_URL env variable")?,
            collaborator_timeout: Duration::from_secs(timeout_secs),
            normalizer,
        })
    }
}

fn optional_var<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("{} has an invalid value: {}", name, raw)),
        _ => Ok(None),
    }
}
