use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use collectors::{CollectorError, GitServiceClient};
use scoring::collaborators::{AnalysisRequest, GitAnalyzer};
use scoring::dto::dashboard::DashboardResponse;
use scoring::models::{Member, MemberRole, ScoreRecord};
use scoring::services::commitment::{self, ScoreTuple};
use scoring::services::lifecycle::attribute_activity;
use scoring::services::normalizer::{self, ContributionWindow, NormalizerConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "contrib")]
#[command(about = "Contribution scoring tools", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Recompute the commitment of an exported dashboard and compare it.
    Verify {
        /// Dashboard JSON as returned by GET /api/projects/:id/dashboard
        file: PathBuf,

        /// Hash to compare against instead of the one in the file
        #[arg(long)]
        expected: Option<String>,
    },
    /// Run a git analysis and print the normalized scores it would give.
    Analyze {
        #[arg(long)]
        repo_url: String,

        /// Start of the contribution window (RFC 3339)
        #[arg(long)]
        since: DateTime<Utc>,

        /// Contribution deadline (RFC 3339)
        #[arg(long)]
        until: DateTime<Utc>,

        /// Member identities, comma separated
        #[arg(long, value_delimiter = ',', required = true)]
        members: Vec<String>,

        #[arg(long, env = "GIT_SERVICE_URL")]
        git_service_url: String,

        #[arg(long, env = "GIT_SERVICE_TOKEN")]
        git_service_token: Option<String>,

        #[arg(long, env = "COLLABORATOR_TIMEOUT_SECS", default_value_t = 30)]
        timeout_secs: u64,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "contrib={},collectors={},scoring={}",
                    log_level, log_level, log_level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Commands::Verify { file, expected } => {
            handle_verify(file, expected).await?;
        }
        Commands::Analyze {
            repo_url,
            since,
            until,
            members,
            git_service_url,
            git_service_token,
            timeout_secs,
        } => {
            let mut client =
                GitServiceClient::new(&git_service_url, Duration::from_secs(timeout_secs))?;
            if let Some(token) = git_service_token {
                client = client.with_token(token);
            }
            let request = AnalysisRequest {
                repo_url,
                since,
                until,
            };
            handle_analyze(&client, request, &members).await?;
        }
    }

    Ok(())
}

async fn handle_verify(file: PathBuf, expected: Option<String>) -> collectors::Result<()> {
    tracing::info!("Loading dashboard from: {}", file.display());

    let content = tokio::fs::read_to_string(&file).await?;
    let dashboard: DashboardResponse = serde_json::from_str(&content)?;
    let project = &dashboard.project;

    let commitment = dashboard.commitment.as_ref().ok_or_else(|| {
        CollectorError::VerificationError(
            "dashboard carries no commitment; the project is not finalized".to_string(),
        )
    })?;

    let records = dashboard
        .leaderboard
        .iter()
        .map(|entry| {
            entry.to_record(project, commitment).ok_or_else(|| {
                CollectorError::VerificationError(format!(
                    "leaderboard entry for {} has no record hash",
                    entry.member_id
                ))
            })
        })
        .collect::<collectors::Result<Vec<ScoreRecord>>>()?;

    let mut mismatched = 0;
    for record in &records {
        let rank = u32::try_from(record.rank).map_err(|_| {
            CollectorError::VerificationError(format!("invalid rank {}", record.rank))
        })?;
        let recomputed = commitment::record_hash(
            project.project_id,
            record.member_id,
            ScoreTuple::from(record),
            rank,
        );
        if recomputed != record.record_hash {
            mismatched += 1;
            tracing::warn!(
                "Record of {} does not match its hash (rank {})",
                record.member_id,
                record.rank
            );
        }
    }

    let expected = expected.unwrap_or_else(|| commitment.hash.clone());
    if !commitment::verify(project.project_id, &project.weights, &records, &expected) {
        return Err(CollectorError::VerificationError(format!(
            "commitment mismatch: recomputed {}, expected {}",
            commitment::commitment_hash(project.project_id, &project.weights, &records),
            expected
        )));
    }
    if mismatched > 0 {
        return Err(CollectorError::VerificationError(format!(
            "{} record hash(es) do not match",
            mismatched
        )));
    }

    tracing::info!(
        "✓ Commitment {} verified over {} records",
        expected,
        records.len()
    );
    if let Some(reference) = &commitment.external_reference {
        tracing::info!("  Published as {}", reference);
    }

    Ok(())
}

async fn handle_analyze(
    client: &dyn GitAnalyzer,
    request: AnalysisRequest,
    identities: &[String],
) -> collectors::Result<()> {
    let project_id = Uuid::new_v4();
    let now = Utc::now();
    let members: Vec<Member> = identities
        .iter()
        .map(|identity| Member {
            member_id: Uuid::new_v4(),
            project_id,
            external_id: identity.trim().to_string(),
            display_name: identity.trim().to_string(),
            avatar_url: None,
            wallet_address: None,
            role: MemberRole::Member,
            joined_at: now,
        })
        .collect();

    let activity = client.analyze(&request).await?;
    let (samples, unmatched) = attribute_activity(&members, &activity);
    for author in unmatched {
        tracing::warn!("Ignoring commits from unknown author: {}", author);
    }

    let window = ContributionWindow {
        start: request.since,
        deadline: request.until,
    };
    let member_ids: Vec<Uuid> = members.iter().map(|m| m.member_id).collect();
    let metrics = normalizer::normalize(&member_ids, &samples, &window, &NormalizerConfig::default());

    tracing::info!("Preview for {} ({} days)", request.repo_url, window.days());
    for (member, (sample, scores)) in members.iter().zip(samples.iter().zip(&metrics)) {
        tracing::info!(
            "  {:<24} commits {:>4}  lines {:>6}  days {:>3}  code {:>6}  time {:>6}",
            member.external_id,
            sample.commit_count,
            sample.lines_changed(),
            sample.active_days,
            scores.code_score,
            scores.time_score
        );
    }

    Ok(())
}
