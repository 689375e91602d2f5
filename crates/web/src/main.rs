use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use collectors::{GitServiceClient, LedgerClient};
use scoring::clock::SystemClock;
use scoring::{Database, LifecycleSettings, MemoryStore, ProjectLifecycle, ProjectStore};
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod app;
mod config;
mod error;
mod features;
mod middleware;
mod state;

use config::Config;
use features::{health, projects::handlers};
use middleware::auth::ApiKeys;
use state::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        handlers::list_projects,
        handlers::create_project,
        handlers::get_project,
        handlers::update_rules,
        handlers::activate_project,
        handlers::add_member,
        handlers::submit_vote,
        handlers::remaining_ratees,
        handlers::trigger_analysis,
        handlers::get_analysis,
        handlers::finalize_project,
        handlers::publish_commitment,
        handlers::record_reference,
        handlers::get_dashboard,
    ),
    components(
        schemas(
            scoring::dto::project::CreateProjectRequest,
            scoring::dto::project::NewMemberRequest,
            scoring::dto::project::UpdateRulesRequest,
            scoring::dto::project::ProjectDetailResponse,
            scoring::dto::vote::VoteRequest,
            scoring::dto::vote::RemainingRateesResponse,
            scoring::dto::analysis::AnalysisResponse,
            scoring::dto::finalize::FinalizeStatus,
            scoring::dto::finalize::FinalizeResponse,
            scoring::dto::finalize::ExternalReferenceRequest,
            scoring::dto::dashboard::DashboardResponse,
            scoring::dto::dashboard::LeaderboardEntry,
            scoring::dto::common::PaginationMeta,
            scoring::models::Project,
            scoring::models::Phase,
            scoring::models::Weights,
            scoring::models::Member,
            scoring::models::MemberRole,
            scoring::models::Vote,
            scoring::models::AnalysisRun,
            scoring::models::GitActivitySample,
            scoring::models::ScoreRecord,
            scoring::models::Commitment,
            scoring::services::scoring::MemberScore,
            scoring::ErrorClass,
        )
    ),
    tags(
        (name = "projects", description = "Project lifecycle endpoints"),
        (name = "votes", description = "Peer rating endpoints"),
        (name = "analysis", description = "Repository analysis endpoints"),
        (name = "finalization", description = "Final scores and their commitment"),
        (name = "health", description = "Liveness"),
    ),
    modifiers(&SecurityAddon)
)]
struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                utoipa::openapi::security::SecurityScheme::Http(
                    utoipa::openapi::security::HttpBuilder::new()
                        .scheme(utoipa::openapi::security::HttpAuthScheme::Bearer)
                        .bearer_format("API Key")
                        .build(),
                ),
            )
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("Starting contribution scoring API");

    let config = Config::from_env().context("Failed to load API configuration")?;
    tracing::info!("Configuration loaded successfully");

    let store: Arc<dyn ProjectStore> = match &config.database_url {
        Some(database_url) => {
            tracing::info!(
                "Connecting to database at: {}",
                database_url.split('@').next_back().unwrap_or("unknown")
            );
            let db = Database::new(database_url)
                .await
                .context("Failed to initialize database")?;
            tracing::info!("Database connection established");

            tracing::info!("Running database migrations");
            db.run_migrations()
                .await
                .context("Failed to run migrations")?;
            tracing::info!("Database migrations completed successfully");

            Arc::new(db.repository())
        }
        None => {
            tracing::warn!("DATABASE_URL not set, state is kept in memory only");
            Arc::new(MemoryStore::new())
        }
    };

    let mut analyzer = GitServiceClient::new(&config.git_service_url, config.collaborator_timeout)
        .context("Failed to build git analysis client")?;
    if let Some(token) = &config.git_service_token {
        analyzer = analyzer.with_token(token.clone());
    }
    let publisher = LedgerClient::new(&config.ledger_service_url, config.collaborator_timeout)
        .context("Failed to build ledger client")?;

    let lifecycle = ProjectLifecycle::new(
        store,
        Arc::new(analyzer),
        Arc::new(publisher),
        Arc::new(SystemClock),
        LifecycleSettings {
            normalizer: config.normalizer.clone(),
            collaborator_timeout: config.collaborator_timeout,
        },
    );

    let api_keys = ApiKeys::from_comma_separated(&config.api_keys);
    if api_keys.is_empty() {
        tracing::warn!("API_KEYS is empty, every mutating request will be rejected");
    }

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .max_age(Duration::from_secs(3600));

    let app = app::router(AppState::new(lifecycle), api_keys)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(cors);

    let bind_address = format!("{}:{}", config.host, config.port);
    tracing::info!("Starting server at http://{}", bind_address);
    tracing::info!(
        "Swagger UI available at http://{}/swagger-ui/",
        bind_address
    );

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", bind_address))?;
    axum::serve(listener, app).await?;

    Ok(())
}
