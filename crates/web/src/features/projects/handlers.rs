use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use scoring::{
    dto::{
        analysis::AnalysisResponse,
        common::{PaginatedResponse, PaginationParams},
        dashboard::DashboardResponse,
        finalize::{ExternalReferenceRequest, FinalizeResponse},
        project::{
            CreateProjectRequest, NewMemberRequest, ProjectDetailResponse, UpdateRulesRequest,
        },
        vote::{RemainingRateesResponse, VoteRequest},
    },
    models::{AnalysisRun, Commitment, Member, Project, Vote},
};
use uuid::Uuid;
use validator::Validate;

use crate::error::WebError;
use crate::middleware::auth::Caller;
use crate::state::AppState;

#[utoipa::path(
    get,
    path = "/api/projects",
    params(PaginationParams),
    responses(
        (status = 200, description = "Projects, newest first", body = PaginatedResponse<Project>),
        (status = 400, description = "Invalid pagination parameters")
    ),
    tag = "projects"
)]
pub async fn list_projects(
    State(state): State<AppState>,
    Query(params): Query<PaginationParams>,
) -> Result<Response, WebError> {
    params.validate()?;
    let projects = state.lifecycle.list_projects(&params).await?;

    Ok(Json(projects).into_response())
}

#[utoipa::path(
    post,
    path = "/api/projects",
    request_body = CreateProjectRequest,
    responses(
        (status = 201, description = "Project created; the caller is its owner", body = ProjectDetailResponse),
        (status = 400, description = "Invalid rules or members"),
        (status = 401, description = "Missing API key or caller identity")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "projects"
)]
pub async fn create_project(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Json(payload): Json<CreateProjectRequest>,
) -> Result<Response, WebError> {
    payload.validate()?;
    let created = state.lifecycle.create_project(&caller, payload).await?;

    Ok((StatusCode::CREATED, Json(created)).into_response())
}

#[utoipa::path(
    get,
    path = "/api/projects/{id}",
    params(
        ("id" = Uuid, Path, description = "Project id")
    ),
    responses(
        (status = 200, description = "Project with its members", body = ProjectDetailResponse),
        (status = 404, description = "Project not found")
    ),
    tag = "projects"
)]
pub async fn get_project(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, WebError> {
    let project = state.lifecycle.get_project(id).await?;

    Ok(Json(project).into_response())
}

#[utoipa::path(
    put,
    path = "/api/projects/{id}/rules",
    params(
        ("id" = Uuid, Path, description = "Project id")
    ),
    request_body = UpdateRulesRequest,
    responses(
        (status = 200, description = "Rules updated", body = Project),
        (status = 400, description = "Invalid rules"),
        (status = 403, description = "Caller is not the project creator"),
        (status = 409, description = "Project is no longer a draft")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "projects"
)]
pub async fn update_rules(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Caller(caller): Caller,
    Json(payload): Json<UpdateRulesRequest>,
) -> Result<Response, WebError> {
    payload.validate()?;
    let project = state.lifecycle.update_rules(id, &caller, payload).await?;

    Ok(Json(project).into_response())
}

#[utoipa::path(
    post,
    path = "/api/projects/{id}/activate",
    params(
        ("id" = Uuid, Path, description = "Project id")
    ),
    responses(
        (status = 200, description = "Project is active", body = Project),
        (status = 403, description = "Caller is not the project creator"),
        (status = 409, description = "Project is not a draft")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "projects"
)]
pub async fn activate_project(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Caller(caller): Caller,
) -> Result<Response, WebError> {
    let project = state.lifecycle.activate(id, &caller).await?;

    Ok(Json(project).into_response())
}

#[utoipa::path(
    post,
    path = "/api/projects/{id}/members",
    params(
        ("id" = Uuid, Path, description = "Project id")
    ),
    request_body = NewMemberRequest,
    responses(
        (status = 201, description = "Member added", body = Member),
        (status = 400, description = "Invalid or duplicate member"),
        (status = 403, description = "Caller is not the project creator"),
        (status = 409, description = "Membership is closed")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "projects"
)]
pub async fn add_member(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Caller(caller): Caller,
    Json(payload): Json<NewMemberRequest>,
) -> Result<Response, WebError> {
    payload.validate()?;
    let member = state.lifecycle.add_member(id, &caller, payload).await?;

    Ok((StatusCode::CREATED, Json(member)).into_response())
}

#[utoipa::path(
    post,
    path = "/api/projects/{id}/votes",
    params(
        ("id" = Uuid, Path, description = "Project id")
    ),
    request_body = VoteRequest,
    responses(
        (status = 200, description = "Vote recorded, replacing any earlier one", body = Vote),
        (status = 409, description = "Project is not accepting votes"),
        (status = 422, description = "Vote rejected")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "votes"
)]
pub async fn submit_vote(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Caller(caller): Caller,
    Json(payload): Json<VoteRequest>,
) -> Result<Response, WebError> {
    let vote = state
        .lifecycle
        .submit_vote(id, &caller, payload.ratee_id, payload.score)
        .await?;

    Ok(Json(vote).into_response())
}

#[utoipa::path(
    get,
    path = "/api/projects/{id}/votes/remaining",
    params(
        ("id" = Uuid, Path, description = "Project id")
    ),
    responses(
        (status = 200, description = "Teammates the caller has not rated", body = RemainingRateesResponse),
        (status = 422, description = "Caller is not a member")
    ),
    tag = "votes"
)]
pub async fn remaining_ratees(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Caller(caller): Caller,
) -> Result<Response, WebError> {
    let remaining = state.lifecycle.eligible_ratees(id, &caller).await?;

    Ok(Json(remaining).into_response())
}

#[utoipa::path(
    post,
    path = "/api/projects/{id}/analysis",
    params(
        ("id" = Uuid, Path, description = "Project id")
    ),
    responses(
        (status = 200, description = "Latest stored analysis", body = AnalysisRun),
        (status = 409, description = "Project cannot be analyzed"),
        (status = 502, description = "Repository unreachable"),
        (status = 504, description = "Analysis timed out")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "analysis"
)]
pub async fn trigger_analysis(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, WebError> {
    let run = state.lifecycle.request_analysis(id).await?;

    Ok(Json(run).into_response())
}

#[utoipa::path(
    get,
    path = "/api/projects/{id}/analysis",
    params(
        ("id" = Uuid, Path, description = "Project id")
    ),
    responses(
        (status = 200, description = "Latest analysis with provisional scores", body = AnalysisResponse),
        (status = 404, description = "Project not found")
    ),
    tag = "analysis"
)]
pub async fn get_analysis(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, WebError> {
    let analysis = state.lifecycle.analysis_preview(id).await?;

    Ok(Json(analysis).into_response())
}

#[utoipa::path(
    post,
    path = "/api/projects/{id}/finalize",
    params(
        ("id" = Uuid, Path, description = "Project id")
    ),
    responses(
        (status = 200, description = "Final scores and commitment", body = FinalizeResponse),
        (status = 403, description = "Caller is not the project creator"),
        (status = 409, description = "Voting deadline has not passed")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "finalization"
)]
pub async fn finalize_project(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Caller(caller): Caller,
) -> Result<Response, WebError> {
    let finalized = state.lifecycle.request_finalize(id, &caller).await?;

    Ok(Json(finalized).into_response())
}

#[utoipa::path(
    post,
    path = "/api/projects/{id}/publish",
    params(
        ("id" = Uuid, Path, description = "Project id")
    ),
    responses(
        (status = 200, description = "Commitment with its ledger reference", body = Commitment),
        (status = 409, description = "Project is not finalized"),
        (status = 503, description = "Ledger unavailable")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "finalization"
)]
pub async fn publish_commitment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, WebError> {
    let commitment = state.lifecycle.publish_commitment(id).await?;

    Ok(Json(commitment).into_response())
}

#[utoipa::path(
    put,
    path = "/api/projects/{id}/commitment/reference",
    params(
        ("id" = Uuid, Path, description = "Project id")
    ),
    request_body = ExternalReferenceRequest,
    responses(
        (status = 200, description = "Reference recorded", body = Commitment),
        (status = 409, description = "No commitment, or a different reference is already recorded")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "finalization"
)]
pub async fn record_reference(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ExternalReferenceRequest>,
) -> Result<Response, WebError> {
    payload.validate()?;
    let commitment = state
        .lifecycle
        .record_external_reference(id, payload.reference.trim())
        .await?;

    Ok(Json(commitment).into_response())
}

#[utoipa::path(
    get,
    path = "/api/projects/{id}/dashboard",
    params(
        ("id" = Uuid, Path, description = "Project id")
    ),
    responses(
        (status = 200, description = "Provisional or final standings", body = DashboardResponse),
        (status = 404, description = "Project not found")
    ),
    tag = "projects"
)]
pub async fn get_dashboard(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, WebError> {
    let dashboard = state.lifecycle.dashboard(id).await?;

    Ok(Json(dashboard).into_response())
}
