use axum::{Json, response::IntoResponse};
use serde_json::json;

#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Server is up")
    ),
    tag = "health"
)]
pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}
