use axum::{Router, routing::get};

use crate::features::{health::health, projects};
use crate::middleware::auth::ApiKeys;
use crate::state::AppState;

/// The `/api` routes, ready to serve.
pub fn router(state: AppState, api_keys: ApiKeys) -> Router {
    let api = Router::new()
        .route("/health", get(health))
        .nest("/projects", projects::routes::routes(api_keys));

    Router::new().nest("/api", api).with_state(state)
}
