use axum::{
    Router, middleware,
    routing::{get, post, put},
};

use super::handlers::{
    activate_project, add_member, create_project, finalize_project, get_analysis, get_dashboard,
    get_project, list_projects, publish_commitment, record_reference, remaining_ratees,
    submit_vote, trigger_analysis, update_rules,
};
use crate::middleware::auth::{ApiKeys, require_auth};
use crate::state::AppState;

pub fn routes(api_keys: ApiKeys) -> Router<AppState> {
    let protected = Router::new()
        .route("/", post(create_project))
        .route("/:id/rules", put(update_rules))
        .route("/:id/activate", post(activate_project))
        .route("/:id/members", post(add_member))
        .route("/:id/votes", post(submit_vote))
        .route("/:id/analysis", post(trigger_analysis))
        .route("/:id/finalize", post(finalize_project))
        .route("/:id/publish", post(publish_commitment))
        .route("/:id/commitment/reference", put(record_reference))
        .route_layer(middleware::from_fn_with_state(api_keys, require_auth));

    Router::new()
        .route("/", get(list_projects))
        .route("/:id", get(get_project))
        .route("/:id/votes/remaining", get(remaining_ratees))
        .route("/:id/analysis", get(get_analysis))
        .route("/:id/dashboard", get(get_dashboard))
        .merge(protected)
}
