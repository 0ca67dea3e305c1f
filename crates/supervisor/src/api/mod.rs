pub mod status;
pub mod urls;
pub mod workers;

use axum::{
    middleware,
    routing::{get, post},
    Extension, Router,
};

use crate::auth::{require_auth, ApiToken};
use crate::state::AppState;

pub fn build_router(state: AppState, api_token: Option<String>) -> Router {
    Router::new()
        .route("/api/status", get(status::get_status))
        .route("/api/hosts", get(status::get_hosts))
        .route("/api/workers", get(workers::list_workers))
        .route("/api/workers/:role/start", post(workers::start_worker))
        .route("/api/workers/:role/:id/stop", post(workers::stop_worker))
        .route("/api/workers/stop-all", post(workers::stop_all))
        .route("/api/urls/seed", post(urls::seed_url))
        .layer(middleware::from_fn(require_auth))
        .layer(Extension(ApiToken(api_token)))
        .with_state(state)
}
