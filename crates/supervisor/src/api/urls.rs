use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::state::AppState;

fn now_unix() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as i64
}

#[derive(Debug, Deserialize)]
pub struct SeedRequest {
    pub url: String,
}

/// Seeds a frontier URL at link distance zero. Duplicate URLs are a silent
/// no-op at the store layer, surfaced here as `seeded: false`.
pub async fn seed_url(
    State(state): State<AppState>,
    Json(req): Json<SeedRequest>,
) -> Result<Json<Value>, StatusCode> {
    let mut store = state.inner.store.lock().await;
    match store.seed_url(&req.url, now_unix(), 0) {
        Ok(id) => Ok(Json(json!({ "seeded": id.is_some(), "id": id }))),
        Err(_) => Err(StatusCode::SERVICE_UNAVAILABLE),
    }
}
