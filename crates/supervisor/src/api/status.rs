use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::state::AppState;

/// Read-mostly pipeline status: per-status URL counts and disabled hosts.
/// The supervisor never writes URL/Host rows itself — that authority stays
/// with the Dispatcher; this is purely a status surface over the same store.
pub async fn get_status(State(state): State<AppState>) -> Json<Value> {
    let store = state.inner.store.lock().await;
    let counts = store.url_status_counts().unwrap_or_default();
    let disabled = store.disabled_hosts().unwrap_or_default();

    Json(json!({
        "url_status_counts": counts.into_iter().collect::<std::collections::HashMap<_, _>>(),
        "disabled_host_count": disabled.len(),
    }))
}

pub async fn get_hosts(State(state): State<AppState>) -> Json<Value> {
    let store = state.inner.store.lock().await;
    let disabled = store.disabled_hosts().unwrap_or_default();
    Json(json!({ "disabled_hosts": disabled }))
}
