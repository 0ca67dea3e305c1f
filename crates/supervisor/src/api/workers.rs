use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crawl_protocol::messages::WorkerRole;

use crate::process_manager::ProcessManager;
use crate::state::AppState;

fn now_unix() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as i64
}

fn parse_role(s: &str) -> Result<WorkerRole, StatusCode> {
    s.parse().map_err(|_| StatusCode::BAD_REQUEST)
}

pub async fn list_workers(State(state): State<AppState>) -> Json<Value> {
    let processes = state.inner.processes.lock().await;
    let rows: Vec<Value> = processes
        .iter()
        .map(|((role, id), pm)| json!({ "role": role.as_str(), "id": id, "pid": pm.pid() }))
        .collect();
    Json(json!({ "workers": rows }))
}

#[derive(Debug, Deserialize)]
pub struct StartWorkerRequest {
    pub id: String,
}

pub async fn start_worker(
    State(state): State<AppState>,
    Path(role): Path<String>,
    Json(req): Json<StartWorkerRequest>,
) -> Result<Json<Value>, StatusCode> {
    let role = parse_role(&role)?;

    let mut pm = ProcessManager::new(
        role,
        req.id.clone(),
        state.inner.worker_bin.clone(),
        state.inner.dispatcher_addr.clone(),
    );
    pm.spawn().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    let pid = pm.pid();

    let mut processes = state.inner.processes.lock().await;
    processes.insert((role, req.id.clone()), pm);
    drop(processes);

    let mut store = state.inner.store.lock().await;
    let _ = store.upsert_worker_process(role.as_str(), &req.id, pid, "running", Some(now_unix()));

    Ok(Json(json!({ "started": true, "role": role.as_str(), "id": req.id, "pid": pid })))
}

pub async fn stop_worker(
    State(state): State<AppState>,
    Path((role, id)): Path<(String, String)>,
) -> Result<Json<Value>, StatusCode> {
    let role = parse_role(&role)?;

    let mut processes = state.inner.processes.lock().await;
    let Some(mut pm) = processes.remove(&(role, id.clone())) else {
        return Err(StatusCode::NOT_FOUND);
    };
    let graceful = pm.shutdown(Duration::from_secs(10));
    drop(processes);

    let mut store = state.inner.store.lock().await;
    let _ = store.upsert_worker_process(role.as_str(), &id, None, "stopped", None);

    Ok(Json(json!({ "stopped": true, "graceful": graceful })))
}

pub async fn stop_all(State(state): State<AppState>) -> Json<Value> {
    let mut processes = state.inner.processes.lock().await;
    let keys: Vec<_> = processes.keys().cloned().collect();
    let mut stopped = Vec::new();
    for key in keys {
        if let Some(mut pm) = processes.remove(&key) {
            pm.shutdown(Duration::from_secs(10));
            stopped.push(json!({ "role": key.0.as_str(), "id": key.1 }));
        }
    }
    drop(processes);

    let mut store = state.inner.store.lock().await;
    for worker in &stopped {
        if let (Some(role), Some(id)) = (worker.get("role").and_then(|v| v.as_str()), worker.get("id").and_then(|v| v.as_str())) {
            let _ = store.upsert_worker_process(role, id, None, "stopped", None);
        }
    }

    Json(json!({ "stopped": stopped }))
}
