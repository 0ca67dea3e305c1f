/// Background sweeps that run independently of any worker connection:
/// a liveness sweep that reclaims in-flight rows a crashed worker never
/// finished, and a log scan that catches DNS failures surfaced only in a
/// worker's own log output rather than through a `RESULT` message.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crawl_store::{DisabledReason, Store};

fn now_unix() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as i64
}

/// Signature a worker log line carries when a fetch failed DNS resolution
/// permanently, mirroring the wording the Fetcher's stand-in backend logs.
const DNS_FAILURE_MARKER: &str = "dns resolution failed permanently for host=";

pub async fn run_liveness_sweep(
    store: Arc<Mutex<Store>>,
    ttl_seconds: i64,
    interval_seconds: u64,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_seconds.max(1)));
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = cancel.cancelled() => return,
        }
        let reclaimed = {
            let mut store = store.lock().await;
            store.release_stuck(now_unix(), ttl_seconds)
        };
        match reclaimed {
            Ok(0) => {}
            Ok(n) => info!(reclaimed = n, "liveness sweep reclaimed stuck rows"),
            Err(e) => warn!(error = %e, "liveness sweep failed"),
        }
    }
}

pub async fn run_log_scan(
    store: Arc<Mutex<Store>>,
    log_paths: Vec<std::path::PathBuf>,
    interval_seconds: u64,
    cancel: CancellationToken,
) {
    if log_paths.is_empty() {
        return;
    }
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_seconds.max(1)));
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = cancel.cancelled() => return,
        }
        for path in &log_paths {
            if let Some(host) = find_dns_failure(path).await {
                let mut store = store.lock().await;
                if let Err(e) = store.host_disable(&host, DisabledReason::Dns, now_unix()) {
                    warn!(host = %host, error = %e, "failed to disable a host from a log scan");
                } else {
                    info!(host = %host, log = %path.display(), "disabled a host flagged by a worker log");
                }
            }
        }
    }
}

async fn find_dns_failure(path: &Path) -> Option<String> {
    let contents = tokio::fs::read_to_string(path).await.ok()?;
    contents.lines().rev().find_map(|line| {
        let idx = line.find(DNS_FAILURE_MARKER)?;
        let rest = &line[idx + DNS_FAILURE_MARKER.len()..];
        Some(rest.split_whitespace().next()?.to_string())
    })
}
