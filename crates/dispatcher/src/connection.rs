/// One task per worker TCP connection. Each connection tracks at most one
/// in-flight assignment at a time: a `REQUEST` claims the next row of the
/// connection's declared role, a `RESULT` must reference that exact
/// assignment id or it is dropped with a warning rather than applied.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crawl_protocol::framing::{read_frame, write_frame, FramingError};
use crawl_protocol::messages::{
    AssignmentPayload, ClientMessage, Outcome, ServerMessage, TuneForIndex as WireTune, WorkerRole,
};
use crawl_protocol::{DEFAULT_IDLE_BACKOFF_MS, PROTOCOL_VERSION};
use crawl_store::{ClaimedWork, Store, WorkKind};

fn now_unix() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as i64
}

/// What this connection handed out in its last `ASSIGN`, so a `RESULT`
/// can be matched and routed back into the right `Store::apply_*` call.
#[derive(Debug, Clone)]
enum Pending {
    Fetch { url_id: i64 },
    Parse { url_id: i64 },
    Index { tunebook_id: i64 },
}

static NEXT_ASSIGNMENT_ID: AtomicU64 = AtomicU64::new(1);

pub async fn handle(
    mut socket: TcpStream,
    store: Arc<Mutex<Store>>,
    cancel: CancellationToken,
) {
    let peer = socket.peer_addr().ok();

    let hello: ClientMessage = match read_frame(&mut socket).await {
        Ok(msg) => msg,
        Err(e) => {
            warn!(?peer, error = %e, "connection closed before HELLO");
            return;
        }
    };

    let (role, worker_id) = match hello {
        ClientMessage::Hello { v, role, id } if v == PROTOCOL_VERSION => (role, id),
        ClientMessage::Hello { v, .. } => {
            warn!(?peer, version = v, "worker speaks an unsupported protocol version");
            return;
        }
        other => {
            warn!(?peer, ?other, "expected HELLO as the first message");
            return;
        }
    };

    info!(worker_id = %worker_id, role = role.as_str(), ?peer, "worker connected");

    if let Err(e) = run_loop(&mut socket, &store, role, &worker_id, &cancel).await {
        warn!(worker_id = %worker_id, error = %e, "worker connection ended");
    }
}

async fn run_loop(
    socket: &mut TcpStream,
    store: &Arc<Mutex<Store>>,
    role: WorkerRole,
    worker_id: &str,
    cancel: &CancellationToken,
) -> Result<(), FramingError> {
    let mut pending: Option<(u64, Pending)> = None;

    loop {
        let incoming = tokio::select! {
            msg = read_frame::<_, ClientMessage>(socket) => msg?,
            _ = cancel.cancelled() => {
                write_frame(socket, &ServerMessage::Shutdown { v: PROTOCOL_VERSION }).await?;
                return Ok(());
            }
        };

        match incoming {
            ClientMessage::Hello { .. } => {
                warn!(worker_id, "ignoring a repeated HELLO on an established connection");
            }
            ClientMessage::Ping { .. } => {}
            ClientMessage::Request { .. } => {
                let claimed = {
                    let mut store = store.lock().await;
                    store.claim_next_url(work_kind_for(role), now_unix())
                };
                match claimed {
                    Ok(Some(work)) => {
                        let assignment_id = NEXT_ASSIGNMENT_ID.fetch_add(1, Ordering::Relaxed);
                        let (payload, next_pending) = build_assignment(work);
                        pending = Some((assignment_id, next_pending));
                        write_frame(
                            socket,
                            &ServerMessage::Assign { v: PROTOCOL_VERSION, assignment_id, payload },
                        )
                        .await?;
                    }
                    Ok(None) => {
                        write_frame(
                            socket,
                            &ServerMessage::Idle { v: PROTOCOL_VERSION, backoff_ms: DEFAULT_IDLE_BACKOFF_MS },
                        )
                        .await?;
                    }
                    Err(e) => {
                        warn!(worker_id, error = %e, "store unavailable while claiming work");
                        write_frame(
                            socket,
                            &ServerMessage::Idle { v: PROTOCOL_VERSION, backoff_ms: DEFAULT_IDLE_BACKOFF_MS },
                        )
                        .await?;
                    }
                }
            }
            ClientMessage::Result { assignment_id, outcome, .. } => {
                match pending.take() {
                    Some((expected, work)) if expected == assignment_id => {
                        let mut store = store.lock().await;
                        if let Err(e) = apply_result(&mut store, work, outcome) {
                            warn!(worker_id, error = %e, "failed to apply worker result");
                        }
                    }
                    Some((expected, work)) => {
                        warn!(
                            worker_id,
                            expected,
                            got = assignment_id,
                            "dropping a RESULT that doesn't match the outstanding assignment"
                        );
                        pending = Some((expected, work));
                    }
                    None => {
                        warn!(worker_id, assignment_id, "dropping a RESULT with no outstanding assignment");
                    }
                }
            }
        }
    }
}

fn work_kind_for(role: WorkerRole) -> WorkKind {
    match role {
        WorkerRole::Fetcher => WorkKind::Fetch,
        WorkerRole::Parser => WorkKind::Parse,
        WorkerRole::Indexer => WorkKind::Index,
    }
}

fn build_assignment(work: ClaimedWork) -> (AssignmentPayload, Pending) {
    match work {
        ClaimedWork::Fetch(row) => {
            (AssignmentPayload::Fetch { url_id: row.id, url: row.url }, Pending::Fetch { url_id: row.id })
        }
        ClaimedWork::Parse(row) => {
            let document = row.document.unwrap_or_default();
            (
                AssignmentPayload::Parse { url_id: row.id, document },
                Pending::Parse { url_id: row.id },
            )
        }
        ClaimedWork::Index(book, tunes) => {
            let wire_tunes = tunes
                .into_iter()
                .map(|t| WireTune { tune_id: t.tune_id, pitches: t.pitches })
                .collect();
            (
                AssignmentPayload::Index { tunebook_id: book.id, tunes: wire_tunes },
                Pending::Index { tunebook_id: book.id },
            )
        }
    }
}

fn apply_result(store: &mut Store, work: Pending, outcome: Outcome) -> crawl_store::Result<()> {
    let now = now_unix();
    match (work, outcome) {
        (Pending::Fetch { url_id }, Outcome::Fetch(outcome)) => {
            store.apply_fetch_result(url_id, outcome, now)
        }
        (Pending::Parse { url_id }, Outcome::Parse(outcome)) => {
            store.apply_parse_result(url_id, outcome, now)
        }
        (Pending::Index { tunebook_id }, Outcome::Index(outcome)) => {
            store.apply_index_result(tunebook_id, outcome)
        }
        (work, outcome) => {
            warn!(?work, ?outcome, "worker reported a result kind that doesn't match its assignment");
            Ok(())
        }
    }
}

