mod backend;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn};

use crawl_protocol::framing::{read_frame, write_frame};
use crawl_protocol::messages::{
    AssignmentPayload, ClientMessage, ErrorKind, IndexOutcome, Outcome, ServerMessage, WorkerRole,
};
use crawl_protocol::PROTOCOL_VERSION;

use backend::{FetchBackend, IndexBackend, ParseBackend, ReqwestFetchBackend, SemitoneIndexBackend, SimpleAbcParseBackend};

#[derive(Parser, Debug)]
#[command(name = "worker", about = "Crawl pipeline fetcher/parser/indexer worker")]
struct Args {
    /// Which role this worker process plays.
    #[arg(long, value_parser = parse_role)]
    role: WorkerRole,

    /// Dispatcher address to connect to.
    #[arg(long, default_value = "127.0.0.1:8888")]
    dispatcher: String,

    /// Stable identifier reported in HELLO; defaults to `<role>-<pid>`.
    #[arg(long)]
    id: Option<String>,
}

fn parse_role(s: &str) -> Result<WorkerRole, String> {
    s.parse()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let worker_id = args.id.unwrap_or_else(|| format!("{}-{}", args.role.as_str(), std::process::id()));

    info!(role = args.role.as_str(), worker_id = %worker_id, dispatcher = %args.dispatcher, "worker starting");

    // Set on SIGTERM/Ctrl-C, but only ever consulted at a connection's loop
    // boundary (before the next REQUEST) — never races an in-flight
    // ASSIGN/RESULT cycle, so an assignment already underway always
    // finishes and reports its RESULT before the process exits.
    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = Arc::clone(&shutdown);
        tokio::spawn(async move {
            shutdown_signal().await;
            info!("shutdown signal received, finishing the in-flight assignment before exiting");
            shutdown.store(true, Ordering::SeqCst);
        });
    }

    let fetch_backend = ReqwestFetchBackend::new();
    let parse_backend = SimpleAbcParseBackend;
    let index_backend = SemitoneIndexBackend;

    let mut restart_count: u32 = 0;

    loop {
        if shutdown.load(Ordering::SeqCst) {
            info!("shutting down");
            return Ok(());
        }

        let result = run_connection(
            &args.dispatcher,
            args.role,
            &worker_id,
            &fetch_backend,
            &parse_backend,
            &index_backend,
            &shutdown,
        )
        .await;
        match result {
            Ok(()) => info!("dispatcher closed the connection cleanly"),
            Err(e) => warn!(error = %e, "connection to dispatcher dropped"),
        }

        if shutdown.load(Ordering::SeqCst) {
            info!("shutting down");
            return Ok(());
        }

        restart_count += 1;
        let backoff = Duration::from_secs(std::cmp::min(restart_count as u64 * 2, 30).max(2));
        info!(backoff_secs = backoff.as_secs(), "reconnecting after backoff");
        tokio::time::sleep(backoff).await;
    }
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut term = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = term.recv() => {}
        _ = tokio::signal::ctrl_c() => {}
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

async fn run_connection(
    dispatcher_addr: &str,
    role: WorkerRole,
    worker_id: &str,
    fetch_backend: &ReqwestFetchBackend,
    parse_backend: &SimpleAbcParseBackend,
    index_backend: &SemitoneIndexBackend,
    shutdown: &Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let mut socket = tokio::net::TcpStream::connect(dispatcher_addr).await?;
    info!(worker_id, "connected to dispatcher");

    write_frame(
        &mut socket,
        &ClientMessage::Hello { v: PROTOCOL_VERSION, role, id: worker_id.to_string() },
    )
    .await?;

    loop {
        // Checked only here, between cycles — never while an ASSIGN is
        // being executed or its RESULT written.
        if shutdown.load(Ordering::SeqCst) {
            return Ok(());
        }

        write_frame(&mut socket, &ClientMessage::Request { v: PROTOCOL_VERSION }).await?;

        let reply: ServerMessage = read_frame(&mut socket).await?;
        match reply {
            ServerMessage::Idle { backoff_ms, .. } => {
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
            }
            ServerMessage::Shutdown { .. } => {
                return Ok(());
            }
            ServerMessage::Assign { assignment_id, payload, .. } => {
                let outcome = execute(payload, fetch_backend, parse_backend, index_backend).await;
                write_frame(
                    &mut socket,
                    &ClientMessage::Result { v: PROTOCOL_VERSION, assignment_id, outcome },
                )
                .await?;
            }
        }
    }
}

async fn execute(
    payload: AssignmentPayload,
    fetch_backend: &ReqwestFetchBackend,
    parse_backend: &SimpleAbcParseBackend,
    index_backend: &SemitoneIndexBackend,
) -> Outcome {
    match payload {
        AssignmentPayload::Fetch { url, .. } => Outcome::Fetch(fetch_backend.fetch(&url).await),
        AssignmentPayload::Parse { document, .. } => Outcome::Parse(parse_backend.parse(&document)),
        AssignmentPayload::Index { tunes, .. } => {
            let mut intervals_by_tune = HashMap::new();
            let mut first_error = None;
            for tune in tunes {
                match index_backend.index(&tune.pitches) {
                    Ok(intervals) => {
                        intervals_by_tune.insert(tune.tune_id, intervals);
                    }
                    Err(e) => {
                        error!(tune_id = tune.tune_id, error = %e, "failed to index a tune");
                        first_error.get_or_insert(e);
                    }
                }
            }
            match first_error {
                Some(e) if intervals_by_tune.is_empty() => {
                    Outcome::Index(IndexOutcome::Error { kind: ErrorKind::ParseFailure, detail: e })
                }
                _ => Outcome::Index(IndexOutcome::Success { intervals_by_tune }),
            }
        }
    }
}
