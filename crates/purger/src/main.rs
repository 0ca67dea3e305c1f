/// The external Purger spec.md treats as a collaborator but whose contract
/// binds the Host policy and `document` column (§3, §4.2, §8): on a timer,
/// re-enable any host whose `timeout` block has outlived its cooldown, and
/// optionally erase stale `document` payloads behind a retention-age flag.
///
/// Opens its own `crawl-store` handle against the same SQLite file the
/// Dispatcher writes — safe under WAL, since the only two operations this
/// binary performs (`reenable_timed_out_hosts`, `erase_document`) are rows
/// the Dispatcher's claim/apply path never holds a transaction open across.
use std::time::{SystemTime, UNIX_EPOCH};

use clap::Parser;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "purger", about = "Host re-enable and document-erasure sweeper")]
struct Args {
    /// SQLite database path (same file the Dispatcher writes).
    #[arg(long, default_value = "crawl.sqlite3")]
    db: String,

    /// How often to run a sweep.
    #[arg(long, default_value_t = 3600)]
    sweep_interval_seconds: u64,

    /// Hours a `timeout`-disabled host stays disabled before re-enabling.
    #[arg(long, default_value_t = crawl_protocol::DEFAULT_HOST_TIMEOUT_REENABLE_HOURS)]
    host_timeout_reenable_hours: u64,

    /// Also erase `document` payloads past the retention age (writes the
    /// `"erased"` tombstone sentinel in place). Off by default: spec.md
    /// leaves document retention as an operator choice, not a default.
    #[arg(long, default_value_t = false)]
    erase_documents: bool,

    /// Age (in days since download) past which a document is eligible for
    /// erasure, when `--erase-documents` is set.
    #[arg(long, default_value_t = 30)]
    retention_days: i64,

    /// Run one sweep and exit, instead of looping forever.
    #[arg(long, default_value_t = false)]
    once: bool,
}

fn now_unix() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as i64
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

    info!(
        db = %args.db,
        interval = args.sweep_interval_seconds,
        erase_documents = args.erase_documents,
        "purger starting"
    );

    let mut store_config = crawl_store::StoreConfig::default();
    store_config.host_policy.host_timeout_reenable_hours = args.host_timeout_reenable_hours as i64;
    let mut store = crawl_store::Store::open(&args.db, store_config)?;

    loop {
        run_sweep(&mut store, &args);
        if args.once {
            break;
        }
        tokio::select! {
            _ = tokio::time::sleep(std::time::Duration::from_secs(args.sweep_interval_seconds.max(1))) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("purger shutting down");
                break;
            }
        }
    }

    Ok(())
}

fn run_sweep(store: &mut crawl_store::Store, args: &Args) {
    let now = now_unix();

    match store.reenable_timed_out_hosts(now) {
        Ok(hosts) if hosts.is_empty() => {}
        Ok(hosts) => info!(count = hosts.len(), hosts = ?hosts, "re-enabled timeout-disabled hosts"),
        Err(e) => warn!(error = %e, "host re-enable sweep failed"),
    }

    if args.erase_documents {
        let cutoff = now - args.retention_days * 86_400;
        match store.urls_eligible_for_erasure(cutoff) {
            Ok(ids) => {
                let count = ids.len();
                for id in ids {
                    if let Err(e) = store.erase_document(id) {
                        warn!(url_id = id, error = %e, "failed to erase a document payload");
                    }
                }
                if count > 0 {
                    info!(count, "erased stale document payloads");
                }
            }
            Err(e) => warn!(error = %e, "document erasure scan failed"),
        }
    }
}
