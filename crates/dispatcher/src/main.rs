mod config;
mod connection;
mod maintenance;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use config::DispatcherConfig;

#[derive(Parser, Debug)]
#[command(name = "dispatcher", about = "Crawl pipeline dispatcher daemon")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/dispatcher.toml")]
    config: PathBuf,
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

    let config: DispatcherConfig = match tokio::fs::read_to_string(&args.config).await {
        Ok(raw) => toml::from_str(&raw).map_err(|e| {
            error!("failed to parse config {:?}: {}", args.config, e);
            e
        })?,
        Err(e) => {
            info!(path = ?args.config, error = %e, "no config file found, using defaults");
            DispatcherConfig::default()
        }
    };

    info!(port = config.listen.port, db = %config.store.path, "dispatcher starting");

    let store = crawl_store::Store::open(&config.store.path, config.store_config())?;
    let store = Arc::new(Mutex::new(store));

    {
        let mut store = store.lock().await;
        let reclaimed = store.reset_on_startup()?;
        info!(reclaimed, "requeued in-flight rows from a prior run");
    }

    let listener = TcpListener::bind(("0.0.0.0", config.listen.port)).await?;
    info!(port = config.listen.port, "listening for worker connections");

    let cancel = CancellationToken::new();

    let liveness_handle = tokio::spawn(maintenance::run_liveness_sweep(
        Arc::clone(&store),
        config.policy.inflight_ttl_seconds,
        config.maintenance.liveness_sweep_interval_seconds,
        cancel.clone(),
    ));

    let log_scan_handle = tokio::spawn(maintenance::run_log_scan(
        Arc::clone(&store),
        config.maintenance.worker_log_paths.clone(),
        config.maintenance.log_scan_interval_seconds,
        cancel.clone(),
    ));

    let accept_handle = {
        let store = Arc::clone(&store);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    accepted = listener.accept() => {
                        match accepted {
                            Ok((socket, peer)) => {
                                info!(?peer, "accepted worker connection");
                                tokio::spawn(connection::handle(socket, Arc::clone(&store), cancel.clone()));
                            }
                            Err(e) => error!(error = %e, "failed to accept a connection"),
                        }
                    }
                    _ = cancel.cancelled() => return,
                }
            }
        })
    };

    tokio::signal::ctrl_c().await?;
    info!("shutting down...");
    cancel.cancel();

    accept_handle.abort();
    liveness_handle.abort();
    log_scan_handle.abort();

    Ok(())
}
