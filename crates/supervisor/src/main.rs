mod api;
mod auth;
mod process_manager;
mod state;

use std::path::PathBuf;

use clap::Parser;
use tracing::info;

use state::AppState;

#[derive(Parser, Debug)]
#[command(name = "supervisor", about = "Crawl pipeline worker process supervisor")]
struct Args {
    /// Listen address for the management API.
    #[arg(short, long, default_value = "0.0.0.0:9090")]
    listen: String,

    /// SQLite database path (same file the Dispatcher writes).
    #[arg(long, default_value = "crawl.sqlite3")]
    db: String,

    /// Path to the `worker` binary this supervisor spawns.
    #[arg(long, default_value = "worker")]
    worker_bin: PathBuf,

    /// Dispatcher address workers are told to connect to.
    #[arg(long, default_value = "127.0.0.1:8888")]
    dispatcher: String,

    /// API bearer token; if unset the API is open.
    #[arg(long, env = "CRAWL_API_TOKEN")]
    api_token: Option<String>,
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

    info!(listen = %args.listen, db = %args.db, "supervisor starting");

    let store = crawl_store::Store::open(&args.db, crawl_store::StoreConfig::default())?;
    let state = AppState::new(store, args.worker_bin.clone(), args.dispatcher.clone());

    if args.api_token.is_some() {
        info!("API authentication enabled (bearer token required for /api/*)");
    }

    let app = api::build_router(state, args.api_token);

    let listener = tokio::net::TcpListener::bind(&args.listen).await?;
    info!(addr = %args.listen, "supervisor listening");

    axum::serve(listener, app).await?;

    Ok(())
}
