/// A thin CLI against the supervisor's HTTP surface, the same shape as the
/// teacher's `midinet` CLI (`clap` subcommands, a `reqwest::Client`, println
/// tables over the raw JSON response).
use clap::{Parser, Subcommand};
use serde_json::{json, Value};

#[derive(Parser, Debug)]
#[command(name = "crawlctl", about = "Crawl pipeline supervisor CLI")]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Supervisor API base URL.
    #[arg(short, long, default_value = "http://localhost:9090", global = true)]
    url: String,

    /// Bearer token, if the supervisor requires one.
    #[arg(long, env = "CRAWL_API_TOKEN", global = true)]
    api_token: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show per-status URL counts and disabled-host count.
    Status,
    /// List disabled hosts.
    Hosts,
    /// List tracked worker processes.
    Workers,
    /// Start a worker process.
    Start {
        /// fetcher | parser | indexer
        role: String,
        /// Worker id (unique per role).
        id: String,
    },
    /// Stop a worker process.
    Stop {
        /// fetcher | parser | indexer
        role: String,
        /// Worker id.
        id: String,
    },
    /// Stop every tracked worker process.
    StopAll,
    /// Seed a frontier URL at link distance zero.
    Seed {
        /// URL to seed.
        url: String,
    },
}

fn client(args: &Args) -> anyhow::Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder();
    if let Some(token) = &args.api_token {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::AUTHORIZATION,
            reqwest::header::HeaderValue::from_str(&format!("Bearer {token}"))?,
        );
        builder = builder.default_headers(headers);
    }
    Ok(builder.build()?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let client = client(&args)?;
    let base = args.url.trim_end_matches('/').to_string();

    match &args.command {
        Commands::Status => {
            let resp: Value = client.get(format!("{base}/api/status")).send().await?.json().await?;
            println!("Crawl Status");
            println!("══════════════════════════════");
            if let Some(counts) = resp["url_status_counts"].as_object() {
                for (status, count) in counts {
                    let label = if status.is_empty() { "new" } else { status };
                    println!("  {label:<12} {count}");
                }
            }
            println!("  disabled hosts: {}", resp["disabled_host_count"]);
        }
        Commands::Hosts => {
            let resp: Value = client.get(format!("{base}/api/hosts")).send().await?.json().await?;
            println!("Disabled Hosts");
            println!("══════════════════════════════");
            if let Some(hosts) = resp["disabled_hosts"].as_array() {
                if hosts.is_empty() {
                    println!("  (none)");
                }
                for h in hosts {
                    println!(
                        "  {} reason={} since={}",
                        h["host"].as_str().unwrap_or("?"),
                        h["disabled_reason"],
                        h["disabled_at"]
                    );
                }
            }
        }
        Commands::Workers => {
            let resp: Value = client.get(format!("{base}/api/workers")).send().await?.json().await?;
            println!("Workers");
            println!("══════════════════════════════");
            if let Some(workers) = resp["workers"].as_array() {
                if workers.is_empty() {
                    println!("  (none running)");
                }
                for w in workers {
                    println!(
                        "  {} #{} pid={}",
                        w["role"].as_str().unwrap_or("?"),
                        w["id"].as_str().unwrap_or("?"),
                        w["pid"]
                    );
                }
            }
        }
        Commands::Start { role, id } => {
            let resp: Value = client
                .post(format!("{base}/api/workers/{role}/start"))
                .json(&json!({ "id": id }))
                .send()
                .await?
                .json()
                .await?;
            if resp["started"].as_bool().unwrap_or(false) {
                println!("started {role} #{id} pid={}", resp["pid"]);
            } else {
                println!("failed to start {role} #{id}: {resp}");
            }
        }
        Commands::Stop { role, id } => {
            let resp: Value = client
                .post(format!("{base}/api/workers/{role}/{id}/stop"))
                .send()
                .await?
                .json()
                .await?;
            println!(
                "stopped {role} #{id} (graceful={})",
                resp["graceful"].as_bool().unwrap_or(false)
            );
        }
        Commands::StopAll => {
            let resp: Value = client.post(format!("{base}/api/workers/stop-all")).send().await?.json().await?;
            let count = resp["stopped"].as_array().map(|a| a.len()).unwrap_or(0);
            println!("stopped {count} worker(s)");
        }
        Commands::Seed { url } => {
            let resp: Value = client
                .post(format!("{base}/api/urls/seed"))
                .json(&json!({ "url": url }))
                .send()
                .await?
                .json()
                .await?;
            if resp["seeded"].as_bool().unwrap_or(false) {
                println!("seeded {url} (id={})", resp["id"]);
            } else {
                println!("already present: {url}");
            }
        }
    }

    Ok(())
}
