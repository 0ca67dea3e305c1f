/// Configuration sections mirroring every knob spec'd for the Dispatcher,
/// loaded from TOML the same way the teacher's `HostConfig` is: per-field
/// `serde(default = "...")` so a minimal file only overrides what it names.

use std::path::PathBuf;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct DispatcherConfig {
    #[serde(default)]
    pub listen: ListenSection,
    #[serde(default)]
    pub store: StoreSection,
    #[serde(default)]
    pub policy: PolicySection,
    #[serde(default)]
    pub maintenance: MaintenanceSection,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            listen: ListenSection::default(),
            store: StoreSection::default(),
            policy: PolicySection::default(),
            maintenance: MaintenanceSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListenSection {
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ListenSection {
    fn default() -> Self {
        Self { port: default_port() }
    }
}

fn default_port() -> u16 {
    crawl_protocol::DEFAULT_DISPATCHER_PORT
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreSection {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self { path: default_db_path() }
    }
}

fn default_db_path() -> String {
    "crawl.sqlite3".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct PolicySection {
    #[serde(default = "default_cooldown")]
    pub cooldown_seconds: i64,
    #[serde(default = "default_max_retries")]
    pub max_retries: i64,
    #[serde(default = "default_inflight_ttl")]
    pub inflight_ttl_seconds: i64,
    #[serde(default = "default_block_streak")]
    pub host_timeout_block_streak: i64,
    #[serde(default = "default_reenable_hours")]
    pub host_timeout_reenable_hours: i64,
    #[serde(default = "default_abc_ext")]
    pub abc_priority_extension: String,
}

impl Default for PolicySection {
    fn default() -> Self {
        Self {
            cooldown_seconds: default_cooldown(),
            max_retries: default_max_retries(),
            inflight_ttl_seconds: default_inflight_ttl(),
            host_timeout_block_streak: default_block_streak(),
            host_timeout_reenable_hours: default_reenable_hours(),
            abc_priority_extension: default_abc_ext(),
        }
    }
}

fn default_cooldown() -> i64 {
    crawl_protocol::DEFAULT_COOLDOWN_SECONDS as i64
}
fn default_max_retries() -> i64 {
    crawl_protocol::DEFAULT_MAX_RETRIES as i64
}
fn default_inflight_ttl() -> i64 {
    crawl_protocol::DEFAULT_INFLIGHT_TTL_SECONDS as i64
}
fn default_block_streak() -> i64 {
    crawl_protocol::DEFAULT_HOST_TIMEOUT_BLOCK_STREAK as i64
}
fn default_reenable_hours() -> i64 {
    crawl_protocol::DEFAULT_HOST_TIMEOUT_REENABLE_HOURS as i64
}
fn default_abc_ext() -> String {
    crawl_protocol::DEFAULT_ABC_PRIORITY_EXTENSION.to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct MaintenanceSection {
    #[serde(default = "default_liveness_sweep")]
    pub liveness_sweep_interval_seconds: u64,
    #[serde(default = "default_log_scan")]
    pub log_scan_interval_seconds: u64,
    /// Worker log files scanned for the DNS-error signature, as a
    /// belt-and-suspenders fallback behind the Fetcher's own explicit
    /// `dns_permanent` reporting.
    #[serde(default)]
    pub worker_log_paths: Vec<PathBuf>,
}

impl Default for MaintenanceSection {
    fn default() -> Self {
        Self {
            liveness_sweep_interval_seconds: default_liveness_sweep(),
            log_scan_interval_seconds: default_log_scan(),
            worker_log_paths: Vec::new(),
        }
    }
}

fn default_liveness_sweep() -> u64 {
    crawl_protocol::DEFAULT_LIVENESS_SWEEP_SECONDS
}
fn default_log_scan() -> u64 {
    crawl_protocol::DEFAULT_LOG_SCAN_INTERVAL_SECONDS
}

impl DispatcherConfig {
    pub fn store_config(&self) -> crawl_store::StoreConfig {
        crawl_store::StoreConfig {
            host_policy: crawl_store::HostPolicyConfig {
                cooldown_seconds: self.policy.cooldown_seconds,
                host_timeout_block_streak: self.policy.host_timeout_block_streak,
                host_timeout_reenable_hours: self.policy.host_timeout_reenable_hours,
            },
            max_retries: self.policy.max_retries,
            abc_priority_extension: self.policy.abc_priority_extension.clone(),
        }
    }
}
