pub mod framing;
pub mod messages;

/// Protocol version carried on every message. A peer that sees any other
/// value (or a message tag it doesn't recognize) closes the connection
/// rather than guessing at compatibility.
pub const PROTOCOL_VERSION: u8 = 1;

/// Default TCP port the Dispatcher listens on for worker connections.
pub const DEFAULT_DISPATCHER_PORT: u16 = 8888;

/// Default per-host cooldown between two requests to the same host.
pub const DEFAULT_COOLDOWN_SECONDS: u64 = 30;

/// Default retry ceiling before a URL becomes terminal.
pub const DEFAULT_MAX_RETRIES: u8 = 3;

/// Default liveness-reclaim threshold for in-flight URLs.
pub const DEFAULT_INFLIGHT_TTL_SECONDS: u64 = 120;

/// Default consecutive-timeout streak that disables a host.
pub const DEFAULT_HOST_TIMEOUT_BLOCK_STREAK: u32 = 3;

/// Default cooldown before the Purger may re-enable a timeout-disabled host.
pub const DEFAULT_HOST_TIMEOUT_REENABLE_HOURS: u64 = 24;

/// Default high-priority URL extension.
pub const DEFAULT_ABC_PRIORITY_EXTENSION: &str = ".abc";

/// Default interval between liveness sweeps.
pub const DEFAULT_LIVENESS_SWEEP_SECONDS: u64 = 20;

/// Default interval between worker-log DNS-error scans.
pub const DEFAULT_LOG_SCAN_INTERVAL_SECONDS: u64 = 60;

/// Default backoff the Dispatcher hints to an idle worker, in milliseconds.
pub const DEFAULT_IDLE_BACKOFF_MS: u64 = 750;
