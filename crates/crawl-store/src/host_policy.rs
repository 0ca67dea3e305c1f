/// Per-host politeness and fault-tolerance rules, kept as a plain module
/// inside the store crate rather than a separate crate — it is pure logic
/// over rows the store already owns, the same way the teacher keeps its
/// failover logic as a module inside the host binary rather than splitting
/// it out.

use crate::types::{DisabledReason, HostRow};

#[derive(Debug, Clone)]
pub struct HostPolicyConfig {
    pub cooldown_seconds: i64,
    pub host_timeout_block_streak: i64,
    pub host_timeout_reenable_hours: i64,
}

impl Default for HostPolicyConfig {
    fn default() -> Self {
        Self {
            cooldown_seconds: crawl_protocol::DEFAULT_COOLDOWN_SECONDS as i64,
            host_timeout_block_streak: crawl_protocol::DEFAULT_HOST_TIMEOUT_BLOCK_STREAK as i64,
            host_timeout_reenable_hours: crawl_protocol::DEFAULT_HOST_TIMEOUT_REENABLE_HOURS as i64,
        }
    }
}

/// Rule 1/2/3 from the host gate: disabled hosts are never eligible; a host
/// within its cooldown window is skipped in favor of other hosts.
pub fn is_eligible(host: &HostRow, now: i64, config: &HostPolicyConfig) -> bool {
    if host.disabled {
        return false;
    }
    match host.last_access {
        Some(last) => now - last >= config.cooldown_seconds,
        None => true,
    }
}

pub fn record_success(host: &mut HostRow, now: i64, http_status: i64) {
    host.last_access = Some(now);
    host.last_http_status = Some(http_status);
    host.downloads += 1;
    host.consecutive_timeouts = 0;
}

pub fn record_failure(host: &mut HostRow, now: i64, http_status: Option<i64>) {
    host.last_access = Some(now);
    if let Some(code) = http_status {
        host.last_http_status = Some(code);
    }
}

/// A timeout counts toward the consecutive-timeout streak; crossing the
/// configured streak disables the host.
pub fn record_timeout(host: &mut HostRow, now: i64, config: &HostPolicyConfig) {
    host.last_access = Some(now);
    host.consecutive_timeouts += 1;
    if host.consecutive_timeouts >= config.host_timeout_block_streak && !host.disabled {
        disable(host, now, DisabledReason::Timeout);
    }
}

/// A DNS failure disables the host unconditionally, whether reported
/// directly by the Fetcher or found by the log scanner.
pub fn record_dns_failure(host: &mut HostRow, now: i64) {
    disable(host, now, DisabledReason::Dns);
}

fn disable(host: &mut HostRow, now: i64, reason: DisabledReason) {
    if host.disabled {
        return;
    }
    host.disabled = true;
    host.disabled_reason = Some(reason);
    host.disabled_at = Some(now);
}

/// Whether the Purger may clear a timeout-originated block: only
/// `disabled_reason='timeout'`, and only past the configured cooldown.
/// DNS- and manually-disabled hosts are never auto-re-enabled.
pub fn reenable_eligible(host: &HostRow, now: i64, config: &HostPolicyConfig) -> bool {
    host.disabled
        && host.disabled_reason == Some(DisabledReason::Timeout)
        && host
            .disabled_at
            .map(|at| now - at >= config.host_timeout_reenable_hours * 3600)
            .unwrap_or(false)
}

pub fn reenable(host: &mut HostRow) {
    host.disabled = false;
    host.disabled_reason = None;
    host.disabled_at = None;
    host.consecutive_timeouts = 0;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_host(host: &str) -> HostRow {
        HostRow {
            host: host.to_string(),
            last_access: None,
            last_http_status: None,
            downloads: 0,
            disabled: false,
            disabled_reason: None,
            disabled_at: None,
            consecutive_timeouts: 0,
        }
    }

    #[test]
    fn never_accessed_host_is_eligible() {
        let host = fresh_host("h1");
        let config = HostPolicyConfig::default();
        assert!(is_eligible(&host, 1_000, &config));
    }

    #[test]
    fn host_within_cooldown_is_not_eligible() {
        let mut host = fresh_host("h1");
        let config = HostPolicyConfig {
            cooldown_seconds: 30,
            ..HostPolicyConfig::default()
        };
        host.last_access = Some(100);
        assert!(!is_eligible(&host, 110, &config));
        assert!(is_eligible(&host, 130, &config));
    }

    #[test]
    fn disabled_host_is_never_eligible_regardless_of_cooldown() {
        let mut host = fresh_host("h1");
        host.disabled = true;
        let config = HostPolicyConfig::default();
        assert!(!is_eligible(&host, 1_000_000, &config));
    }

    #[test]
    fn three_consecutive_timeouts_disable_the_host() {
        let mut host = fresh_host("h1");
        let config = HostPolicyConfig {
            host_timeout_block_streak: 3,
            ..HostPolicyConfig::default()
        };
        record_timeout(&mut host, 1, &config);
        record_timeout(&mut host, 2, &config);
        assert!(!host.disabled);
        record_timeout(&mut host, 3, &config);
        assert!(host.disabled);
        assert_eq!(host.disabled_reason, Some(DisabledReason::Timeout));
    }

    #[test]
    fn success_resets_the_timeout_streak() {
        let mut host = fresh_host("h1");
        let config = HostPolicyConfig::default();
        record_timeout(&mut host, 1, &config);
        record_timeout(&mut host, 2, &config);
        record_success(&mut host, 3, 200);
        assert_eq!(host.consecutive_timeouts, 0);
    }

    #[test]
    fn timeout_disabled_host_reenables_only_after_cooldown() {
        let mut host = fresh_host("h1");
        host.disabled = true;
        host.disabled_reason = Some(DisabledReason::Timeout);
        host.disabled_at = Some(0);
        let config = HostPolicyConfig {
            host_timeout_reenable_hours: 24,
            ..HostPolicyConfig::default()
        };
        assert!(!reenable_eligible(&host, 23 * 3600, &config));
        assert!(reenable_eligible(&host, 24 * 3600, &config));
    }

    #[test]
    fn dns_disabled_host_is_never_purger_reenable_eligible() {
        let mut host = fresh_host("h1");
        host.disabled = true;
        host.disabled_reason = Some(DisabledReason::Dns);
        host.disabled_at = Some(0);
        let config = HostPolicyConfig::default();
        assert!(!reenable_eligible(&host, 1_000_000_000, &config));
    }
}
