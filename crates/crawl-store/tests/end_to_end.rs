/// Multi-step scenarios that need a real temp-file SQLite database, covering
/// the crawl pipeline's end-to-end behaviors with the literal values from
/// the scenario table: host cooldown, crash recovery, liveness reclaim, and
/// ABC-priority preemption under a large non-ABC backlog.

use crawl_protocol::messages::{ErrorKind, FetchOutcome};
use crawl_store::{ClaimedWork, Store, StoreConfig, UrlStatus, WorkKind};

fn temp_store(config: StoreConfig) -> (Store, tempfile::TempPath) {
    let file = tempfile::NamedTempFile::new().unwrap();
    let path = file.into_temp_path();
    let store = Store::open(path.to_str().unwrap(), config).unwrap();
    (store, path)
}

#[test]
fn host_cooldown_holds_a_second_url_from_the_same_host() {
    let mut config = StoreConfig::default();
    config.host_policy.cooldown_seconds = 30;
    let (mut s, _path) = temp_store(config);

    s.seed_url("http://h1/a", 0, 0).unwrap();
    s.seed_url("http://h1/b", 0, 0).unwrap();
    s.seed_url("http://h2/c", 0, 0).unwrap();

    // t=0: two fetchers claim — one from h1, one from h2, never two from h1.
    let first = s.claim_next_url(WorkKind::Fetch, 0).unwrap().unwrap();
    let second = s.claim_next_url(WorkKind::Fetch, 0).unwrap().unwrap();
    let hosts: Vec<String> = [first, second]
        .into_iter()
        .map(|c| match c {
            ClaimedWork::Fetch(row) => row.host,
            _ => unreachable!(),
        })
        .collect();
    assert!(hosts.contains(&"h1".to_string()));
    assert!(hosts.contains(&"h2".to_string()));

    // the claim itself stamped h1.last_access = 0, so the cooldown is
    // already running without any completed fetch.

    // t=29: h1 still in cooldown, b cannot be assigned.
    assert!(s.claim_next_url(WorkKind::Fetch, 29).unwrap().is_none());

    // t=30: cooldown has elapsed.
    let claimed = s.claim_next_url(WorkKind::Fetch, 30).unwrap();
    assert!(claimed.is_some());
}

#[test]
fn crash_recovery_requeues_a_dispatched_url() {
    let (mut s, _path) = temp_store(StoreConfig::default());
    s.seed_url("http://h/y", 0, 0).unwrap();
    s.claim_next_url(WorkKind::Fetch, 0).unwrap();
    assert!(matches!(s.get_url(1).unwrap().unwrap().status, UrlStatus::Dispatched));

    // Dispatcher restarts.
    drop(s);
    let mut s = Store::open(_path.to_str().unwrap(), StoreConfig::default()).unwrap();
    s.reset_on_startup().unwrap();

    let row = s.get_url(1).unwrap().unwrap();
    assert!(matches!(row.status, UrlStatus::New));

    let claimed = s.claim_next_url(WorkKind::Fetch, 1).unwrap();
    match claimed {
        Some(ClaimedWork::Fetch(row)) => assert_eq!(row.id, 1),
        other => panic!("expected the recovered row, got {other:?}"),
    }
}

#[test]
fn liveness_sweep_reclaims_a_url_after_the_ttl() {
    let (mut s, _path) = temp_store(StoreConfig::default());
    s.seed_url("http://h/z", 0, 0).unwrap();
    s.claim_next_url(WorkKind::Fetch, 0).unwrap();

    // worker killed at t=5 without ever sending RESULT.
    assert_eq!(s.release_stuck(120, 120).unwrap(), 0, "not yet past the 120s ttl");
    assert_eq!(s.release_stuck(121, 120).unwrap(), 1, "past the ttl, must reclaim");

    let claimed = s.claim_next_url(WorkKind::Fetch, 122).unwrap();
    match claimed {
        Some(ClaimedWork::Fetch(row)) => assert_eq!(row.url, "http://h/z"),
        other => panic!("expected the reclaimed row, got {other:?}"),
    }
}

#[test]
fn abc_url_preempts_a_thousand_older_non_abc_rows() {
    let (mut s, _path) = temp_store(StoreConfig::default());
    for i in 0..1000 {
        s.seed_url(&format!("http://h{i}/page.html"), i, 0).unwrap();
    }
    s.seed_url("http://h-new/tune.abc", 100, 0).unwrap();

    let claimed = s.claim_next_url(WorkKind::Fetch, 100).unwrap();
    match claimed {
        Some(ClaimedWork::Fetch(row)) => assert_eq!(row.url, "http://h-new/tune.abc"),
        other => panic!("expected the .abc row to preempt, got {other:?}"),
    }
}

#[test]
fn fetch_success_inserts_distinct_links_at_the_next_link_distance() {
    let (mut s, _path) = temp_store(StoreConfig::default());
    s.seed_url("http://h/start", 0, 0).unwrap();
    s.claim_next_url(WorkKind::Fetch, 0).unwrap();
    s.apply_fetch_result(
        1,
        FetchOutcome::Success {
            http_status: 200,
            mime_type: "text/html".into(),
            size_bytes: 5,
            body: "<html></html>".into(),
            links: vec!["http://h/a".into(), "http://h/a".into(), "http://h/b".into()],
        },
        0,
    )
    .unwrap();

    let counts = s.url_status_counts().unwrap();
    let new_count: i64 = counts.iter().find(|(status, _)| status == "").map(|(_, c)| *c).unwrap_or(0);
    assert_eq!(new_count, 2, "duplicate links must collapse to one row");
}

#[test]
fn third_transient_failure_becomes_terminal_and_blocks_the_host() {
    let (mut s, _path) = temp_store(StoreConfig::default());
    s.seed_url("http://flaky/x", 0, 0).unwrap();

    for _ in 0..3 {
        s.claim_next_url(WorkKind::Fetch, 0).unwrap();
        s.apply_fetch_result(
            1,
            FetchOutcome::Error { kind: ErrorKind::Timeout, detail: "timed out".into() },
            0,
        )
        .unwrap();
    }

    let row = s.get_url(1).unwrap().unwrap();
    assert_eq!(row.retries, 3);
    assert!(matches!(row.status, UrlStatus::Error));
    let host = s.host_stats("flaky").unwrap().unwrap();
    assert!(host.disabled);
}
