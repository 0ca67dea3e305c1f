/// Typed accessors over URLs/Hosts/Tunebooks/Tunes, encapsulating every
/// atomic claim/apply/release statement behind `Connection::transaction_with_behavior(TransactionBehavior::Immediate)` —
/// one Rust-level transaction per call, so two concurrent callers against the
/// same file never observe or claim the same row twice.

use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};

use crawl_protocol::messages::{ErrorKind, FetchOutcome, IndexOutcome, ParseOutcome};

use crate::error::{classify, Result, StoreError};
use crate::host_policy::{self, HostPolicyConfig};
use crate::types::{
    DisabledReason, HostRow, TuneRow, TunebookRow, TunebookStatus, UrlRow, UrlStatus,
    ERASED_SENTINEL,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkKind {
    Fetch,
    Parse,
    Index,
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub host_policy: HostPolicyConfig,
    pub max_retries: i64,
    pub abc_priority_extension: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            host_policy: HostPolicyConfig::default(),
            max_retries: crawl_protocol::DEFAULT_MAX_RETRIES as i64,
            abc_priority_extension: crawl_protocol::DEFAULT_ABC_PRIORITY_EXTENSION.to_string(),
        }
    }
}

/// What an Indexer needs to compute one tune's interval vector.
#[derive(Debug, Clone, PartialEq)]
pub struct TuneForIndex {
    pub tune_id: i64,
    pub pitches: String,
}

/// The work handed back by `claim_next_url`, one variant per role.
#[derive(Debug, Clone)]
pub enum ClaimedWork {
    Fetch(UrlRow),
    Parse(UrlRow),
    Index(TunebookRow, Vec<TuneForIndex>),
}

pub struct Store {
    conn: Connection,
    config: StoreConfig,
}

impl Store {
    pub fn open(path: &str, config: StoreConfig) -> Result<Self> {
        let conn = Connection::open(path).map_err(classify)?;
        crate::schema::init(&conn)?;
        Ok(Self { conn, config })
    }

    /// In-memory database, for tests and anything that doesn't need
    /// durability across process restarts.
    pub fn open_in_memory(config: StoreConfig) -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(classify)?;
        crate::schema::init(&conn)?;
        Ok(Self { conn, config })
    }

    pub fn extract_host(url: &str) -> Option<String> {
        url::Url::parse(url).ok().and_then(|u| u.host_str().map(str::to_string))
    }

    fn url_extension(url: &str) -> Option<String> {
        let parsed = url::Url::parse(url).ok()?;
        let last_segment = parsed.path().rsplit('/').next()?;
        let dot = last_segment.rfind('.')?;
        if dot == 0 {
            return None;
        }
        Some(last_segment[dot..].to_ascii_lowercase())
    }

    fn immediate(&mut self) -> Result<Transaction<'_>> {
        self.conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(classify)
    }

    /// Insert a new frontier URL and its host row (if unseen). Returns
    /// `Ok(None)` when the URL already exists — duplicate links are a
    /// silent no-op, per the `url UNIQUE` contract.
    pub fn seed_url(&mut self, url: &str, now: i64, link_distance: i64) -> Result<Option<i64>> {
        let host = Self::extract_host(url)
            .ok_or_else(|| StoreError::Unavailable(format!("no host in url: {url}")))?;
        let tx = self.immediate()?;
        let id = insert_url(&tx, url, &host, now, link_distance)?;
        tx.commit().map_err(classify)?;
        Ok(id)
    }

    pub fn claim_next_url(&mut self, kind: WorkKind, now: i64) -> Result<Option<ClaimedWork>> {
        let abc_ext = self.config.abc_priority_extension.clone();
        let cooldown = self.config.host_policy.cooldown_seconds;
        let tx = self.immediate()?;
        let claimed = match kind {
            WorkKind::Fetch => claim_fetch(&tx, now, cooldown, &abc_ext)?.map(ClaimedWork::Fetch),
            WorkKind::Parse => claim_parse(&tx, now)?.map(ClaimedWork::Parse),
            WorkKind::Index => {
                claim_index(&tx, now)?.map(|(book, tunes)| ClaimedWork::Index(book, tunes))
            }
        };
        tx.commit().map_err(classify)?;
        Ok(claimed)
    }

    pub fn apply_fetch_result(&mut self, url_id: i64, outcome: FetchOutcome, now: i64) -> Result<()> {
        let max_retries = self.config.max_retries;
        let host_config = self.config.host_policy.clone();
        let tx = self.immediate()?;

        let (host, retries, link_distance): (String, i64, i64) = tx
            .query_row(
                "SELECT host, retries, link_distance FROM urls WHERE id = ?1",
                params![url_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .map_err(classify)?;
        let mut host_row = fetch_host_row(&tx, &host)?;

        match outcome {
            FetchOutcome::Success { http_status, mime_type, size_bytes, body, links } => {
                tx.execute(
                    "UPDATE urls
                     SET status = 'fetched', downloaded_at = ?1, mime_type = ?2,
                         http_status = ?3, size_bytes = ?4, document = ?5
                     WHERE id = ?6",
                    params![now, mime_type, http_status as i64, size_bytes as i64, body, url_id],
                )
                .map_err(classify)?;
                host_policy::record_success(&mut host_row, now, http_status as i64);
                for link in &links {
                    insert_url_checked(&tx, link, now, link_distance + 1)?;
                }
            }
            FetchOutcome::Error { kind, detail: _ } => match kind {
                ErrorKind::Timeout => {
                    host_policy::record_timeout(&mut host_row, now, &host_config);
                    apply_retry_or_terminal(&tx, url_id, retries, max_retries, "")?;
                }
                ErrorKind::DnsPermanent => {
                    host_policy::record_dns_failure(&mut host_row, now);
                    apply_retry_or_terminal(&tx, url_id, retries, max_retries, "")?;
                }
                ErrorKind::Terminal => {
                    host_policy::record_failure(&mut host_row, now, None);
                    tx.execute("UPDATE urls SET status = 'error' WHERE id = ?1", params![url_id])
                        .map_err(classify)?;
                }
                ErrorKind::Transient | ErrorKind::ParseFailure => {
                    host_policy::record_failure(&mut host_row, now, None);
                    apply_retry_or_terminal(&tx, url_id, retries, max_retries, "")?;
                }
            },
        }

        persist_host_row(&tx, &host_row)?;
        tx.commit().map_err(classify)?;
        Ok(())
    }

    pub fn apply_parse_result(&mut self, url_id: i64, outcome: ParseOutcome, now: i64) -> Result<()> {
        let max_retries = self.config.max_retries;
        let tx = self.immediate()?;

        let (url, retries): (String, i64) = tx
            .query_row("SELECT url, retries FROM urls WHERE id = ?1", params![url_id], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .map_err(classify)?;

        match outcome {
            ParseOutcome::Success { tunes } => {
                let has_abc = !tunes.is_empty();
                tx.execute(
                    "UPDATE urls SET status = 'parsed', has_abc = ?1 WHERE id = ?2",
                    params![has_abc as i64, url_id],
                )
                .map_err(classify)?;

                if has_abc {
                    tx.execute(
                        "INSERT OR IGNORE INTO tunebooks (url, url_id, status, created_at)
                         VALUES (?1, ?2, 'new', ?3)",
                        params![url, url_id, now],
                    )
                    .map_err(classify)?;
                    let tunebook_id: i64 = tx
                        .query_row("SELECT id FROM tunebooks WHERE url = ?1", params![url], |row| {
                            row.get(0)
                        })
                        .map_err(classify)?;
                    // Replaying the same Parser RESULT must leave the store
                    // unchanged (§8's round-trip law): the tunebook insert
                    // above short-circuits on `url UNIQUE`, so clear any
                    // tunes from a prior application of this same result
                    // before re-inserting, rather than accumulating
                    // duplicates with no uniqueness constraint of their own.
                    tx.execute("DELETE FROM tunes WHERE tunebook_id = ?1", params![tunebook_id])
                        .map_err(classify)?;
                    for tune in tunes {
                        tx.execute(
                            "INSERT INTO tunes (tunebook_id, title, composer, key, rhythm, tune_body, pitches)
                             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                            params![
                                tunebook_id,
                                tune.title,
                                tune.composer,
                                tune.key,
                                tune.rhythm,
                                tune.tune_body,
                                tune.pitches,
                            ],
                        )
                        .map_err(classify)?;
                    }
                }
            }
            ParseOutcome::Error { kind, detail: _ } => match kind {
                ErrorKind::Terminal => {
                    tx.execute("UPDATE urls SET status = 'error' WHERE id = ?1", params![url_id])
                        .map_err(classify)?;
                }
                _ => apply_retry_or_terminal(&tx, url_id, retries, max_retries, "fetched")?,
            },
        }

        tx.commit().map_err(classify)?;
        Ok(())
    }

    /// Indexer failures have no terminal status of their own — `Tunebook`
    /// only declares `new`/`indexing`/`indexed` — so a failed claim always
    /// reverts to `new` and is retried; `retries` is kept for observability,
    /// not as a gate to a dead-end state.
    pub fn apply_index_result(&mut self, tunebook_id: i64, outcome: IndexOutcome) -> Result<()> {
        let tx = self.immediate()?;
        let url_id: i64 = tx
            .query_row("SELECT url_id FROM tunebooks WHERE id = ?1", params![tunebook_id], |row| {
                row.get(0)
            })
            .map_err(classify)?;

        match outcome {
            IndexOutcome::Success { intervals_by_tune } => {
                for (tune_id, intervals) in intervals_by_tune {
                    let joined = intervals.iter().map(i32::to_string).collect::<Vec<_>>().join(",");
                    tx.execute("UPDATE tunes SET intervals = ?1 WHERE id = ?2", params![joined, tune_id])
                        .map_err(classify)?;
                }
                tx.execute("UPDATE tunebooks SET status = 'indexed' WHERE id = ?1", params![tunebook_id])
                    .map_err(classify)?;
                tx.execute("UPDATE urls SET status = 'indexed' WHERE id = ?1", params![url_id])
                    .map_err(classify)?;
            }
            IndexOutcome::Error { .. } => {
                tx.execute(
                    "UPDATE tunebooks SET status = 'new', retries = retries + 1 WHERE id = ?1",
                    params![tunebook_id],
                )
                .map_err(classify)?;
                tx.execute("UPDATE urls SET status = 'parsed' WHERE id = ?1", params![url_id])
                    .map_err(classify)?;
            }
        }

        tx.commit().map_err(classify)?;
        Ok(())
    }

    /// Reverts any URL (and any tunebook claimed by an indexer) whose
    /// `dispatched_at` predates `now - ttl`. Returns the number of rows
    /// touched, across both tables.
    pub fn release_stuck(&mut self, now: i64, ttl: i64) -> Result<usize> {
        let tx = self.immediate()?;
        let n = release_inflight(&tx, Some(now - ttl))?;
        tx.commit().map_err(classify)?;
        Ok(n)
    }

    /// One-shot variant of `release_stuck` covering every in-flight row
    /// regardless of age, run once before the Dispatcher accepts
    /// connections.
    pub fn reset_on_startup(&mut self) -> Result<usize> {
        let tx = self.immediate()?;
        let n = release_inflight(&tx, None)?;
        tx.commit().map_err(classify)?;
        Ok(n)
    }

    pub fn host_touch(&mut self, host: &str, now: i64) -> Result<()> {
        let tx = self.immediate()?;
        tx.execute("INSERT OR IGNORE INTO hosts (host) VALUES (?1)", params![host])
            .map_err(classify)?;
        tx.execute("UPDATE hosts SET last_access = ?1 WHERE host = ?2", params![now, host])
            .map_err(classify)?;
        tx.commit().map_err(classify)?;
        Ok(())
    }

    pub fn host_disable(&mut self, host: &str, reason: DisabledReason, now: i64) -> Result<()> {
        let tx = self.immediate()?;
        tx.execute(
            "UPDATE hosts SET disabled = 1, disabled_reason = ?1, disabled_at = ?2
             WHERE host = ?3 AND disabled = 0",
            params![reason.as_db_str(), now, host],
        )
        .map_err(classify)?;
        tx.commit().map_err(classify)?;
        Ok(())
    }

    pub fn host_enable(&mut self, host: &str) -> Result<()> {
        let tx = self.immediate()?;
        tx.execute(
            "UPDATE hosts SET disabled = 0, disabled_reason = NULL, disabled_at = NULL,
             consecutive_timeouts = 0 WHERE host = ?1",
            params![host],
        )
        .map_err(classify)?;
        tx.commit().map_err(classify)?;
        Ok(())
    }

    pub fn host_stats(&self, host: &str) -> Result<Option<HostRow>> {
        self.conn
            .query_row(HOST_SELECT, params![host], row_to_host)
            .optional()
            .map_err(classify)
    }

    pub fn disabled_hosts(&self) -> Result<Vec<HostRow>> {
        let mut stmt = self
            .conn
            .prepare("SELECT host, last_access, last_http_status, downloads, disabled, disabled_reason, disabled_at, consecutive_timeouts FROM hosts WHERE disabled = 1")
            .map_err(classify)?;
        let rows = stmt
            .query_map([], row_to_host)
            .map_err(classify)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(classify)?;
        Ok(rows)
    }

    /// Called by the Purger: re-enables every host whose timeout-originated
    /// block has outlived the configured cooldown. Returns the hosts
    /// re-enabled.
    pub fn reenable_timed_out_hosts(&mut self, now: i64) -> Result<Vec<String>> {
        let cutoff = now - self.config.host_policy.host_timeout_reenable_hours * 3600;
        let tx = self.immediate()?;
        let hosts: Vec<String> = {
            let mut stmt = tx
                .prepare("SELECT host FROM hosts WHERE disabled = 1 AND disabled_reason = 'timeout' AND disabled_at < ?1")
                .map_err(classify)?;
            stmt.query_map(params![cutoff], |row| row.get(0))
                .map_err(classify)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(classify)?
        };
        for host in &hosts {
            tx.execute(
                "UPDATE hosts SET disabled = 0, disabled_reason = NULL, disabled_at = NULL,
                 consecutive_timeouts = 0 WHERE host = ?1",
                params![host],
            )
            .map_err(classify)?;
        }
        tx.commit().map_err(classify)?;
        Ok(hosts)
    }

    pub fn get_url(&self, id: i64) -> Result<Option<UrlRow>> {
        self.conn.query_row(URL_SELECT, params![id], row_to_url).optional().map_err(classify)
    }

    pub fn tunes_for_tunebook(&self, tunebook_id: i64) -> Result<Vec<TuneRow>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, tunebook_id, title, composer, key, rhythm, tune_body, pitches, intervals
                 FROM tunes WHERE tunebook_id = ?1",
            )
            .map_err(classify)?;
        let rows = stmt
            .query_map(params![tunebook_id], |row| {
                Ok(TuneRow {
                    id: row.get(0)?,
                    tunebook_id: row.get(1)?,
                    title: row.get(2)?,
                    composer: row.get(3)?,
                    key: row.get(4)?,
                    rhythm: row.get(5)?,
                    tune_body: row.get(6)?,
                    pitches: row.get(7)?,
                    intervals: row.get(8)?,
                })
            })
            .map_err(classify)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(classify)?;
        Ok(rows)
    }

    /// Writes the `"erased"` tombstone sentinel over a URL's `document`
    /// payload, per the Purger's erasure contract.
    pub fn erase_document(&mut self, url_id: i64) -> Result<()> {
        let tx = self.immediate()?;
        tx.execute("UPDATE urls SET document = ?1 WHERE id = ?2", params![ERASED_SENTINEL, url_id])
            .map_err(classify)?;
        tx.commit().map_err(classify)?;
        Ok(())
    }

    pub fn urls_eligible_for_erasure(&self, older_than: i64) -> Result<Vec<i64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM urls WHERE document IS NOT NULL AND document != ?1 AND downloaded_at IS NOT NULL AND downloaded_at < ?2")
            .map_err(classify)?;
        let ids = stmt
            .query_map(params![ERASED_SENTINEL, older_than], |row| row.get(0))
            .map_err(classify)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(classify)?;
        Ok(ids)
    }

    pub fn url_status_counts(&self) -> Result<Vec<(String, i64)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT status, COUNT(*) FROM urls GROUP BY status")
            .map_err(classify)?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
            .map_err(classify)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(classify)?;
        Ok(rows)
    }

    pub fn upsert_worker_process(
        &mut self,
        role: &str,
        id: &str,
        pid: Option<i64>,
        status: &str,
        started_at: Option<i64>,
    ) -> Result<()> {
        let tx = self.immediate()?;
        tx.execute(
            "INSERT INTO worker_processes (role, id, pid, status, started_at) VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(role, id) DO UPDATE SET pid = excluded.pid, status = excluded.status, started_at = excluded.started_at",
            params![role, id, pid, status, started_at],
        )
        .map_err(classify)?;
        tx.commit().map_err(classify)?;
        Ok(())
    }

    pub fn list_worker_processes(&self) -> Result<Vec<(String, String, Option<i64>, String, Option<i64>)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT role, id, pid, status, started_at FROM worker_processes")
            .map_err(classify)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
            })
            .map_err(classify)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(classify)?;
        Ok(rows)
    }
}

const URL_SELECT: &str = "SELECT id, url, host, status, created_at, dispatched_at, downloaded_at, \
     mime_type, http_status, size_bytes, document, has_abc, url_extension, link_distance, retries \
     FROM urls WHERE id = ?1";

const HOST_SELECT: &str = "SELECT host, last_access, last_http_status, downloads, disabled, \
     disabled_reason, disabled_at, consecutive_timeouts FROM hosts WHERE host = ?1";

fn insert_url(tx: &Transaction, url: &str, host: &str, now: i64, link_distance: i64) -> Result<Option<i64>> {
    tx.execute("INSERT OR IGNORE INTO hosts (host) VALUES (?1)", params![host]).map_err(classify)?;
    let extension = Store::url_extension(url);
    let changed = tx
        .execute(
            "INSERT OR IGNORE INTO urls (url, host, status, created_at, url_extension, link_distance)
             VALUES (?1, ?2, '', ?3, ?4, ?5)",
            params![url, host, now, extension, link_distance],
        )
        .map_err(classify)?;
    Ok((changed > 0).then(|| tx.last_insert_rowid()))
}

fn insert_url_checked(tx: &Transaction, url: &str, now: i64, link_distance: i64) -> Result<()> {
    let Some(host) = Store::extract_host(url) else { return Ok(()) };
    insert_url(tx, url, &host, now, link_distance)?;
    Ok(())
}

fn claim_fetch(tx: &Transaction, now: i64, cooldown: i64, abc_ext: &str) -> Result<Option<UrlRow>> {
    let claimed = tx
        .query_row(
            "UPDATE urls
             SET status = 'dispatched', dispatched_at = ?1
             WHERE id = (
                 SELECT u.id FROM urls u
                 JOIN hosts h ON h.host = u.host
                 WHERE u.status = ''
                   AND h.disabled = 0
                   AND (h.last_access IS NULL OR ?1 - h.last_access >= ?2)
                 ORDER BY (u.url_extension = ?3) DESC, u.created_at ASC, u.id ASC
                 LIMIT 1
             )
             RETURNING id, url, host, status, created_at, dispatched_at, downloaded_at, mime_type,
                       http_status, size_bytes, document, has_abc, url_extension, link_distance, retries",
            params![now, cooldown, abc_ext],
            row_to_url,
        )
        .optional()
        .map_err(classify)?;

    // Bump the host's `last_access` at dispatch time, not completion — the
    // cooldown gate above only reads `last_access`, so without this a host
    // with an in-flight dispatch still looks idle to a second concurrent
    // claim in the same transaction window.
    if let Some(row) = &claimed {
        tx.execute("UPDATE hosts SET last_access = ?1 WHERE host = ?2", params![now, row.host])
            .map_err(classify)?;
    }

    Ok(claimed)
}

fn claim_parse(tx: &Transaction, now: i64) -> Result<Option<UrlRow>> {
    tx.query_row(
        "UPDATE urls
         SET status = 'parsing', dispatched_at = ?1
         WHERE id = (
             SELECT id FROM urls WHERE status = 'fetched' ORDER BY dispatched_at ASC, id ASC LIMIT 1
         )
         RETURNING id, url, host, status, created_at, dispatched_at, downloaded_at, mime_type,
                   http_status, size_bytes, document, has_abc, url_extension, link_distance, retries",
        params![now],
        row_to_url,
    )
    .optional()
    .map_err(classify)
}

fn claim_index(tx: &Transaction, now: i64) -> Result<Option<(TunebookRow, Vec<TuneForIndex>)>> {
    let tunebook = tx
        .query_row(
            "UPDATE tunebooks
             SET status = 'indexing'
             WHERE id = (
                 SELECT id FROM tunebooks WHERE status = 'new' ORDER BY created_at ASC, id ASC LIMIT 1
             )
             RETURNING id, url, url_id, status, created_at, retries",
            [],
            row_to_tunebook,
        )
        .optional()
        .map_err(classify)?;

    let Some(tunebook) = tunebook else { return Ok(None) };

    tx.execute(
        "UPDATE urls SET status = 'indexing', dispatched_at = ?1 WHERE id = ?2",
        params![now, tunebook.url_id],
    )
    .map_err(classify)?;

    let tunes = {
        let mut stmt = tx.prepare("SELECT id, pitches FROM tunes WHERE tunebook_id = ?1").map_err(classify)?;
        stmt.query_map(params![tunebook.id], |row| {
            Ok(TuneForIndex {
                tune_id: row.get(0)?,
                pitches: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
            })
        })
        .map_err(classify)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(classify)?
    };

    Ok(Some((tunebook, tunes)))
}

fn apply_retry_or_terminal(
    tx: &Transaction,
    url_id: i64,
    retries_before: i64,
    max_retries: i64,
    revert_status: &str,
) -> Result<()> {
    let new_retries = retries_before + 1;
    let status = if new_retries < max_retries { revert_status } else { "error" };
    tx.execute(
        "UPDATE urls SET retries = ?1, status = ?2 WHERE id = ?3",
        params![new_retries, status, url_id],
    )
    .map_err(classify)?;
    Ok(())
}

fn release_inflight(tx: &Transaction, cutoff: Option<i64>) -> Result<usize> {
    let mut total = 0usize;

    total += match cutoff {
        Some(c) => tx.execute(
            "UPDATE tunebooks SET status = 'new'
             WHERE status = 'indexing'
               AND url_id IN (SELECT id FROM urls WHERE status = 'indexing' AND dispatched_at < ?1)",
            params![c],
        ),
        None => tx.execute(
            "UPDATE tunebooks SET status = 'new'
             WHERE status = 'indexing' AND url_id IN (SELECT id FROM urls WHERE status = 'indexing')",
            [],
        ),
    }
    .map_err(classify)?;

    total += match cutoff {
        Some(c) => tx.execute(
            "UPDATE urls SET status = '', dispatched_at = NULL WHERE status = 'dispatched' AND dispatched_at < ?1",
            params![c],
        ),
        None => tx.execute("UPDATE urls SET status = '', dispatched_at = NULL WHERE status = 'dispatched'", []),
    }
    .map_err(classify)?;

    total += match cutoff {
        Some(c) => tx.execute(
            "UPDATE urls SET status = 'fetched', dispatched_at = NULL WHERE status = 'parsing' AND dispatched_at < ?1",
            params![c],
        ),
        None => tx.execute("UPDATE urls SET status = 'fetched', dispatched_at = NULL WHERE status = 'parsing'", []),
    }
    .map_err(classify)?;

    total += match cutoff {
        Some(c) => tx.execute(
            "UPDATE urls SET status = 'parsed', dispatched_at = NULL WHERE status = 'indexing' AND dispatched_at < ?1",
            params![c],
        ),
        None => tx.execute("UPDATE urls SET status = 'parsed', dispatched_at = NULL WHERE status = 'indexing'", []),
    }
    .map_err(classify)?;

    Ok(total)
}

fn fetch_host_row(tx: &Transaction, host: &str) -> Result<HostRow> {
    tx.query_row(HOST_SELECT, params![host], row_to_host).map_err(classify)
}

fn persist_host_row(tx: &Transaction, host: &HostRow) -> Result<()> {
    tx.execute(
        "UPDATE hosts SET last_access = ?1, last_http_status = ?2, downloads = ?3, disabled = ?4,
         disabled_reason = ?5, disabled_at = ?6, consecutive_timeouts = ?7 WHERE host = ?8",
        params![
            host.last_access,
            host.last_http_status,
            host.downloads,
            host.disabled as i64,
            host.disabled_reason.map(|r| r.as_db_str()),
            host.disabled_at,
            host.consecutive_timeouts,
            host.host,
        ],
    )
    .map_err(classify)?;
    Ok(())
}

fn row_to_url(row: &rusqlite::Row) -> rusqlite::Result<UrlRow> {
    Ok(UrlRow {
        id: row.get(0)?,
        url: row.get(1)?,
        host: row.get(2)?,
        status: UrlStatus::from_db_str(&row.get::<_, String>(3)?),
        created_at: row.get(4)?,
        dispatched_at: row.get(5)?,
        downloaded_at: row.get(6)?,
        mime_type: row.get(7)?,
        http_status: row.get(8)?,
        size_bytes: row.get(9)?,
        document: row.get(10)?,
        has_abc: row.get::<_, i64>(11)? != 0,
        url_extension: row.get(12)?,
        link_distance: row.get(13)?,
        retries: row.get(14)?,
    })
}

fn row_to_tunebook(row: &rusqlite::Row) -> rusqlite::Result<TunebookRow> {
    Ok(TunebookRow {
        id: row.get(0)?,
        url: row.get(1)?,
        url_id: row.get(2)?,
        status: TunebookStatus::from_db_str(&row.get::<_, String>(3)?),
        created_at: row.get(4)?,
        retries: row.get(5)?,
    })
}

fn row_to_host(row: &rusqlite::Row) -> rusqlite::Result<HostRow> {
    Ok(HostRow {
        host: row.get(0)?,
        last_access: row.get(1)?,
        last_http_status: row.get(2)?,
        downloads: row.get(3)?,
        disabled: row.get::<_, i64>(4)? != 0,
        disabled_reason: row
            .get::<_, Option<String>>(5)?
            .and_then(|s| DisabledReason::from_db_str(&s)),
        disabled_at: row.get(6)?,
        consecutive_timeouts: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crawl_protocol::messages::ParsedTune;

    fn store() -> Store {
        Store::open_in_memory(StoreConfig::default()).unwrap()
    }

    #[test]
    fn claim_on_empty_store_returns_none() {
        let mut s = store();
        assert!(s.claim_next_url(WorkKind::Fetch, 0).unwrap().is_none());
    }

    #[test]
    fn seeded_url_is_claimable_exactly_once() {
        let mut s = store();
        s.seed_url("http://h1/x.abc", 0, 0).unwrap();

        let first = s.claim_next_url(WorkKind::Fetch, 1).unwrap();
        assert!(matches!(first, Some(ClaimedWork::Fetch(_))));

        let second = s.claim_next_url(WorkKind::Fetch, 2).unwrap();
        assert!(second.is_none(), "the same row must not be claimable twice");
    }

    #[test]
    fn duplicate_seed_is_a_no_op() {
        let mut s = store();
        let first = s.seed_url("http://h1/x.abc", 0, 0).unwrap();
        let second = s.seed_url("http://h1/x.abc", 5, 0).unwrap();
        assert!(first.is_some());
        assert!(second.is_none());
    }

    #[test]
    fn abc_extension_preempts_older_non_abc_rows() {
        let mut s = store();
        for i in 0..3 {
            s.seed_url(&format!("http://h1/plain{i}.html"), i, 0).unwrap();
        }
        s.seed_url("http://h1/tune.abc", 100, 0).unwrap();

        match s.claim_next_url(WorkKind::Fetch, 100).unwrap() {
            Some(ClaimedWork::Fetch(row)) => assert_eq!(row.url, "http://h1/tune.abc"),
            other => panic!("expected the abc row, got {other:?}"),
        }
    }

    #[test]
    fn host_cooldown_skips_to_a_different_host() {
        let mut s = store();
        s.seed_url("http://h1/a", 0, 0).unwrap();
        s.seed_url("http://h2/c", 0, 0).unwrap();

        match s.claim_next_url(WorkKind::Fetch, 0).unwrap() {
            Some(ClaimedWork::Fetch(row)) => assert_eq!(row.host, "h1"),
            other => panic!("unexpected {other:?}"),
        }
        s.apply_fetch_result(
            1,
            FetchOutcome::Success {
                http_status: 200,
                mime_type: "text/html".into(),
                size_bytes: 10,
                body: "hi".into(),
                links: vec![],
            },
            0,
        )
        .unwrap();

        // h1 is within cooldown; only h2's row should be eligible.
        match s.claim_next_url(WorkKind::Fetch, 5).unwrap() {
            Some(ClaimedWork::Fetch(row)) => assert_eq!(row.host, "h2"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn retry_ladder_reaches_error_on_the_third_timeout() {
        let mut s = store();
        s.seed_url("http://h/x", 0, 0).unwrap();

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

        let host = s.host_stats("h").unwrap().unwrap();
        assert!(host.disabled);
        assert_eq!(host.disabled_reason, Some(DisabledReason::Timeout));
    }

    #[test]
    fn dns_permanent_failure_disables_the_host_immediately() {
        let mut s = store();
        s.seed_url("http://bad-host/x", 0, 0).unwrap();
        s.claim_next_url(WorkKind::Fetch, 0).unwrap();
        s.apply_fetch_result(
            1,
            FetchOutcome::Error { kind: ErrorKind::DnsPermanent, detail: "nxdomain".into() },
            0,
        )
        .unwrap();

        let host = s.host_stats("bad-host").unwrap().unwrap();
        assert!(host.disabled);
        assert_eq!(host.disabled_reason, Some(DisabledReason::Dns));
    }

    #[test]
    fn full_pipeline_reaches_indexed() {
        let mut s = store();
        s.seed_url("http://h1/x.abc", 0, 0).unwrap();

        s.claim_next_url(WorkKind::Fetch, 0).unwrap();
        s.apply_fetch_result(
            1,
            FetchOutcome::Success {
                http_status: 200,
                mime_type: "text/vnd.abc".into(),
                size_bytes: 20,
                body: "X:1\nT:Reel\nK:Gmaj\nABC".into(),
                links: vec![],
            },
            0,
        )
        .unwrap();
        assert!(matches!(s.get_url(1).unwrap().unwrap().status, UrlStatus::Fetched));

        s.claim_next_url(WorkKind::Parse, 1).unwrap();
        s.apply_parse_result(
            1,
            ParseOutcome::Success {
                tunes: vec![ParsedTune {
                    title: "Reel".into(),
                    composer: String::new(),
                    key: "Gmaj".into(),
                    rhythm: String::new(),
                    tune_body: "ABC".into(),
                    pitches: "67,69,71".into(),
                }],
            },
            1,
        )
        .unwrap();
        let row = s.get_url(1).unwrap().unwrap();
        assert!(matches!(row.status, UrlStatus::Parsed));
        assert!(row.has_abc);

        let (tunebook, tunes) = match s.claim_next_url(WorkKind::Index, 2).unwrap() {
            Some(ClaimedWork::Index(book, tunes)) => (book, tunes),
            other => panic!("expected index claim, got {other:?}"),
        };
        assert_eq!(tunes.len(), 1);

        let mut intervals_by_tune = std::collections::HashMap::new();
        intervals_by_tune.insert(tunes[0].tune_id, vec![2, 2]);
        s.apply_index_result(tunebook.id, IndexOutcome::Success { intervals_by_tune }).unwrap();

        let row = s.get_url(1).unwrap().unwrap();
        assert!(matches!(row.status, UrlStatus::Indexed));
    }

    #[test]
    fn replaying_a_parse_result_does_not_duplicate_tunes() {
        let mut s = store();
        s.seed_url("http://h1/x.abc", 0, 0).unwrap();
        s.claim_next_url(WorkKind::Fetch, 0).unwrap();
        s.apply_fetch_result(
            1,
            FetchOutcome::Success {
                http_status: 200,
                mime_type: "text/vnd.abc".into(),
                size_bytes: 20,
                body: "X:1\nT:Reel\nK:Gmaj\nABC".into(),
                links: vec![],
            },
            0,
        )
        .unwrap();

        let outcome = || ParseOutcome::Success {
            tunes: vec![ParsedTune {
                title: "Reel".into(),
                composer: String::new(),
                key: "Gmaj".into(),
                rhythm: String::new(),
                tune_body: "ABC".into(),
                pitches: "67,69,71".into(),
            }],
        };

        s.apply_parse_result(1, outcome(), 1).unwrap();
        let first_count = s.tunes_for_tunebook(1).unwrap().len();

        // Replay the exact same RESULT, as would happen if a worker's
        // acknowledgement was lost and the Dispatcher re-applied it.
        s.apply_parse_result(1, outcome(), 1).unwrap();
        let second_count = s.tunes_for_tunebook(1).unwrap().len();

        assert_eq!(first_count, 1);
        assert_eq!(second_count, 1, "replaying the same parse result must not duplicate tunes");
    }

    #[test]
    fn reset_on_startup_reverts_every_in_flight_status() {
        let mut s = store();
        s.seed_url("http://h/a", 0, 0).unwrap();
        s.seed_url("http://h/b", 0, 0).unwrap();
        s.claim_next_url(WorkKind::Fetch, 0).unwrap();
        // simulate a crash: row left in `dispatched`

        let n = s.reset_on_startup().unwrap();
        assert_eq!(n, 1);
        let row = s.get_url(1).unwrap().unwrap();
        assert!(matches!(row.status, UrlStatus::New));
        assert!(row.dispatched_at.is_none());
    }

    #[test]
    fn release_stuck_only_reverts_rows_past_the_ttl() {
        let mut s = store();
        s.seed_url("http://h/a", 0, 0).unwrap();
        s.claim_next_url(WorkKind::Fetch, 0).unwrap();

        assert_eq!(s.release_stuck(50, 120).unwrap(), 0);
        assert_eq!(s.release_stuck(121, 120).unwrap(), 1);
        assert!(matches!(s.get_url(1).unwrap().unwrap().status, UrlStatus::New));
    }
}
