/// DDL for the five core tables plus the supervisor's process registry,
/// applied idempotently at startup. Mirrors the teacher's
/// `metrics_store::init_db` shape: one `execute_batch` of
/// `CREATE TABLE IF NOT EXISTS` statements, called once before any other
/// query runs.

use rusqlite::Connection;

use crate::error::{classify, Result};

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS urls (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL UNIQUE,
    host TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT '',
    created_at INTEGER NOT NULL,
    dispatched_at INTEGER,
    downloaded_at INTEGER,
    mime_type TEXT,
    http_status INTEGER,
    size_bytes INTEGER,
    document TEXT,
    has_abc INTEGER NOT NULL DEFAULT 0,
    url_extension TEXT,
    link_distance INTEGER NOT NULL DEFAULT 0,
    retries INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_urls_status_host ON urls(status, host);
CREATE INDEX IF NOT EXISTS idx_urls_extension ON urls(url_extension);
CREATE INDEX IF NOT EXISTS idx_urls_dispatched_at ON urls(dispatched_at);

CREATE TABLE IF NOT EXISTS hosts (
    host TEXT PRIMARY KEY,
    last_access INTEGER,
    last_http_status INTEGER,
    downloads INTEGER NOT NULL DEFAULT 0,
    disabled INTEGER NOT NULL DEFAULT 0,
    disabled_reason TEXT,
    disabled_at INTEGER,
    consecutive_timeouts INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS tunebooks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL UNIQUE,
    url_id INTEGER NOT NULL REFERENCES urls(id),
    status TEXT NOT NULL DEFAULT 'new',
    created_at INTEGER NOT NULL,
    retries INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_tunebooks_status_created ON tunebooks(status, created_at);

CREATE TABLE IF NOT EXISTS tunes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    tunebook_id INTEGER NOT NULL REFERENCES tunebooks(id),
    title TEXT,
    composer TEXT,
    key TEXT,
    rhythm TEXT,
    tune_body TEXT,
    pitches TEXT,
    intervals TEXT
);
CREATE INDEX IF NOT EXISTS idx_tunes_tunebook ON tunes(tunebook_id);

CREATE TABLE IF NOT EXISTS vector_mappings (
    external_id INTEGER PRIMARY KEY,
    tune_id INTEGER NOT NULL UNIQUE REFERENCES tunes(id)
);

CREATE TABLE IF NOT EXISTS worker_processes (
    role TEXT NOT NULL,
    id TEXT NOT NULL,
    pid INTEGER,
    status TEXT NOT NULL DEFAULT 'stopped',
    started_at INTEGER,
    PRIMARY KEY (role, id)
);
";

pub fn init(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL").map_err(classify)?;
    conn.pragma_update(None, "foreign_keys", true).map_err(classify)?;
    conn.execute_batch(SCHEMA_SQL).map_err(classify)?;
    Ok(())
}
