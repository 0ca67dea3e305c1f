/// Typed rows and enums over the `urls` / `hosts` / `tunebooks` / `tunes`
/// tables. Status enums map to the literal strings named in spec §6 so the
/// on-disk/JSON vocabulary matches exactly, including the empty-string
/// spelling of "new".

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UrlStatus {
    New,
    Dispatched,
    Fetched,
    Parsing,
    Parsed,
    Indexing,
    Indexed,
    Error,
}

impl UrlStatus {
    /// The literal string stored in the `status` column / exposed over the
    /// wire. `New` is deliberately the empty string — see DESIGN.md.
    pub fn as_db_str(self) -> &'static str {
        match self {
            UrlStatus::New => "",
            UrlStatus::Dispatched => "dispatched",
            UrlStatus::Fetched => "fetched",
            UrlStatus::Parsing => "parsing",
            UrlStatus::Parsed => "parsed",
            UrlStatus::Indexing => "indexing",
            UrlStatus::Indexed => "indexed",
            UrlStatus::Error => "error",
        }
    }

    pub fn from_db_str(s: &str) -> Self {
        match s {
            "dispatched" => UrlStatus::Dispatched,
            "fetched" => UrlStatus::Fetched,
            "parsing" => UrlStatus::Parsing,
            "parsed" => UrlStatus::Parsed,
            "indexing" => UrlStatus::Indexing,
            "indexed" => UrlStatus::Indexed,
            "error" => UrlStatus::Error,
            _ => UrlStatus::New,
        }
    }

    /// True for `dispatched` / `parsing` / `indexing` — the in-flight set.
    pub fn is_in_flight(self) -> bool {
        matches!(self, UrlStatus::Dispatched | UrlStatus::Parsing | UrlStatus::Indexing)
    }

    /// The queueable status an in-flight status reverts to on release.
    pub fn predecessor(self) -> UrlStatus {
        match self {
            UrlStatus::Dispatched => UrlStatus::New,
            UrlStatus::Parsing => UrlStatus::Fetched,
            UrlStatus::Indexing => UrlStatus::Parsed,
            other => other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TunebookStatus {
    New,
    Indexing,
    Indexed,
}

impl TunebookStatus {
    pub fn as_db_str(self) -> &'static str {
        match self {
            TunebookStatus::New => "new",
            TunebookStatus::Indexing => "indexing",
            TunebookStatus::Indexed => "indexed",
        }
    }

    pub fn from_db_str(s: &str) -> Self {
        match s {
            "indexing" => TunebookStatus::Indexing,
            "indexed" => TunebookStatus::Indexed,
            _ => TunebookStatus::New,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisabledReason {
    Dns,
    Timeout,
    Manual,
}

impl DisabledReason {
    pub fn as_db_str(self) -> &'static str {
        match self {
            DisabledReason::Dns => "dns",
            DisabledReason::Timeout => "timeout",
            DisabledReason::Manual => "manual",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "dns" => Some(DisabledReason::Dns),
            "timeout" => Some(DisabledReason::Timeout),
            "manual" => Some(DisabledReason::Manual),
            _ => None,
        }
    }
}

/// Sentinel written to `urls.document` once the Purger has erased a payload.
pub const ERASED_SENTINEL: &str = "erased";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UrlRow {
    pub id: i64,
    pub url: String,
    pub host: String,
    pub status: UrlStatus,
    pub created_at: i64,
    pub dispatched_at: Option<i64>,
    pub downloaded_at: Option<i64>,
    pub mime_type: Option<String>,
    pub http_status: Option<i64>,
    pub size_bytes: Option<i64>,
    pub document: Option<String>,
    pub has_abc: bool,
    pub url_extension: Option<String>,
    pub link_distance: i64,
    pub retries: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostRow {
    pub host: String,
    pub last_access: Option<i64>,
    pub last_http_status: Option<i64>,
    pub downloads: i64,
    pub disabled: bool,
    pub disabled_reason: Option<DisabledReason>,
    pub disabled_at: Option<i64>,
    pub consecutive_timeouts: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TunebookRow {
    pub id: i64,
    pub url: String,
    pub url_id: i64,
    pub status: TunebookStatus,
    pub created_at: i64,
    pub retries: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TuneRow {
    pub id: i64,
    pub tunebook_id: i64,
    pub title: Option<String>,
    pub composer: Option<String>,
    pub key: Option<String>,
    pub rhythm: Option<String>,
    pub tune_body: Option<String>,
    pub pitches: Option<String>,
    pub intervals: Option<String>,
}
