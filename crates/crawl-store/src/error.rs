/// A single retryable error kind, matching the "store-unavailable fails all
/// callers with a single retryable kind" contract: callers only ever need to
/// ask `is_retryable()`, never match on SQLite error codes themselves.

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("sql error: {0}")]
    Sql(#[from] rusqlite::Error),
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Reclassify a raw rusqlite error: `SQLITE_BUSY`/`SQLITE_LOCKED` (another
/// writer holds the database) become the retryable `Unavailable` kind;
/// everything else is a genuine SQL error.
pub(crate) fn classify(err: rusqlite::Error) -> StoreError {
    use rusqlite::ffi::ErrorCode;
    if let rusqlite::Error::SqliteFailure(e, _) = &err {
        if matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) {
            return StoreError::Unavailable(err.to_string());
        }
    }
    StoreError::Sql(err)
}
