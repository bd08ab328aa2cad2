//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::state::{CrawlDatum, CrawlStatus};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage backend is closed")]
    Closed,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Sled error: {0}")]
    Sled(#[from] sled::Error),

    /// No connection could be checked out or opened
    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),
}

impl StorageError {
    /// Returns true if the backend can no longer be used
    ///
    /// Fatal errors stop the crawl. Anything else (a single record that
    /// failed to encode, a constraint hiccup) is logged and skipped.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Closed | Self::Io(_) | Self::Pool(_) => true,
            Self::Database(_) | Self::Serialization(_) => false,
            Self::Sled(e) => matches!(
                e,
                sled::Error::Io(_) | sled::Error::Corruption { .. } | sled::Error::ReportableBug(_)
            ),
            Self::Sqlite(e) => matches!(
                e.sqlite_error_code(),
                Some(
                    rusqlite::ErrorCode::CannotOpen
                        | rusqlite::ErrorCode::NotADatabase
                        | rusqlite::ErrorCode::DatabaseCorrupt
                        | rusqlite::ErrorCode::SystemIoFailure
                        | rusqlite::ErrorCode::DiskFull
                        | rusqlite::ErrorCode::ReadOnly
                )
            ),
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// Every backend owns its long-lived handle and is shared between workers, so
/// all operations take `&self`. Records are keyed by normalized URL.
pub trait Storage: Send + Sync {
    /// Registry key of the backend ("memory", "sled", "sqlite")
    fn name(&self) -> &'static str;

    /// Inserts or replaces the record for `datum.url`
    ///
    /// Saving the same datum twice leaves the store as if it had been saved once.
    fn save(&self, datum: &CrawlDatum) -> StorageResult<()>;

    /// Returns true if a record exists for the URL
    fn exists(&self, url: &str) -> StorageResult<bool>;

    /// Gets the record for a URL
    fn get(&self, url: &str) -> StorageResult<Option<CrawlDatum>>;

    /// Loads every record, ordered by URL
    fn load_all(&self) -> StorageResult<Vec<CrawlDatum>>;

    /// Gets total record count
    fn count(&self) -> StorageResult<u64>;

    /// Counts records in a specific status
    fn count_by_status(&self, status: CrawlStatus) -> StorageResult<u64>;

    /// Deletes every record in a specific status
    ///
    /// # Returns
    ///
    /// The number of records removed
    fn prune(&self, status: CrawlStatus) -> StorageResult<u64>;

    /// Deletes every record
    fn clear(&self) -> StorageResult<()>;

    /// Flushes and releases the backend handle
    ///
    /// Closing twice is a no-op; any other operation after `close` fails with
    /// `StorageError::Closed`.
    fn close(&self) -> StorageResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(StorageError::Closed.is_fatal());
        assert!(StorageError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk")).is_fatal());
        assert!(!StorageError::Serialization("bad".to_string()).is_fatal());
        assert!(!StorageError::Database("constraint".to_string()).is_fatal());
    }

    #[test]
    fn test_sqlite_open_failure_is_fatal() {
        let err = rusqlite::Connection::open("/nonexistent-dir/sub/harvest.db").unwrap_err();
        assert!(StorageError::from(err).is_fatal());
    }
}
