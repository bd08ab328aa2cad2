//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait,
//! backed by a small fixed-size pool of connections in WAL mode so several
//! workers (and several processes) can share one database file.

use crate::state::{CrawlDatum, CrawlStatus};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use chrono::{DateTime, Utc};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::RwLock;
use std::time::Duration;

/// How long a connection waits on a lock held by another writer
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// How long a caller waits for a free pooled connection
const CHECKOUT_TIMEOUT: Duration = Duration::from_secs(10);

const SELECT_COLUMNS: &str = "SELECT url, status, depth, retry_count, execute_count, http_code,
     discovered_at, fetched_at, error_message, metadata FROM crawl_datums";

type SqlitePool = Pool<SqliteConnectionManager>;

/// SQLite storage backend
pub struct SqliteStorage {
    pool: RwLock<Option<SqlitePool>>,
}

/// Per-connection setup: WAL, busy timeout and schema
fn configure_connection(conn: &mut Connection) -> rusqlite::Result<()> {
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA temp_store = MEMORY;
    ",
    )?;
    initialize_schema(conn)
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    /// * `pool_size` - Number of pooled connections (at least 1)
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path, pool_size: u32) -> StorageResult<Self> {
        let manager = SqliteConnectionManager::file(path).with_init(configure_connection);
        let pool = Pool::builder()
            .max_size(pool_size.max(1))
            .connection_timeout(CHECKOUT_TIMEOUT)
            .build(manager)?;

        tracing::debug!(
            "Opened SQLite store at {} with {} connections",
            path.display(),
            pool.max_size()
        );

        Ok(Self {
            pool: RwLock::new(Some(pool)),
        })
    }

    /// Creates an in-memory database (for testing)
    ///
    /// In-memory databases are private to their connection, so the pool holds
    /// one that is never recycled.
    #[cfg(test)]
    pub fn new_in_memory() -> StorageResult<Self> {
        let manager = SqliteConnectionManager::memory().with_init(|conn| initialize_schema(conn));
        let pool = Pool::builder()
            .max_size(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .build(manager)?;
        Ok(Self {
            pool: RwLock::new(Some(pool)),
        })
    }

    /// Returns a handle to the open pool; clones share the same connections
    fn handle(&self) -> StorageResult<SqlitePool> {
        let guard = self
            .pool
            .read()
            .map_err(|_| StorageError::Database("sqlite pool lock poisoned".to_string()))?;
        guard.clone().ok_or(StorageError::Closed)
    }

    /// Runs `f` with a pooled connection
    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> StorageResult<T>) -> StorageResult<T> {
        let conn = self.handle()?.get()?;
        f(&conn)
    }
}

/// Maps a row produced by `SELECT_COLUMNS` to a datum
fn row_to_datum(row: &Row<'_>) -> rusqlite::Result<CrawlDatum> {
    let status_str: String = row.get(1)?;
    let status = CrawlStatus::from_db_string(&status_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            1,
            Type::Text,
            format!("unknown crawl status '{}'", status_str).into(),
        )
    })?;

    let metadata_str: String = row.get(9)?;
    let metadata: BTreeMap<String, String> = serde_json::from_str(&metadata_str)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(9, Type::Text, Box::new(e)))?;

    let fetched_at = match row.get::<_, Option<String>>(7)? {
        Some(s) => Some(parse_timestamp(7, &s)?),
        None => None,
    };

    Ok(CrawlDatum {
        url: row.get(0)?,
        status,
        depth: row.get(2)?,
        retry_count: row.get(3)?,
        execute_count: row.get(4)?,
        http_code: row.get(5)?,
        discovered_at: parse_timestamp(6, &row.get::<_, String>(6)?)?,
        fetched_at,
        error_message: row.get(8)?,
        metadata,
    })
}

fn parse_timestamp(idx: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

impl Storage for SqliteStorage {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn save(&self, datum: &CrawlDatum) -> StorageResult<()> {
        let metadata = serde_json::to_string(&datum.metadata)?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO crawl_datums (url, status, depth, retry_count, execute_count,
                     http_code, discovered_at, fetched_at, error_message, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                 ON CONFLICT(url) DO UPDATE SET
                     status = excluded.status,
                     depth = excluded.depth,
                     retry_count = excluded.retry_count,
                     execute_count = excluded.execute_count,
                     http_code = excluded.http_code,
                     discovered_at = excluded.discovered_at,
                     fetched_at = excluded.fetched_at,
                     error_message = excluded.error_message,
                     metadata = excluded.metadata",
                params![
                    datum.url,
                    datum.status.to_db_string(),
                    datum.depth,
                    datum.retry_count,
                    datum.execute_count,
                    datum.http_code,
                    datum.discovered_at.to_rfc3339(),
                    datum.fetched_at.map(|t| t.to_rfc3339()),
                    datum.error_message,
                    metadata,
                ],
            )?;
            Ok(())
        })
    }

    fn exists(&self, url: &str) -> StorageResult<bool> {
        self.with_conn(|conn| {
            let found = conn
                .query_row(
                    "SELECT 1 FROM crawl_datums WHERE url = ?1",
                    params![url],
                    |_| Ok(()),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    fn get(&self, url: &str) -> StorageResult<Option<CrawlDatum>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(&format!("{} WHERE url = ?1", SELECT_COLUMNS))?;
            let datum = stmt.query_row(params![url], row_to_datum).optional()?;
            Ok(datum)
        })
    }

    fn load_all(&self) -> StorageResult<Vec<CrawlDatum>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("{} ORDER BY url", SELECT_COLUMNS))?;
            let records = stmt
                .query_map([], row_to_datum)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(records)
        })
    }

    fn count(&self) -> StorageResult<u64> {
        self.with_conn(|conn| {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM crawl_datums", [], |row| row.get(0))?;
            Ok(count as u64)
        })
    }

    fn count_by_status(&self, status: CrawlStatus) -> StorageResult<u64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM crawl_datums WHERE status = ?1",
                params![status.to_db_string()],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
    }

    fn prune(&self, status: CrawlStatus) -> StorageResult<u64> {
        self.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM crawl_datums WHERE status = ?1",
                params![status.to_db_string()],
            )?;
            Ok(removed as u64)
        })
    }

    fn clear(&self) -> StorageResult<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM crawl_datums", [])?;
            Ok(())
        })
    }

    fn close(&self) -> StorageResult<()> {
        let mut guard = self
            .pool
            .write()
            .map_err(|_| StorageError::Database("sqlite pool lock poisoned".to_string()))?;
        if guard.take().is_some() {
            tracing::debug!("Closed SQLite connection pool");
        }
        Ok(())
    }
}
