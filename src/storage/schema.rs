//! Database schema definitions
//!
//! This module contains the SQL schema for the SQLite storage backend.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- One row per normalized URL
CREATE TABLE IF NOT EXISTS crawl_datums (
    url TEXT PRIMARY KEY,
    status TEXT NOT NULL,
    depth INTEGER NOT NULL,
    retry_count INTEGER NOT NULL DEFAULT 0,
    execute_count INTEGER NOT NULL DEFAULT 0,
    http_code INTEGER,
    discovered_at TEXT NOT NULL,
    fetched_at TEXT,
    error_message TEXT,
    metadata TEXT NOT NULL DEFAULT '{}'
);

CREATE INDEX IF NOT EXISTS idx_crawl_datums_status ON crawl_datums(status);
CREATE INDEX IF NOT EXISTS idx_crawl_datums_depth ON crawl_datums(depth);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();

        initialize_schema(&conn).unwrap();
        assert!(initialize_schema(&conn).is_ok());
    }

    #[test]
    fn test_table_exists_after_init() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='crawl_datums'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }
}
