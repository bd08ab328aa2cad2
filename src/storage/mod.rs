//! Storage module for persisting crawl data
//!
//! Each backend implements the `Storage` trait and is selected at start-up by
//! the `backend` configuration key:
//! - `memory`: process-lifetime map
//! - `sled`: embedded key-value store, durable, single process
//! - `sqlite`: relational store in WAL mode with a connection pool

mod memory;
mod schema;
mod sled_store;
mod sqlite;
mod traits;

pub use memory::MemoryStorage;
pub use sled_store::SledStorage;
pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::config::StorageConfig;
use std::path::Path;
use std::sync::Arc;

/// Registry keys accepted by `open_storage`
pub const BACKENDS: &[&str] = &["memory", "sled", "sqlite"];

/// Opens the storage backend named by the configuration
///
/// # Arguments
///
/// * `config` - Storage section of the configuration
///
/// # Returns
///
/// * `Ok(Arc<dyn Storage>)` - Opened backend, shareable between workers
/// * `Err(StorageError)` - Unknown backend key or failed to open
pub fn open_storage(config: &StorageConfig) -> StorageResult<Arc<dyn Storage>> {
    let path = Path::new(&config.path);

    let storage: Arc<dyn Storage> = match config.backend.as_str() {
        "memory" => Arc::new(MemoryStorage::new()),
        "sled" => Arc::new(SledStorage::new(path)?),
        "sqlite" => Arc::new(SqliteStorage::new(path, config.pool_size)?),
        other => {
            return Err(StorageError::Database(format!(
                "unknown storage backend '{}'",
                other
            )))
        }
    };

    tracing::info!("Using {} storage backend", storage.name());
    Ok(storage)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::CrawlDatum;
    use tempfile::TempDir;

    fn storage_config(backend: &str, path: &Path) -> StorageConfig {
        StorageConfig {
            backend: backend.to_string(),
            path: path.to_string_lossy().into_owned(),
            pool_size: 2,
        }
    }

    #[test]
    fn test_registry_opens_every_backend() {
        let dir = TempDir::new().unwrap();

        for backend in BACKENDS {
            let path = dir.path().join(backend);
            let storage = open_storage(&storage_config(backend, &path)).unwrap();
            assert_eq!(storage.name(), *backend);

            let datum = CrawlDatum::new("https://example.com/", 0);
            storage.save(&datum).unwrap();
            storage.save(&datum).unwrap();
            assert_eq!(storage.count().unwrap(), 1);
            storage.close().unwrap();
        }
    }

    #[test]
    fn test_registry_rejects_unknown_backend() {
        let dir = TempDir::new().unwrap();
        let result = open_storage(&storage_config("redis", dir.path()));
        assert!(result.is_err());
    }
}
