//! Sled storage implementation
//!
//! An embedded, ordered key-value store. Keys are normalized URLs, values are
//! JSON-encoded `CrawlDatum`s. Durable across restarts, single process only.

use crate::state::{CrawlDatum, CrawlStatus};
use crate::storage::traits::{Storage, StorageError, StorageResult};
use std::path::Path;
use std::sync::RwLock;

/// Sled storage backend
pub struct SledStorage {
    db: RwLock<Option<sled::Db>>,
}

impl SledStorage {
    /// Opens (or creates) a sled database in the given directory
    ///
    /// # Arguments
    ///
    /// * `path` - Directory holding the sled files
    ///
    /// # Returns
    ///
    /// * `Ok(SledStorage)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        let db = sled::open(path)?;
        tracing::debug!("Opened sled store at {}", path.display());
        Ok(Self {
            db: RwLock::new(Some(db)),
        })
    }

    /// Opens a throwaway database that is removed on drop (for testing)
    #[cfg(test)]
    pub fn new_temporary() -> StorageResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self {
            db: RwLock::new(Some(db)),
        })
    }

    /// Returns a handle to the open database; `sled::Db` clones share one tree
    fn handle(&self) -> StorageResult<sled::Db> {
        let guard = self
            .db
            .read()
            .map_err(|_| StorageError::Database("sled handle lock poisoned".to_string()))?;
        guard.clone().ok_or(StorageError::Closed)
    }

    fn decode(value: &[u8]) -> StorageResult<CrawlDatum> {
        Ok(serde_json::from_slice(value)?)
    }

    fn for_each_datum(&self, mut f: impl FnMut(sled::IVec, CrawlDatum)) -> StorageResult<()> {
        let db = self.handle()?;
        for entry in db.iter() {
            let (key, value) = entry?;
            match Self::decode(&value) {
                Ok(datum) => f(key, datum),
                Err(e) => {
                    tracing::warn!(
                        "Skipping undecodable record {}: {}",
                        String::from_utf8_lossy(&key),
                        e
                    );
                }
            }
        }
        Ok(())
    }
}

impl Storage for SledStorage {
    fn name(&self) -> &'static str {
        "sled"
    }

    fn save(&self, datum: &CrawlDatum) -> StorageResult<()> {
        let db = self.handle()?;
        let value = serde_json::to_vec(datum)?;
        db.insert(datum.url.as_bytes(), value)?;
        Ok(())
    }

    fn exists(&self, url: &str) -> StorageResult<bool> {
        Ok(self.handle()?.contains_key(url.as_bytes())?)
    }

    fn get(&self, url: &str) -> StorageResult<Option<CrawlDatum>> {
        match self.handle()?.get(url.as_bytes())? {
            Some(value) => Ok(Some(Self::decode(&value)?)),
            None => Ok(None),
        }
    }

    fn load_all(&self) -> StorageResult<Vec<CrawlDatum>> {
        let mut records = Vec::new();
        self.for_each_datum(|_, datum| records.push(datum))?;
        Ok(records)
    }

    fn count(&self) -> StorageResult<u64> {
        Ok(self.handle()?.len() as u64)
    }

    fn count_by_status(&self, status: CrawlStatus) -> StorageResult<u64> {
        let mut count = 0;
        self.for_each_datum(|_, datum| {
            if datum.status == status {
                count += 1;
            }
        })?;
        Ok(count)
    }

    fn prune(&self, status: CrawlStatus) -> StorageResult<u64> {
        let mut batch = sled::Batch::default();
        let mut removed = 0;
        self.for_each_datum(|key, datum| {
            if datum.status == status {
                batch.remove(key);
                removed += 1;
            }
        })?;

        self.handle()?.apply_batch(batch)?;
        Ok(removed)
    }

    fn clear(&self) -> StorageResult<()> {
        self.handle()?.clear()?;
        Ok(())
    }

    fn close(&self) -> StorageResult<()> {
        let mut guard = self
            .db
            .write()
            .map_err(|_| StorageError::Database("sled handle lock poisoned".to_string()))?;
        if let Some(db) = guard.take() {
            db.flush()?;
            tracing::debug!("Closed sled store");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_save_and_get() {
        let storage = SledStorage::new_temporary().unwrap();
        let datum = CrawlDatum::new("https://example.com/", 0).with_meta("type", "seed");

        storage.save(&datum).unwrap();
        storage.save(&datum).unwrap();

        assert_eq!(storage.count().unwrap(), 1);
        assert!(storage.exists("https://example.com/").unwrap());
        assert_eq!(storage.get("https://example.com/").unwrap(), Some(datum));
        assert_eq!(storage.get("https://example.com/missing").unwrap(), None);
    }

    #[test]
    fn test_load_all_is_ordered_by_url() {
        let storage = SledStorage::new_temporary().unwrap();
        storage.save(&CrawlDatum::new("https://example.com/b", 1)).unwrap();
        storage.save(&CrawlDatum::new("https://example.com/a", 1)).unwrap();

        let urls: Vec<String> = storage.load_all().unwrap().into_iter().map(|d| d.url).collect();
        assert_eq!(urls, vec!["https://example.com/a", "https://example.com/b"]);
    }

    #[test]
    fn test_count_and_prune_by_status() {
        let storage = SledStorage::new_temporary().unwrap();
        let mut fetched = CrawlDatum::new("https://example.com/ok", 0);
        fetched.mark_fetched(200, 0);
        let mut failed = CrawlDatum::new("https://example.com/gone", 1);
        failed.mark_failed(Some(404), 0, "HTTP 404");
        storage.save(&fetched).unwrap();
        storage.save(&failed).unwrap();

        assert_eq!(storage.count_by_status(CrawlStatus::Fetched).unwrap(), 1);
        assert_eq!(storage.prune(CrawlStatus::Failed).unwrap(), 1);
        assert_eq!(storage.count().unwrap(), 1);
    }

    #[test]
    fn test_records_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store");

        {
            let storage = SledStorage::new(&path).unwrap();
            storage.save(&CrawlDatum::new("https://example.com/", 0)).unwrap();
            storage.close().unwrap();
            assert!(matches!(
                storage.count().unwrap_err(),
                StorageError::Closed
            ));
        }

        let storage = SledStorage::new(&path).unwrap();
        assert_eq!(storage.count().unwrap(), 1);
    }
}
