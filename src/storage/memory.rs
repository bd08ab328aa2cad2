//! In-memory storage implementation
//!
//! Records live for the lifetime of the process. Useful for one-off crawls
//! and tests.

use crate::state::{CrawlDatum, CrawlStatus};
use crate::storage::traits::{Storage, StorageError, StorageResult};
use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

type Records = BTreeMap<String, CrawlDatum>;

/// Map-backed storage; `None` once closed
#[derive(Debug)]
pub struct MemoryStorage {
    records: RwLock<Option<Records>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Some(BTreeMap::new())),
        }
    }

    fn read(&self) -> StorageResult<RwLockReadGuard<'_, Option<Records>>> {
        let guard = self
            .records
            .read()
            .map_err(|_| StorageError::Database("memory store lock poisoned".to_string()))?;
        if guard.is_none() {
            return Err(StorageError::Closed);
        }
        Ok(guard)
    }

    fn write(&self) -> StorageResult<RwLockWriteGuard<'_, Option<Records>>> {
        let guard = self
            .records
            .write()
            .map_err(|_| StorageError::Database("memory store lock poisoned".to_string()))?;
        if guard.is_none() {
            return Err(StorageError::Closed);
        }
        Ok(guard)
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage for MemoryStorage {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn save(&self, datum: &CrawlDatum) -> StorageResult<()> {
        let mut guard = self.write()?;
        if let Some(records) = guard.as_mut() {
            records.insert(datum.url.clone(), datum.clone());
        }
        Ok(())
    }

    fn exists(&self, url: &str) -> StorageResult<bool> {
        let guard = self.read()?;
        Ok(guard.as_ref().is_some_and(|r| r.contains_key(url)))
    }

    fn get(&self, url: &str) -> StorageResult<Option<CrawlDatum>> {
        let guard = self.read()?;
        Ok(guard.as_ref().and_then(|r| r.get(url).cloned()))
    }

    fn load_all(&self) -> StorageResult<Vec<CrawlDatum>> {
        let guard = self.read()?;
        Ok(guard
            .as_ref()
            .map(|r| r.values().cloned().collect())
            .unwrap_or_default())
    }

    fn count(&self) -> StorageResult<u64> {
        let guard = self.read()?;
        Ok(guard.as_ref().map_or(0, |r| r.len() as u64))
    }

    fn count_by_status(&self, status: CrawlStatus) -> StorageResult<u64> {
        let guard = self.read()?;
        Ok(guard.as_ref().map_or(0, |r| {
            r.values().filter(|d| d.status == status).count() as u64
        }))
    }

    fn prune(&self, status: CrawlStatus) -> StorageResult<u64> {
        let mut guard = self.write()?;
        let Some(records) = guard.as_mut() else {
            return Ok(0);
        };
        let before = records.len();
        records.retain(|_, d| d.status != status);
        Ok((before - records.len()) as u64)
    }

    fn clear(&self) -> StorageResult<()> {
        let mut guard = self.write()?;
        if let Some(records) = guard.as_mut() {
            records.clear();
        }
        Ok(())
    }

    fn close(&self) -> StorageResult<()> {
        let mut guard = self
            .records
            .write()
            .map_err(|_| StorageError::Database("memory store lock poisoned".to_string()))?;
        *guard = None;
        Ok(())
    }
}
