use crate::state::CrawlStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-URL crawl record, keyed by normalized URL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlDatum {
    pub url: String,
    pub status: CrawlStatus,
    /// Link distance from a seed (seeds are 0)
    pub depth: u32,
    /// Retries performed by the most recent fetch
    pub retry_count: u32,
    /// Number of times this URL has been dispatched, across runs
    pub execute_count: u32,
    pub http_code: Option<u16>,
    pub discovered_at: DateTime<Utc>,
    pub fetched_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl CrawlDatum {
    /// Creates a fresh `Unvisited` record discovered now
    pub fn new(url: impl Into<String>, depth: u32) -> Self {
        Self {
            url: url.into(),
            status: CrawlStatus::Unvisited,
            depth,
            retry_count: 0,
            execute_count: 0,
            http_code: None,
            discovered_at: Utc::now(),
            fetched_at: None,
            error_message: None,
            metadata: BTreeMap::new(),
        }
    }

    /// Attaches a metadata entry, builder style
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Records a dispatch: moves to `Fetching` and bumps the execute count
    pub fn begin_fetch(&mut self) {
        self.status = CrawlStatus::Fetching;
        self.execute_count = self.execute_count.saturating_add(1);
        self.error_message = None;
    }

    /// Records a successful fetch
    pub fn mark_fetched(&mut self, http_code: u16, retries: u32) {
        self.status = CrawlStatus::Fetched;
        self.http_code = Some(http_code);
        self.retry_count = retries;
        self.fetched_at = Some(Utc::now());
        self.error_message = None;
    }

    /// Records a failed fetch
    pub fn mark_failed(&mut self, http_code: Option<u16>, retries: u32, message: impl Into<String>) {
        self.status = CrawlStatus::Failed;
        self.http_code = http_code;
        self.retry_count = retries;
        self.fetched_at = Some(Utc::now());
        self.error_message = Some(message.into());
    }

    /// Returns the record to `Unvisited` after an interrupted dispatch
    ///
    /// The interrupted dispatch does not count against the execute budget.
    pub fn abandon(&mut self) {
        self.status = CrawlStatus::Unvisited;
        self.execute_count = self.execute_count.saturating_sub(1);
    }
}
