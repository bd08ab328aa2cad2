//! Scheduler: the worker pool that drives a crawl
//!
//! This module handles:
//! - Running a fixed number of worker tasks against a shared frontier
//! - The per-URL pipeline: dispatch, fetch, extract, persist, enqueue links
//! - Isolating extractor failures (errors and panics) from the pipeline
//! - Stopping on request, with a grace period for in-flight work
//! - Surfacing fatal storage errors to the caller

use crate::config::Config;
use crate::crawler::extractor::{Extraction, ExtractionError, Extractor};
use crate::crawler::fetcher::{FetchResult, PageFetcher};
use crate::crawler::frontier::{Frontier, FrontierEntry, Outcome};
use crate::state::{CrawlDatum, CrawlStatus};
use crate::storage::{Storage, StorageError};
use crate::url::{normalize_url, UrlFilter};
use crate::{HarvestError, Result};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio::task::JoinSet;

/// Summary of a finished crawl
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CrawlReport {
    /// URLs handed to a worker
    pub dispatched: u64,
    pub fetched: u64,
    pub failed: u64,
    /// New URLs accepted into the frontier from extracted links
    pub discovered: u64,
    pub elapsed: Duration,
    /// True if the crawl ended because of a stop request
    pub stopped: bool,
}

/// External stop signal for a running crawl
///
/// Cloneable; stopping is idempotent.
#[derive(Debug, Clone)]
pub struct StopHandle {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
    frontier: Arc<Frontier>,
}

impl StopHandle {
    fn new(frontier: Arc<Frontier>) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
            frontier,
        }
    }

    pub fn stop(&self) {
        if !self.flag.swap(true, Ordering::SeqCst) {
            tracing::info!("Stop requested");
        }
        self.frontier.stop();
        self.notify.notify_waiters();
    }

    pub fn is_stopped(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Resolves once `stop` has been called
    pub async fn stopped(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_stopped() {
                return;
            }
            notified.await;
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    dispatched: AtomicU64,
    fetched: AtomicU64,
    failed: AtomicU64,
    discovered: AtomicU64,
}

/// State shared by every worker
struct Pipeline {
    frontier: Arc<Frontier>,
    fetcher: Arc<dyn PageFetcher>,
    extractor: Arc<dyn Extractor>,
    storage: Arc<dyn Storage>,
    filter: Arc<UrlFilter>,
    stop: StopHandle,
    counters: Counters,
    fatal: Mutex<Option<StorageError>>,
    timeout: Duration,
    execute_interval: Duration,
    started: Instant,
}

/// Worker pool over injected frontier, fetcher, extractor, storage and filter
pub struct Scheduler {
    pipeline: Arc<Pipeline>,
    workers: usize,
    shutdown_timeout: Duration,
}

impl Scheduler {
    /// Creates a scheduler
    ///
    /// # Arguments
    ///
    /// * `config` - Supplies worker count, request timeout, execute interval
    ///   and shutdown grace period
    /// * `frontier` - Already seeded (and restored, when resuming)
    pub fn new(
        config: &Config,
        frontier: Arc<Frontier>,
        fetcher: Arc<dyn PageFetcher>,
        extractor: Arc<dyn Extractor>,
        storage: Arc<dyn Storage>,
        filter: UrlFilter,
    ) -> Self {
        let stop = StopHandle::new(frontier.clone());
        Self {
            pipeline: Arc::new(Pipeline {
                frontier,
                fetcher,
                extractor,
                storage,
                filter: Arc::new(filter),
                stop,
                counters: Counters::default(),
                fatal: Mutex::new(None),
                timeout: config.fetcher.timeout(),
                execute_interval: config.crawler.execute_interval(),
                started: Instant::now(),
            }),
            workers: config.crawler.workers.max(1) as usize,
            shutdown_timeout: config.crawler.shutdown_timeout(),
        }
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.pipeline.stop.clone()
    }

    /// Runs the crawl to completion
    ///
    /// Ends when the frontier is exhausted with nothing in flight, the page
    /// budget is spent, or a stop is requested. After a stop, in-flight work
    /// gets the shutdown grace period before remaining workers are aborted.
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlReport)` - Crawl finished or was stopped
    /// * `Err(HarvestError::Storage)` - A fatal storage error stopped the crawl
    pub async fn run(self) -> Result<CrawlReport> {
        let pipeline = self.pipeline;
        let start = Instant::now();

        tracing::info!(
            "Starting crawl with {} workers, {} URLs queued",
            self.workers,
            pipeline.frontier.len()
        );

        let mut workers = JoinSet::new();
        for id in 0..self.workers {
            let pipeline = pipeline.clone();
            workers.spawn(async move { pipeline.worker(id).await });
        }

        let stopped = tokio::select! {
            _ = drain(&mut workers) => false,
            _ = pipeline.stop.stopped() => true,
        };

        if stopped && !workers.is_empty() {
            tracing::info!(
                "Waiting up to {:?} for {} in-flight URLs",
                self.shutdown_timeout,
                pipeline.frontier.in_flight()
            );
            if tokio::time::timeout(self.shutdown_timeout, drain(&mut workers))
                .await
                .is_err()
            {
                tracing::warn!(
                    "Shutdown grace period elapsed, aborting {} workers",
                    workers.len()
                );
                workers.abort_all();
                drain(&mut workers).await;
            }
        }

        let fatal = pipeline
            .fatal
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(e) = fatal {
            tracing::error!("Crawl aborted by storage failure: {}", e);
            return Err(HarvestError::Storage(e));
        }

        let report = CrawlReport {
            dispatched: pipeline.counters.dispatched.load(Ordering::Relaxed),
            fetched: pipeline.counters.fetched.load(Ordering::Relaxed),
            failed: pipeline.counters.failed.load(Ordering::Relaxed),
            discovered: pipeline.counters.discovered.load(Ordering::Relaxed),
            elapsed: start.elapsed(),
            stopped: pipeline.stop.is_stopped(),
        };

        tracing::info!(
            "Crawl {}: {} dispatched, {} fetched, {} failed, {} discovered in {:?}",
            if report.stopped { "stopped" } else { "completed" },
            report.dispatched,
            report.fetched,
            report.failed,
            report.discovered,
            report.elapsed
        );

        Ok(report)
    }
}

/// Waits for every worker, logging any that panicked
async fn drain(workers: &mut JoinSet<()>) {
    while let Some(joined) = workers.join_next().await {
        if let Err(e) = joined {
            if e.is_panic() {
                tracing::error!("Worker panicked: {}", e);
            }
        }
    }
}

/// Best-effort text of a panic payload
fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

impl Pipeline {
    async fn worker(self: Arc<Self>, id: usize) {
        tracing::debug!("Worker {} started", id);

        while let Some(entry) = self.frontier.next().await {
            let outcome = match self.process(&entry).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    self.record_fatal(e);
                    Outcome::Abandoned
                }
            };
            self.frontier.mark_done(&entry.url, outcome);

            if !self.execute_interval.is_zero() && !self.stop.is_stopped() {
                tokio::select! {
                    _ = tokio::time::sleep(self.execute_interval) => {}
                    _ = self.stop.stopped() => {}
                }
            }
        }

        tracing::debug!("Worker {} finished", id);
    }

    /// Keeps the first fatal error and stops the crawl
    fn record_fatal(&self, error: StorageError) {
        {
            let mut fatal = self.fatal.lock().unwrap_or_else(|e| e.into_inner());
            if fatal.is_none() {
                tracing::error!("Fatal storage error: {}", error);
                *fatal = Some(error);
            }
        }
        self.stop.stop();
    }

    /// Persists a datum; only fatal errors are returned
    fn save(&self, datum: &CrawlDatum) -> std::result::Result<(), StorageError> {
        match self.storage.save(datum) {
            Ok(()) => Ok(()),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                tracing::warn!("Failed to save {}: {}", datum.url, e);
                Ok(())
            }
        }
    }

    /// Loads the stored record for a URL; only fatal errors are returned
    fn load(&self, url: &str) -> std::result::Result<Option<CrawlDatum>, StorageError> {
        match self.storage.get(url) {
            Ok(datum) => Ok(datum),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                tracing::warn!("Failed to load {}: {}", url, e);
                Ok(None)
            }
        }
    }

    /// Runs one URL through the pipeline
    async fn process(&self, entry: &FrontierEntry) -> std::result::Result<Outcome, StorageError> {
        let mut datum = self
            .load(&entry.url)?
            .unwrap_or_else(|| CrawlDatum::new(entry.url.clone(), entry.depth));
        datum.depth = entry.depth;
        datum.begin_fetch();
        self.save(&datum)?;

        let dispatched = self.counters.dispatched.fetch_add(1, Ordering::Relaxed) + 1;
        if dispatched % 10 == 0 {
            let rate = dispatched as f64 / self.started.elapsed().as_secs_f64();
            tracing::info!(
                "Progress: {} pages dispatched, {} in frontier, {:.2} pages/sec",
                dispatched,
                self.frontier.len(),
                rate
            );
        }

        if self.stop.is_stopped() {
            return self.abandon(&mut datum);
        }

        tracing::debug!("Fetching {} (depth {})", entry.url, entry.depth);
        let page = match self.fetcher.fetch(&entry.url, self.timeout).await {
            Ok(page) => page,
            Err(e) => {
                tracing::warn!("Fetch failed: {}", e);
                datum.mark_failed(e.status(), e.retries(), e.to_string());
                self.save(&datum)?;
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                return Ok(Outcome::Failed);
            }
        };

        if self.stop.is_stopped() {
            return self.abandon(&mut datum);
        }

        let extraction = self.extract(&page);

        datum.mark_fetched(page.status_code, page.retries);
        if let Some(content_type) = &page.content_type {
            datum
                .metadata
                .insert("content_type".to_string(), content_type.clone());
        }
        if page.final_url != page.url {
            datum
                .metadata
                .insert("final_url".to_string(), page.final_url.clone());
        }
        datum.metadata.extend(extraction.fields);
        self.save(&datum)?;
        self.counters.fetched.fetch_add(1, Ordering::Relaxed);

        self.enqueue_links(entry, &extraction.links)?;

        Ok(Outcome::Fetched)
    }

    fn abandon(&self, datum: &mut CrawlDatum) -> std::result::Result<Outcome, StorageError> {
        tracing::debug!("Abandoning {}", datum.url);
        datum.abandon();
        self.save(datum)?;
        Ok(Outcome::Abandoned)
    }

    /// Runs the extractor, turning errors and panics into an empty extraction
    fn extract(&self, page: &FetchResult) -> Extraction {
        let extractor = &self.extractor;
        let result = panic::catch_unwind(AssertUnwindSafe(|| extractor.extract(page)));

        let error = match result {
            Ok(Ok(extraction)) => return extraction,
            Ok(Err(e)) => e,
            Err(payload) => ExtractionError::Panicked {
                extractor: extractor.name().to_string(),
                message: panic_message(payload.as_ref()),
            },
        };

        tracing::warn!("Extraction failed for {}: {}", page.url, error);
        Extraction::default()
    }

    /// Normalizes, filters and queues extracted links one level deeper
    fn enqueue_links(
        &self,
        parent: &FrontierEntry,
        links: &[String],
    ) -> std::result::Result<(), StorageError> {
        let depth = parent.depth + 1;
        let mut accepted = 0;

        for link in links {
            let url = match normalize_url(link) {
                Ok(url) => url,
                Err(e) => {
                    tracing::debug!("Skipping link {}: {}", link, e);
                    continue;
                }
            };
            if !self.filter.accepts(&url) {
                continue;
            }

            // The record is written before any worker can dispatch the URL
            let key = url.to_string();
            let queued = self.frontier.add_with(&key, depth, || {
                // A re-crawl keeps the stored history of the URL
                let datum = match self.load(&key)? {
                    Some(mut existing) => {
                        existing.status = CrawlStatus::Unvisited;
                        existing.depth = existing.depth.min(depth);
                        existing
                    }
                    None => CrawlDatum::new(key.clone(), depth)
                        .with_meta("referrer", parent.url.clone()),
                };
                self.save(&datum)
            })?;
            if queued {
                accepted += 1;
            }
        }

        self.counters
            .discovered
            .fetch_add(accepted, Ordering::Relaxed);
        tracing::debug!(
            "{}: {} links extracted, {} queued",
            parent.url,
            links.len(),
            accepted
        );
        Ok(())
    }
}
