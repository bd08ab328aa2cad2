//! Crawler coordinator - wires a crawl together from configuration
//!
//! This module handles:
//! - Opening the configured storage backend
//! - Clearing it for a fresh run, or restoring the frontier when resuming
//! - Injecting normal and forced seeds
//! - Building the fetcher, extractor and URL filter
//! - Running the scheduler and closing the backend afterwards

use crate::config::Config;
use crate::crawler::extractor::build_extractor;
use crate::crawler::fetcher::HttpFetcher;
use crate::crawler::frontier::Frontier;
use crate::crawler::scheduler::{CrawlReport, Scheduler, StopHandle};
use crate::state::{CrawlDatum, CrawlStatus};
use crate::storage::{open_storage, Storage};
use crate::url::{normalize_url, UrlFilter};
use crate::Result;
use std::sync::Arc;

/// Main crawler coordinator structure
pub struct Coordinator {
    storage: Arc<dyn Storage>,
    frontier: Arc<Frontier>,
    scheduler: Scheduler,
}

impl Coordinator {
    /// Creates a new coordinator instance
    ///
    /// # Arguments
    ///
    /// * `config` - The crawler configuration
    /// * `fresh` - Discard stored records even if the crawl is resumable
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Ready to run
    /// * `Err(HarvestError)` - Storage, seed or component setup failed
    pub fn new(config: Config, fresh: bool) -> Result<Self> {
        let storage = open_storage(&config.storage)?;
        let frontier = Arc::new(Frontier::new(&config.crawler));

        if fresh || !config.crawler.resumable {
            tracing::info!("Starting fresh crawl, clearing stored records");
            storage.clear()?;
        } else {
            restore_frontier(&frontier, storage.as_ref())?;
        }

        let mut seeded = 0;
        for seed in &config.seeds.urls {
            if inject_seed(&frontier, storage.as_ref(), seed, false)? {
                seeded += 1;
            }
        }
        for seed in &config.seeds.forced {
            if inject_seed(&frontier, storage.as_ref(), seed, true)? {
                seeded += 1;
            }
        }
        tracing::info!(
            "Injected {} of {} seeds, {} URLs queued",
            seeded,
            config.seeds.total(),
            frontier.len()
        );

        let fetcher = HttpFetcher::new(config.fetcher.clone())?;
        let extractor = build_extractor(&config.extractor)?;
        let filter = UrlFilter::from_config(&config.filter)?;
        tracing::debug!("Using {} extractor", extractor.name());

        let scheduler = Scheduler::new(
            &config,
            frontier.clone(),
            Arc::new(fetcher),
            extractor,
            storage.clone(),
            filter,
        );

        Ok(Self {
            storage,
            frontier,
            scheduler,
        })
    }

    /// Signal that stops the crawl started by `run`
    pub fn stop_handle(&self) -> StopHandle {
        self.scheduler.stop_handle()
    }

    pub fn storage(&self) -> Arc<dyn Storage> {
        self.storage.clone()
    }

    pub fn frontier(&self) -> Arc<Frontier> {
        self.frontier.clone()
    }

    /// Runs the crawl and closes the storage backend
    ///
    /// The backend is closed even when the crawl fails; the crawl error takes
    /// precedence over a close error.
    pub async fn run(self) -> Result<CrawlReport> {
        let result = self.scheduler.run().await;

        match (result, self.storage.close()) {
            (Ok(report), Ok(())) => Ok(report),
            (Ok(_), Err(e)) => Err(e.into()),
            (Err(e), close) => {
                if let Err(close_err) = close {
                    tracing::warn!("Failed to close storage: {}", close_err);
                }
                Err(e)
            }
        }
    }
}

/// Reloads the frontier from every stored record
fn restore_frontier(frontier: &Frontier, storage: &dyn Storage) -> Result<()> {
    let datums = storage.load_all()?;
    let mut queued = 0;

    for datum in &datums {
        if frontier.restore(&datum.url, datum.depth, datum.status, datum.execute_count) {
            queued += 1;
        }
    }

    tracing::info!(
        "Resuming crawl: {} stored records, {} re-queued",
        datums.len(),
        queued
    );
    Ok(())
}

/// Queues a seed at depth 0 and records it as unvisited
///
/// # Returns
///
/// `true` if the seed was queued
fn inject_seed(frontier: &Frontier, storage: &dyn Storage, raw: &str, forced: bool) -> Result<bool> {
    let key = normalize_url(raw)?.to_string();

    let queued = if forced {
        frontier.add_forced(&key, 0)
    } else {
        frontier.add(&key, 0)
    };
    if !queued {
        tracing::debug!("Seed {} already known, skipping", key);
        return Ok(false);
    }

    let datum = match storage.get(&key)? {
        Some(mut existing) => {
            existing.status = CrawlStatus::Unvisited;
            existing.depth = 0;
            existing
        }
        None => CrawlDatum::new(key, 0).with_meta("type", "seed"),
    };
    storage.save(&datum)?;
    Ok(true)
}
