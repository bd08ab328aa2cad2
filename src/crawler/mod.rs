//! Crawler module: the crawl pipeline and its pluggable parts
//!
//! This module contains the core crawling logic, including:
//! - The deduplicating, depth-ordered frontier
//! - HTTP fetching with retry and backoff
//! - Link and field extraction plugins
//! - The worker pool driving fetch, extract, persist and enqueue
//! - Overall crawl coordination from configuration

mod coordinator;
mod extractor;
mod fetcher;
mod frontier;
mod scheduler;

pub use coordinator::Coordinator;
pub use extractor::{
    build_extractor, Extraction, ExtractionError, Extractor, HtmlLinkExtractor, RegexExtractor,
    EXTRACTORS,
};
pub use fetcher::{
    build_http_client, default_headers, FetchError, FetchResult, HttpFetcher, PageFetcher,
};
pub use frontier::{Frontier, FrontierEntry, Outcome};
pub use scheduler::{CrawlReport, Scheduler, StopHandle};

use crate::config::Config;
use crate::Result;

/// Runs a complete crawl operation
///
/// Resumes from stored records when the configuration marks the crawl as
/// resumable.
///
/// # Arguments
///
/// * `config` - The crawler configuration
///
/// # Returns
///
/// * `Ok(CrawlReport)` - Crawl completed or was stopped
/// * `Err(HarvestError)` - Setup failed or a fatal storage error occurred
pub async fn crawl(config: Config) -> Result<CrawlReport> {
    Coordinator::new(config, false)?.run().await
}
