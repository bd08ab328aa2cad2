//! Statistics generation from stored crawl records
//!
//! This module provides functionality for extracting and displaying
//! crawl statistics from any storage backend.

use crate::state::CrawlStatus;
use crate::storage::{Storage, StorageResult};
use crate::url::extract_domain;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use url::Url;

/// Crawl statistics summary
#[derive(Debug, Clone, Default)]
pub struct CrawlStatistics {
    /// Total number of stored records
    pub total: u64,

    /// Count of records by status
    pub by_status: HashMap<CrawlStatus, u64>,

    /// Number of unique domains among stored URLs
    pub unique_domains: u64,

    /// Count of records per crawl depth
    pub by_depth: BTreeMap<u32, u64>,

    /// Count of records per last observed HTTP status code
    pub by_http_code: BTreeMap<u16, u64>,

    /// Retries performed across all records
    pub total_retries: u64,
}

impl CrawlStatistics {
    pub fn count(&self, status: CrawlStatus) -> u64 {
        self.by_status.get(&status).copied().unwrap_or(0)
    }
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
///
/// # Returns
///
/// * `Ok(CrawlStatistics)` - Successfully loaded statistics
/// * `Err(StorageError)` - Failed to read records
pub fn load_statistics(storage: &dyn Storage) -> StorageResult<CrawlStatistics> {
    let mut stats = CrawlStatistics {
        total: storage.count()?,
        ..Default::default()
    };

    for status in CrawlStatus::all_states() {
        let count = storage.count_by_status(status)?;
        if count > 0 {
            stats.by_status.insert(status, count);
        }
    }

    let mut domains = BTreeSet::new();
    for datum in storage.load_all()? {
        if let Some(domain) = Url::parse(&datum.url).ok().as_ref().and_then(extract_domain) {
            domains.insert(domain);
        }
        *stats.by_depth.entry(datum.depth).or_default() += 1;
        if let Some(code) = datum.http_code {
            *stats.by_http_code.entry(code).or_default() += 1;
        }
        stats.total_retries += u64::from(datum.retry_count);
    }
    stats.unique_domains = domains.len() as u64;

    Ok(stats)
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &CrawlStatistics) {
    println!("=== Crawl Statistics ===\n");

    println!("Overview:");
    println!("  Total URLs stored: {}", stats.total);
    println!("  Unique domains: {}", stats.unique_domains);
    println!("  Retries performed: {}", stats.total_retries);
    println!();

    println!("URLs by Status:");
    let mut status_counts: Vec<_> = stats.by_status.iter().collect();
    status_counts.sort_by(|a, b| b.1.cmp(a.1));

    for (status, count) in status_counts {
        println!("  {}: {} ({:.1}%)", status, count, percentage(*count, stats.total));
    }
    println!();

    if !stats.by_depth.is_empty() {
        println!("URLs by Depth:");
        for (depth, count) in &stats.by_depth {
            println!("  {}: {}", depth, count);
        }
        println!();
    }

    if !stats.by_http_code.is_empty() {
        println!("HTTP Status Codes:");
        for (code, count) in &stats.by_http_code {
            println!("  {}: {}", code, count);
        }
        println!();
    }

    let fetched = stats.count(CrawlStatus::Fetched);
    println!(
        "Success Rate: {:.1}% ({} / {} URLs fetched)",
        percentage(fetched, stats.total),
        fetched,
        stats.total
    );
}

fn percentage(count: u64, total: u64) -> f64 {
    if total > 0 {
        (count as f64 / total as f64) * 100.0
    } else {
        0.0
    }
}
