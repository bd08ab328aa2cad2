//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `CrawlStatus`: Lifecycle of a single URL (unvisited, fetching, fetched, failed)
//! - `CrawlDatum`: The per-URL record persisted by every storage backend

mod crawl_status;
mod datum;

// Re-export main types
pub use crawl_status::CrawlStatus;
pub use datum::CrawlDatum;
