//! Output module for reporting on stored crawl records
//!
//! This module handles:
//! - Summarizing stored records as crawl statistics
//! - Exporting records as JSON lines

mod export;
pub mod stats;

pub use export::export_json_lines;
pub use stats::{load_statistics, print_statistics, CrawlStatistics};
