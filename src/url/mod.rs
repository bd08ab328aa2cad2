//! URL handling module for Harvester
//!
//! This module provides URL normalization (the frontier's dedup key) and the
//! rule-based filter applied to discovered links.

mod filter;
mod normalize;

// Re-export main functions
pub use filter::{extract_domain, DomainPattern, UrlFilter};
pub use normalize::normalize_url;
