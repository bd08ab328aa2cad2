//! Harvester: a plugin-based web crawling engine
//!
//! This crate implements a single-process crawler built from injectable parts:
//! a deduplicating frontier, an HTTP fetcher with retry and backoff, pluggable
//! link/field extractors and pluggable persistence backends, driven by a
//! fixed-size worker pool.

pub mod config;
pub mod crawler;
pub mod output;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for Harvester operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid domain pattern: {0}")]
    InvalidPattern(String),

    #[error("Invalid regular expression '{pattern}': {message}")]
    InvalidRegex { pattern: String, message: String },
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Result type alias for Harvester operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{Coordinator, CrawlReport, Frontier, Scheduler};
pub use state::{CrawlDatum, CrawlStatus};
pub use storage::Storage;
pub use url::{extract_domain, normalize_url, UrlFilter};

#[cfg(test)]
mod tests {
    use super::*;

    fn seed(url: &str) -> Result<String> {
        Ok(normalize_url(url)?.to_string())
    }

    fn settings(content: &str) -> Result<Config> {
        Ok(config::parse_config(content)?)
    }

    #[test]
    fn test_component_errors_convert() {
        assert!(matches!(seed("ftp://example.com/"), Err(HarvestError::UrlError(_))));
        assert!(matches!(settings("[crawl"), Err(HarvestError::Config(_))));

        let err: HarvestError = storage::StorageError::Closed.into();
        assert!(matches!(err, HarvestError::Storage(_)));
        assert_eq!(err.to_string(), format!("Storage error: {}", storage::StorageError::Closed));
    }
}
