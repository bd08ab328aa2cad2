use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// Main configuration structure for Harvester
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub fetcher: FetcherConfig,
    #[serde(default)]
    pub extractor: ExtractorConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub seeds: SeedConfig,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CrawlerConfig {
    /// Number of worker tasks pulling from the frontier
    #[serde(default = "default_workers")]
    pub workers: u32,

    /// Maximum depth to crawl from seed URLs
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,

    /// Maximum number of URLs to dispatch in one run (0 = unlimited)
    #[serde(default)]
    pub max_pages: u64,

    /// Maximum number of times a single URL may be dispatched
    #[serde(default = "default_max_execute_count")]
    pub max_execute_count: u32,

    /// Pause after each processed URL, per worker (milliseconds)
    #[serde(default)]
    pub execute_interval: u64,

    /// Grace period for in-flight work after a stop request (milliseconds)
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout: u64,

    /// Which finished URLs may be queued again
    #[serde(default)]
    pub recrawl: RecrawlPolicy,

    /// Keep previously stored records and continue where the last run stopped
    #[serde(default)]
    pub resumable: bool,
}

impl CrawlerConfig {
    pub fn execute_interval(&self) -> Duration {
        Duration::from_millis(self.execute_interval)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout)
    }

    /// Returns the page budget, or None when unlimited
    pub fn page_budget(&self) -> Option<u64> {
        (self.max_pages > 0).then_some(self.max_pages)
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            max_depth: default_max_depth(),
            max_pages: 0,
            max_execute_count: default_max_execute_count(),
            execute_interval: 0,
            shutdown_timeout: default_shutdown_timeout(),
            recrawl: RecrawlPolicy::default(),
            resumable: false,
        }
    }
}

/// Re-crawl policy for URLs that already finished
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecrawlPolicy {
    /// A finished URL is never queued again
    #[default]
    Never,
    /// Failed URLs may be queued again
    Failed,
    /// Any finished URL may be queued again
    Always,
}

/// HTTP fetcher configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FetcherConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Total request timeout (milliseconds)
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Connection establishment timeout (milliseconds)
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,

    /// Retries after the first attempt for transient failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// First backoff delay (milliseconds), doubled on every retry
    #[serde(default = "default_backoff_base")]
    pub backoff_base: u64,

    /// Upper bound on a single backoff delay (milliseconds)
    #[serde(default = "default_backoff_max")]
    pub backoff_max: u64,

    #[serde(default = "default_max_redirects")]
    pub max_redirects: u32,

    /// Largest accepted response body in bytes
    #[serde(default = "default_max_body_size")]
    pub max_body_size: u64,

    /// Extra headers sent with every request (e.g., `Cookie`, `Accept-Language`)
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Proxy URL for all requests (http, https or socks5)
    #[serde(default)]
    pub proxy: Option<String>,
}

impl FetcherConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout)
    }

    /// Backoff before retry number `attempt` (0-based), capped at `backoff_max`
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let delay = self.backoff_base.saturating_mul(factor);
        Duration::from_millis(delay.min(self.backoff_max))
    }
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            timeout: default_timeout(),
            connect_timeout: default_connect_timeout(),
            max_retries: default_max_retries(),
            backoff_base: default_backoff_base(),
            backoff_max: default_backoff_max(),
            max_redirects: default_max_redirects(),
            max_body_size: default_max_body_size(),
            headers: BTreeMap::new(),
            proxy: None,
        }
    }
}

/// Extractor selection and its parameters
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ExtractorConfig {
    /// Registry key: "html" or "regex"
    #[serde(default = "default_extractor_kind")]
    pub kind: String,

    /// Regex patterns locating links (regex extractor only)
    #[serde(default)]
    pub link_patterns: Vec<String>,

    /// Field name -> CSS selector (html) or regex (regex)
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            kind: default_extractor_kind(),
            link_patterns: Vec::new(),
            fields: BTreeMap::new(),
        }
    }
}

/// Rules applied to discovered links before they reach the frontier
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FilterConfig {
    /// Regex rules; "+" prefix (or none) is positive, "-" prefix is negative
    #[serde(default)]
    pub rules: Vec<String>,

    /// Domain patterns (e.g., "example.com" or "*.example.com")
    #[serde(default)]
    pub allowed_domains: Vec<String>,
}

/// Storage backend selection
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StorageConfig {
    /// Registry key: "memory", "sled" or "sqlite"
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Database file (sqlite) or directory (sled)
    #[serde(default = "default_storage_path")]
    pub path: String,

    /// Number of pooled connections (sqlite only)
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            path: default_storage_path(),
            pool_size: default_pool_size(),
        }
    }
}

/// Seed URLs injected at the start of a crawl
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SeedConfig {
    /// Seeds skipped when the URL was already crawled
    #[serde(default)]
    pub urls: Vec<String>,

    /// Seeds injected even when the URL was already crawled
    #[serde(default)]
    pub forced: Vec<String>,
}

impl SeedConfig {
    pub fn total(&self) -> usize {
        self.urls.len() + self.forced.len()
    }
}

fn default_workers() -> u32 {
    8
}

fn default_max_depth() -> u32 {
    3
}

fn default_max_execute_count() -> u32 {
    3
}

fn default_shutdown_timeout() -> u64 {
    30_000
}

fn default_user_agent() -> String {
    format!("harvester/{}", env!("CARGO_PKG_VERSION"))
}

fn default_timeout() -> u64 {
    30_000
}

fn default_connect_timeout() -> u64 {
    10_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_base() -> u64 {
    500
}

fn default_backoff_max() -> u64 {
    30_000
}

fn default_max_redirects() -> u32 {
    10
}

fn default_max_body_size() -> u64 {
    10 * 1024 * 1024
}

fn default_extractor_kind() -> String {
    "html".to_string()
}

fn default_backend() -> String {
    "sqlite".to_string()
}

fn default_storage_path() -> String {
    "./harvest.db".to_string()
}

fn default_pool_size() -> u32 {
    4
}
