use crate::config::types::{Config, CrawlerConfig, FetcherConfig, SeedConfig, StorageConfig};
use crate::crawler::{build_extractor, default_headers};
use crate::storage::BACKENDS;
use crate::url::UrlFilter;
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_fetcher_config(&config.fetcher)?;
    validate_storage_config(&config.storage)?;
    validate_seeds(&config.seeds)?;

    for pattern in &config.filter.allowed_domains {
        validate_domain_pattern(pattern)?;
    }

    // Both compile their regexes / selectors up front and report the first bad one
    UrlFilter::from_config(&config.filter)?;
    build_extractor(&config.extractor)?;

    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.workers < 1 || config.workers > 256 {
        return Err(ConfigError::Validation(format!(
            "workers must be between 1 and 256, got {}",
            config.workers
        )));
    }

    if config.max_execute_count < 1 {
        return Err(ConfigError::Validation(format!(
            "max-execute-count must be >= 1, got {}",
            config.max_execute_count
        )));
    }

    Ok(())
}

/// Validates fetcher configuration
fn validate_fetcher_config(config: &FetcherConfig) -> Result<(), ConfigError> {
    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user-agent cannot be empty".to_string(),
        ));
    }

    if config.timeout == 0 {
        return Err(ConfigError::Validation(
            "timeout must be greater than 0ms".to_string(),
        ));
    }

    if config.backoff_max < config.backoff_base {
        return Err(ConfigError::Validation(format!(
            "backoff-max ({}ms) must be >= backoff-base ({}ms)",
            config.backoff_max, config.backoff_base
        )));
    }

    if config.max_body_size == 0 {
        return Err(ConfigError::Validation(
            "max-body-size must be greater than 0".to_string(),
        ));
    }

    default_headers(config)?;

    if let Some(proxy) = &config.proxy {
        Url::parse(proxy)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid proxy URL '{}': {}", proxy, e)))?;
    }

    Ok(())
}

/// Validates storage configuration
fn validate_storage_config(config: &StorageConfig) -> Result<(), ConfigError> {
    if !BACKENDS.contains(&config.backend.as_str()) {
        return Err(ConfigError::Validation(format!(
            "unknown storage backend '{}', expected one of: {}",
            config.backend,
            BACKENDS.join(", ")
        )));
    }

    if config.backend != "memory" && config.path.is_empty() {
        return Err(ConfigError::Validation(
            "storage path cannot be empty".to_string(),
        ));
    }

    if config.pool_size < 1 {
        return Err(ConfigError::Validation(format!(
            "pool-size must be >= 1, got {}",
            config.pool_size
        )));
    }

    Ok(())
}

/// Validates seed URLs: parseable, http or https
fn validate_seeds(seeds: &SeedConfig) -> Result<(), ConfigError> {
    for seed in seeds.urls.iter().chain(seeds.forced.iter()) {
        let url = Url::parse(seed)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid seed URL '{}': {}", seed, e)))?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::InvalidUrl(format!(
                "Seed URL '{}' must use http or https",
                seed
            )));
        }
    }

    Ok(())
}

/// Validates a domain pattern (supports wildcards)
fn validate_domain_pattern(pattern: &str) -> Result<(), ConfigError> {
    if pattern.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain pattern cannot be empty".to_string(),
        ));
    }

    match pattern.strip_prefix("*.") {
        Some(domain) => validate_domain_string(domain),
        None => validate_domain_string(pattern),
    }
}

/// Validates a domain string (without wildcard prefix)
fn validate_domain_string(domain: &str) -> Result<(), ConfigError> {
    if domain.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain cannot be empty".to_string(),
        ));
    }

    if !domain
        .chars()
        .all(|c| c.is_alphanumeric() || c == '.' || c == '-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' contains invalid characters",
            domain
        )));
    }

    if domain.starts_with('.')
        || domain.ends_with('.')
        || domain.starts_with('-')
        || domain.ends_with('-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' cannot start or end with '.' or '-'",
            domain
        )));
    }

    if domain.contains("..") {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' cannot contain consecutive dots",
            domain
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_config() -> Config {
        let mut config = Config::default();
        config.storage.backend = "memory".to_string();
        config.seeds.urls = vec!["https://example.com/".to_string()];
        config
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate(&create_test_config()).is_ok());
    }

    #[test]
    fn test_validate_domain_pattern() {
        assert!(validate_domain_pattern("example.com").is_ok());
        assert!(validate_domain_pattern("*.example.com").is_ok());
        assert!(validate_domain_pattern("localhost").is_ok());

        assert!(validate_domain_pattern("").is_err());
        assert!(validate_domain_pattern("*.").is_err());
        assert!(validate_domain_pattern(".example.com").is_err());
        assert!(validate_domain_pattern("example.com.").is_err());
        assert!(validate_domain_pattern("exa mple.com").is_err());
    }

    #[test]
    fn test_worker_bounds() {
        let mut config = create_test_config();
        config.crawler.workers = 0;
        assert!(validate(&config).is_err());

        config.crawler.workers = 257;
        assert!(validate(&config).is_err());

        config.crawler.workers = 1;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let mut config = create_test_config();
        config.storage.backend = "postgres".to_string();
        assert!(matches!(
            validate(&config).unwrap_err(),
            ConfigError::Validation(_)
        ));
    }

    #[test]
    fn test_seed_scheme_checked() {
        let mut config = create_test_config();
        config.seeds.forced = vec!["ftp://example.com/file".to_string()];
        assert!(matches!(
            validate(&config).unwrap_err(),
            ConfigError::InvalidUrl(_)
        ));

        config.seeds.forced = vec!["not a url".to_string()];
        assert!(matches!(
            validate(&config).unwrap_err(),
            ConfigError::InvalidUrl(_)
        ));
    }

    #[test]
    fn test_bad_filter_rule_rejected() {
        let mut config = create_test_config();
        config.filter.rules = vec!["+https://(unclosed".to_string()];
        assert!(matches!(
            validate(&config).unwrap_err(),
            ConfigError::InvalidRegex { .. }
        ));
    }

    #[test]
    fn test_unknown_extractor_rejected() {
        let mut config = create_test_config();
        config.extractor.kind = "xpath".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_backoff_bounds() {
        let mut config = create_test_config();
        config.fetcher.backoff_base = 1000;
        config.fetcher.backoff_max = 10;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_headers_and_proxy_checked() {
        let mut config = create_test_config();
        config
            .fetcher
            .headers
            .insert("X-Crawl-Token".to_string(), "abc".to_string());
        config.fetcher.proxy = Some("socks5://127.0.0.1:1080".to_string());
        assert!(validate(&config).is_ok());

        config.fetcher.proxy = Some("not a url".to_string());
        assert!(matches!(validate(&config), Err(ConfigError::InvalidUrl(_))));

        config.fetcher.proxy = None;
        config
            .fetcher
            .headers
            .insert("X-Bad".to_string(), "line\nbreak".to_string());
        assert!(matches!(validate(&config), Err(ConfigError::Validation(_))));
    }
}
