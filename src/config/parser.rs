use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parses and validates configuration from TOML text
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// This identifies the configuration a crawl was started with, so resumed
/// runs can be told apart in the logs.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RecrawlPolicy;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_valid_config() {
        let config_content = r#"
[crawler]
workers = 4
max-depth = 2
max-pages = 100
recrawl = "failed"

[fetcher]
user-agent = "TestCrawler/1.0"
max-retries = 2
backoff-base = 50
proxy = "http://proxy.internal:3128"

[fetcher.headers]
Accept-Language = "en-US"
Cookie = "session=abc"

[extractor]
kind = "html"

[extractor.fields]
heading = "h1"

[filter]
rules = ["+https://example\\.com/.*", "-.*\\.png$"]
allowed-domains = ["*.example.com"]

[storage]
backend = "memory"

[seeds]
urls = ["https://example.com/"]
forced = ["https://example.com/news"]
"#;

        let file = create_temp_config(config_content);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.crawler.workers, 4);
        assert_eq!(config.crawler.max_depth, 2);
        assert_eq!(config.crawler.page_budget(), Some(100));
        assert_eq!(config.crawler.recrawl, RecrawlPolicy::Failed);
        assert_eq!(config.fetcher.user_agent, "TestCrawler/1.0");
        assert_eq!(config.fetcher.max_retries, 2);
        assert_eq!(config.fetcher.headers.get("Cookie").unwrap(), "session=abc");
        assert_eq!(config.fetcher.proxy.as_deref(), Some("http://proxy.internal:3128"));
        assert_eq!(config.extractor.fields.get("heading").unwrap(), "h1");
        assert_eq!(config.filter.rules.len(), 2);
        assert_eq!(config.storage.backend, "memory");
        assert_eq!(config.seeds.total(), 2);
    }

    #[test]
    fn test_defaults_fill_missing_sections() {
        let config = parse_config(
            r#"
[seeds]
urls = ["https://example.com/"]
"#,
        )
        .unwrap();

        assert_eq!(config.crawler.workers, 8);
        assert_eq!(config.crawler.recrawl, RecrawlPolicy::Never);
        assert_eq!(config.crawler.page_budget(), None);
        assert_eq!(config.extractor.kind, "html");
        assert_eq!(config.storage.backend, "sqlite");
        assert_eq!(config.storage.pool_size, 4);
    }

    #[test]
    fn test_load_config_with_invalid_path() {
        let result = load_config(Path::new("/nonexistent/harvest.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_with_invalid_toml() {
        let file = create_temp_config("this is not valid TOML {{{");
        let result = load_config(file.path());
        assert!(matches!(result.unwrap_err(), ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_config_with_validation_error() {
        let config_content = r#"
[crawler]
workers = 0

[seeds]
urls = ["https://example.com/"]
"#;

        let file = create_temp_config(config_content);
        let result = load_config(file.path());
        assert!(matches!(result.unwrap_err(), ConfigError::Validation(_)));
    }

    #[test]
    fn test_unknown_recrawl_policy_rejected() {
        let result = parse_config(
            r#"
[crawler]
recrawl = "sometimes"
"#,
        );
        assert!(matches!(result.unwrap_err(), ConfigError::Parse(_)));
    }

    #[test]
    fn test_compute_config_hash() {
        let file = create_temp_config("test content");

        let hash1 = compute_config_hash(file.path()).unwrap();
        let hash2 = compute_config_hash(file.path()).unwrap();

        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn test_different_content_different_hash() {
        let file1 = create_temp_config("content 1");
        let file2 = create_temp_config("content 2");

        let hash1 = compute_config_hash(file1.path()).unwrap();
        let hash2 = compute_config_hash(file2.path()).unwrap();

        assert_ne!(hash1, hash2);
    }
}
