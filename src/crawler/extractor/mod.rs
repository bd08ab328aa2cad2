//! Extractor plugins
//!
//! An extractor turns a fetched page into the links to follow and a map of
//! named fields to keep with the page's record. The variant is picked by the
//! `kind` key of the `[extractor]` configuration section.

mod html;
mod pattern;

pub use html::HtmlLinkExtractor;
pub use pattern::RegexExtractor;

use crate::config::ExtractorConfig;
use crate::crawler::FetchResult;
use crate::ConfigError;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use url::Url;

/// Registry keys accepted by `build_extractor`
pub const EXTRACTORS: &[&str] = &["html", "regex"];

/// What an extractor found on a page
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    /// Absolute http(s) URLs, in document order, without duplicates
    pub links: Vec<String>,
    pub fields: BTreeMap<String, String>,
}

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("invalid page URL '{0}'")]
    InvalidBaseUrl(String),

    #[error("extractor '{extractor}' failed: {message}")]
    Failed { extractor: String, message: String },

    #[error("extractor '{extractor}' panicked: {message}")]
    Panicked { extractor: String, message: String },
}

/// Derives links and fields from fetched content
pub trait Extractor: Send + Sync {
    /// Registry key of the extractor
    fn name(&self) -> &'static str;

    fn extract(&self, page: &FetchResult) -> Result<Extraction, ExtractionError>;
}

/// Builds the extractor named by the configuration
///
/// # Returns
///
/// * `Ok(Arc<dyn Extractor>)` - Extractor with all selectors/patterns compiled
/// * `Err(ConfigError)` - Unknown kind, or a selector/pattern failed to compile
pub fn build_extractor(config: &ExtractorConfig) -> Result<Arc<dyn Extractor>, ConfigError> {
    match config.kind.as_str() {
        "html" => Ok(Arc::new(HtmlLinkExtractor::new(&config.fields)?)),
        "regex" => Ok(Arc::new(RegexExtractor::new(
            &config.link_patterns,
            &config.fields,
        )?)),
        other => Err(ConfigError::Validation(format!(
            "unknown extractor kind '{}', expected one of: {}",
            other,
            EXTRACTORS.join(", ")
        ))),
    }
}

/// Base URL for resolving relative links: the post-redirect URL
fn base_url(page: &FetchResult) -> Result<Url, ExtractionError> {
    Url::parse(&page.final_url)
        .or_else(|_| Url::parse(&page.url))
        .map_err(|_| ExtractionError::InvalidBaseUrl(page.final_url.clone()))
}

/// Resolves a link href to an absolute URL and validates it
///
/// Returns None if the link should be excluded:
/// - javascript:, mailto:, tel: schemes
/// - data: URIs
/// - fragment-only (same page) links
/// - Invalid URLs
/// - Non-HTTP(S) URLs after resolution
fn resolve_link(href: &str, base_url: &Url) -> Option<String> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lower = href.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
    {
        return None;
    }

    let absolute_url = base_url.join(href).ok()?;
    match absolute_url.scheme() {
        "http" | "https" => Some(absolute_url.to_string()),
        _ => None,
    }
}

/// Links in first-seen order, without duplicates
#[derive(Debug, Default)]
struct LinkSet {
    links: Vec<String>,
    seen: HashSet<String>,
}

impl LinkSet {
    fn push(&mut self, link: String) {
        if self.seen.insert(link.clone()) {
            self.links.push(link);
        }
    }

    fn into_vec(self) -> Vec<String> {
        self.links
    }
}

#[cfg(test)]
pub(crate) fn page(url: &str, content_type: &str, body: &str) -> FetchResult {
    FetchResult {
        url: url.to_string(),
        final_url: url.to_string(),
        status_code: 200,
        headers: reqwest::header::HeaderMap::new(),
        content_type: Some(content_type.to_string()),
        body: body.to_string(),
        retries: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://example.com/dir/page").unwrap()
    }

    #[test]
    fn test_resolve_relative_and_absolute() {
        assert_eq!(
            resolve_link("other", &base()),
            Some("https://example.com/dir/other".to_string())
        );
        assert_eq!(
            resolve_link("/root", &base()),
            Some("https://example.com/root".to_string())
        );
        assert_eq!(
            resolve_link("//cdn.example.org/x", &base()),
            Some("https://cdn.example.org/x".to_string())
        );
    }

    #[test]
    fn test_resolve_skips_special_links() {
        for href in [
            "",
            "#top",
            "javascript:void(0)",
            "JavaScript:alert(1)",
            "mailto:a@example.com",
            "tel:+123",
            "data:text/plain,hi",
            "ftp://example.com/file",
        ] {
            assert_eq!(resolve_link(href, &base()), None, "{href} should be skipped");
        }
    }

    #[test]
    fn test_link_set_keeps_first_seen_order() {
        let mut links = LinkSet::default();
        for link in [
            "https://a.test/2",
            "https://a.test/1",
            "https://a.test/2",
            "https://a.test/3",
            "https://a.test/1",
        ] {
            links.push(link.to_string());
        }
        assert_eq!(
            links.into_vec(),
            vec!["https://a.test/2", "https://a.test/1", "https://a.test/3"]
        );
    }

    #[test]
    fn test_registry() {
        let mut config = ExtractorConfig::default();
        assert_eq!(build_extractor(&config).unwrap().name(), "html");

        config.kind = "regex".to_string();
        config.link_patterns = vec![r#"href="([^"]+)""#.to_string()];
        assert_eq!(build_extractor(&config).unwrap().name(), "regex");

        config.kind = "xpath".to_string();
        assert!(build_extractor(&config).is_err());
    }
}
