//! HTML link extractor
//!
//! Parses the document with `scraper` and extracts:
//! - Links to follow (from <a> tags and canonical links)
//! - The page title
//! - Any configured CSS-selector fields

use super::{base_url, resolve_link, Extraction, ExtractionError, Extractor, LinkSet};
use crate::crawler::FetchResult;
use crate::ConfigError;
use scraper::{ElementRef, Html, Selector};
use std::collections::BTreeMap;

pub struct HtmlLinkExtractor {
    anchors: Selector,
    canonical: Selector,
    title: Selector,
    fields: Vec<(String, Selector)>,
}

fn parse_selector(selector: &str) -> Result<Selector, ConfigError> {
    Selector::parse(selector).map_err(|e| {
        ConfigError::Validation(format!("invalid CSS selector '{}': {}", selector, e))
    })
}

/// Text content of an element with whitespace runs collapsed
fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

impl HtmlLinkExtractor {
    /// Creates an extractor with `name -> CSS selector` field definitions
    pub fn new(fields: &BTreeMap<String, String>) -> Result<Self, ConfigError> {
        let fields = fields
            .iter()
            .map(|(name, selector)| Ok((name.clone(), parse_selector(selector)?)))
            .collect::<Result<Vec<_>, ConfigError>>()?;

        Ok(Self {
            anchors: parse_selector("a[href]")?,
            canonical: parse_selector("link[rel='canonical'][href]")?,
            title: parse_selector("title")?,
            fields,
        })
    }

    /// Collects link targets
    ///
    /// **Include:** `<a href>` anywhere in the document, `<link rel="canonical">`.
    /// **Exclude:** `<a download>`, stylesheets, scripts, images. `rel="nofollow"`
    /// links are followed.
    fn links(&self, document: &Html, page: &FetchResult) -> Result<Vec<String>, ExtractionError> {
        let base = base_url(page)?;
        let mut links = LinkSet::default();

        for element in document.select(&self.anchors) {
            if element.value().attr("download").is_some() {
                continue;
            }
            if let Some(url) = element.value().attr("href").and_then(|h| resolve_link(h, &base)) {
                links.push(url);
            }
        }

        for element in document.select(&self.canonical) {
            if let Some(url) = element.value().attr("href").and_then(|h| resolve_link(h, &base)) {
                links.push(url);
            }
        }

        Ok(links.into_vec())
    }
}

impl Extractor for HtmlLinkExtractor {
    fn name(&self) -> &'static str {
        "html"
    }

    fn extract(&self, page: &FetchResult) -> Result<Extraction, ExtractionError> {
        if !page.is_html() {
            return Ok(Extraction::default());
        }

        let document = Html::parse_document(&page.body);
        let mut fields = BTreeMap::new();

        if let Some(title) = document
            .select(&self.title)
            .next()
            .map(element_text)
            .filter(|s| !s.is_empty())
        {
            fields.insert("title".to_string(), title);
        }

        for (name, selector) in &self.fields {
            if let Some(value) = document
                .select(selector)
                .next()
                .map(element_text)
                .filter(|s| !s.is_empty())
            {
                fields.insert(name.clone(), value);
            }
        }

        Ok(Extraction {
            links: self.links(&document, page)?,
            fields,
        })
    }
}
