//! Regular-expression extractor
//!
//! Works on any content type. Link patterns yield their first capture group
//! (or the whole match) resolved against the page URL; field patterns keep
//! the first match.

use super::{base_url, resolve_link, Extraction, ExtractionError, Extractor, LinkSet};
use crate::crawler::FetchResult;
use crate::ConfigError;
use regex::{Captures, Regex};
use std::collections::BTreeMap;

pub struct RegexExtractor {
    link_patterns: Vec<Regex>,
    fields: Vec<(String, Regex)>,
}

fn compile(pattern: &str) -> Result<Regex, ConfigError> {
    Regex::new(pattern).map_err(|e| ConfigError::InvalidRegex {
        pattern: pattern.to_string(),
        message: e.to_string(),
    })
}

/// First capture group if the pattern has one, else the whole match
fn captured<'h>(caps: &Captures<'h>) -> Option<&'h str> {
    caps.get(1).or_else(|| caps.get(0)).map(|m| m.as_str())
}

impl RegexExtractor {
    pub fn new(
        link_patterns: &[String],
        fields: &BTreeMap<String, String>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            link_patterns: link_patterns
                .iter()
                .map(|p| compile(p))
                .collect::<Result<_, _>>()?,
            fields: fields
                .iter()
                .map(|(name, p)| Ok((name.clone(), compile(p)?)))
                .collect::<Result<_, ConfigError>>()?,
        })
    }
}

impl Extractor for RegexExtractor {
    fn name(&self) -> &'static str {
        "regex"
    }

    fn extract(&self, page: &FetchResult) -> Result<Extraction, ExtractionError> {
        let base = base_url(page)?;
        let mut extraction = Extraction::default();
        let mut links = LinkSet::default();

        for pattern in &self.link_patterns {
            for caps in pattern.captures_iter(&page.body) {
                if let Some(url) = captured(&caps).and_then(|href| resolve_link(href, &base)) {
                    links.push(url);
                }
            }
        }

        extraction.links = links.into_vec();

        for (name, pattern) in &self.fields {
            if let Some(value) = pattern
                .captures(&page.body)
                .as_ref()
                .and_then(captured)
                .map(str::trim)
                .filter(|v| !v.is_empty())
            {
                extraction.fields.insert(name.clone(), value.to_string());
            }
        }

        Ok(extraction)
    }
}
