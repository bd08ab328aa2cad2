use crate::config::FilterConfig;
use crate::ConfigError;
use regex::Regex;
use url::Url;

/// Extracts the lowercase host from a URL
///
/// # Examples
///
/// ```
/// use url::Url;
/// use harvester::url::extract_domain;
///
/// let url = Url::parse("https://Blog.Example.com:8080/path").unwrap();
/// assert_eq!(extract_domain(&url), Some("blog.example.com".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// An allowed-domain entry
///
/// `example.com` matches only that host; `*.example.com` matches the bare
/// domain and any subdomain of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainPattern {
    Exact(String),
    Suffix(String),
}

impl DomainPattern {
    pub fn parse(pattern: &str) -> Self {
        let pattern = pattern.trim().to_lowercase();
        match pattern.strip_prefix("*.") {
            Some(base) => Self::Suffix(base.to_string()),
            None => Self::Exact(pattern),
        }
    }

    pub fn matches(&self, host: &str) -> bool {
        match self {
            Self::Exact(domain) => host == domain,
            Self::Suffix(base) => {
                host == base
                    || (host.len() > base.len()
                        && host.ends_with(base.as_str())
                        && host.as_bytes()[host.len() - base.len() - 1] == b'.')
            }
        }
    }
}

/// Decides which discovered links may enter the frontier
///
/// Rules are regular expressions matched against the whole URL string. A
/// leading `-` makes a rule negative, a leading `+` (or no prefix) makes it
/// positive. A URL is accepted when it matches no negative rule and, if any
/// positive rule exists, at least one positive rule. When allowed domains are
/// configured the URL's host must also match one of them.
#[derive(Debug, Clone, Default)]
pub struct UrlFilter {
    positive: Vec<Regex>,
    negative: Vec<Regex>,
    domains: Vec<DomainPattern>,
}

impl UrlFilter {
    /// Builds a filter, compiling every rule
    ///
    /// # Returns
    ///
    /// * `Ok(UrlFilter)` - All rules compiled
    /// * `Err(ConfigError::InvalidRegex)` - The first rule that failed to compile
    pub fn new<S: AsRef<str>>(rules: &[S], allowed_domains: &[S]) -> Result<Self, ConfigError> {
        let mut filter = Self::default();

        for rule in rules {
            let rule = rule.as_ref().trim();
            if rule.is_empty() {
                continue;
            }

            let (negative, body) = match rule.as_bytes()[0] {
                b'-' => (true, &rule[1..]),
                b'+' => (false, &rule[1..]),
                _ => (false, rule),
            };

            let regex = Regex::new(&format!("^(?:{})$", body)).map_err(|e| {
                ConfigError::InvalidRegex {
                    pattern: rule.to_string(),
                    message: e.to_string(),
                }
            })?;

            if negative {
                filter.negative.push(regex);
            } else {
                filter.positive.push(regex);
            }
        }

        filter.domains = allowed_domains
            .iter()
            .map(|d| DomainPattern::parse(d.as_ref()))
            .collect();

        Ok(filter)
    }

    pub fn from_config(config: &FilterConfig) -> Result<Self, ConfigError> {
        Self::new(&config.rules, &config.allowed_domains)
    }

    /// Filter that accepts every URL
    pub fn allow_all() -> Self {
        Self::default()
    }

    pub fn accepts(&self, url: &Url) -> bool {
        if !self.domains.is_empty() {
            let Some(host) = extract_domain(url) else {
                return false;
            };
            if !self.domains.iter().any(|d| d.matches(&host)) {
                return false;
            }
        }

        let candidate = url.as_str();
        if self.negative.iter().any(|r| r.is_match(candidate)) {
            return false;
        }

        self.positive.is_empty() || self.positive.iter().any(|r| r.is_match(candidate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_domain_pattern_exact() {
        let pattern = DomainPattern::parse("example.com");
        assert!(pattern.matches("example.com"));
        assert!(!pattern.matches("blog.example.com"));
        assert!(!pattern.matches("other.com"));
    }

    #[test]
    fn test_domain_pattern_wildcard() {
        let pattern = DomainPattern::parse("*.Example.com");
        assert!(pattern.matches("example.com"));
        assert!(pattern.matches("blog.example.com"));
        assert!(pattern.matches("api.v2.example.com"));
        assert!(!pattern.matches("myexample.com"));
        assert!(!pattern.matches("example.com.org"));
    }

    #[test]
    fn test_empty_filter_accepts_everything() {
        let filter = UrlFilter::allow_all();
        assert!(filter.accepts(&url("https://anything.org/x")));
    }

    #[test]
    fn test_positive_rules_must_match_whole_url() {
        let filter = UrlFilter::new(&["+https://example\\.com/blog/.*"], &[]).unwrap();
        assert!(filter.accepts(&url("https://example.com/blog/post-1")));
        assert!(!filter.accepts(&url("https://example.com/shop/item")));
        // Anchored: a prefix match is not enough
        let filter = UrlFilter::new(&["https://example\\.com/blog"], &[]).unwrap();
        assert!(!filter.accepts(&url("https://example.com/blog/post-1")));
    }

    #[test]
    fn test_negative_rules_win() {
        let filter =
            UrlFilter::new(&["+https://example\\.com/.*", "-.*\\.(png|jpg)"], &[]).unwrap();
        assert!(filter.accepts(&url("https://example.com/page")));
        assert!(!filter.accepts(&url("https://example.com/logo.png")));
    }

    #[test]
    fn test_only_negative_rules() {
        let filter = UrlFilter::new(&["-.*/private/.*"], &[]).unwrap();
        assert!(filter.accepts(&url("https://example.com/public/a")));
        assert!(!filter.accepts(&url("https://example.com/private/a")));
    }

    #[test]
    fn test_allowed_domains() {
        let filter = UrlFilter::new::<&str>(&[], &["*.example.com"]).unwrap();
        assert!(filter.accepts(&url("https://docs.example.com/")));
        assert!(!filter.accepts(&url("https://example.org/")));
    }

    #[test]
    fn test_invalid_rule_reported() {
        let err = UrlFilter::new(&["+(unclosed"], &[]).unwrap_err();
        match err {
            ConfigError::InvalidRegex { pattern, .. } => assert_eq!(pattern, "+(unclosed"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
