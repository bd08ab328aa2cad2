//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building HTTP clients with the configured user agent and limits
//! - GET requests to fetch page content
//! - Retry with exponential backoff for transient failures
//! - Error classification into transient and permanent failures

use crate::config::FetcherConfig;
use crate::ConfigError;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, RETRY_AFTER};
use reqwest::{redirect::Policy, Client, Proxy, StatusCode};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// A successfully fetched page
#[derive(Debug, Clone)]
pub struct FetchResult {
    /// URL that was requested
    pub url: String,
    /// Final URL after redirects
    pub final_url: String,
    pub status_code: u16,
    pub headers: HeaderMap,
    /// Content-Type header value, if any
    pub content_type: Option<String>,
    pub body: String,
    /// Retries needed before the successful attempt
    pub retries: u32,
}

impl FetchResult {
    /// Returns true if the Content-Type names an HTML document
    ///
    /// A missing Content-Type is treated as HTML.
    pub fn is_html(&self) -> bool {
        self.content_type.as_deref().map_or(true, |ct| {
            let ct = ct.to_ascii_lowercase();
            ct.contains("text/html") || ct.contains("application/xhtml")
        })
    }
}

/// Errors returned by a fetcher
#[derive(Debug, Error)]
pub enum FetchError {
    /// Still failing after every allowed retry
    #[error("{url}: {message} (gave up after {retries} retries)")]
    Transient {
        url: String,
        status: Option<u16>,
        message: String,
        retries: u32,
    },

    /// Not worth retrying (4xx, malformed URL, redirect limit, oversized body)
    #[error("{url}: {message}")]
    Permanent {
        url: String,
        status: Option<u16>,
        message: String,
        retries: u32,
    },
}

impl FetchError {
    pub fn retries(&self) -> u32 {
        match self {
            Self::Transient { retries, .. } | Self::Permanent { retries, .. } => *retries,
        }
    }

    /// HTTP status of the last attempt, when a response was received
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transient { status, .. } | Self::Permanent { status, .. } => *status,
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

/// Something that can retrieve a page
///
/// The scheduler is handed one of these, so tests can substitute a fake.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetches a URL, retrying transient failures internally
    ///
    /// # Arguments
    ///
    /// * `url` - The URL to fetch
    /// * `timeout` - Per-attempt request timeout
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<FetchResult, FetchError>;
}

/// Converts the configured extra headers into a header map
///
/// # Returns
///
/// * `Ok(HeaderMap)` - Headers sent with every request
/// * `Err(ConfigError)` - A header name or value is not valid HTTP
pub fn default_headers(config: &FetcherConfig) -> Result<HeaderMap, ConfigError> {
    let mut headers = HeaderMap::with_capacity(config.headers.len());

    for (name, value) in &config.headers {
        let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
            ConfigError::Validation(format!("invalid header name '{}': {}", name, e))
        })?;
        let header_value = HeaderValue::from_str(value).map_err(|e| {
            ConfigError::Validation(format!("invalid value for header '{}': {}", name, e))
        })?;
        headers.insert(header_name, header_value);
    }

    Ok(headers)
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The fetcher configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(HarvestError)` - Invalid headers or proxy, or the client failed to build
pub fn build_http_client(config: &FetcherConfig) -> crate::Result<Client> {
    let mut builder = Client::builder()
        .user_agent(config.user_agent.as_str())
        .default_headers(default_headers(config)?)
        .timeout(config.timeout())
        .connect_timeout(config.connect_timeout())
        .redirect(Policy::limited(config.max_redirects as usize))
        .gzip(true)
        .brotli(true);

    if let Some(proxy) = &config.proxy {
        tracing::info!("Routing requests through proxy {}", proxy);
        builder = builder.proxy(Proxy::all(proxy.as_str())?);
    }

    Ok(builder.build()?)
}

/// Outcome of one attempt, before retry bookkeeping
enum AttemptError {
    Transient {
        status: Option<u16>,
        message: String,
        retry_after: Option<Duration>,
    },
    Permanent {
        status: Option<u16>,
        message: String,
    },
}

/// reqwest-backed fetcher
pub struct HttpFetcher {
    client: Client,
    config: FetcherConfig,
}

impl HttpFetcher {
    pub fn new(config: FetcherConfig) -> crate::Result<Self> {
        let client = build_http_client(&config)?;
        Ok(Self { client, config })
    }

    /// Classifies a status code
    ///
    /// | Status | Action |
    /// |--------|--------|
    /// | 2xx | Success |
    /// | 408, 429, 5xx | Transient, retried |
    /// | Anything else | Permanent |
    fn classify(status: StatusCode, headers: &HeaderMap) -> Option<AttemptError> {
        if status.is_success() {
            return None;
        }

        let message = format!("HTTP {}", status.as_u16());
        if status == StatusCode::TOO_MANY_REQUESTS
            || status == StatusCode::REQUEST_TIMEOUT
            || status.is_server_error()
        {
            Some(AttemptError::Transient {
                status: Some(status.as_u16()),
                message,
                retry_after: parse_retry_after(headers),
            })
        } else {
            Some(AttemptError::Permanent {
                status: Some(status.as_u16()),
                message,
            })
        }
    }

    async fn attempt(&self, url: &Url, timeout: Duration) -> Result<FetchResult, AttemptError> {
        let mut response = self
            .client
            .get(url.clone())
            .timeout(timeout)
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status = response.status();
        if let Some(err) = Self::classify(status, response.headers()) {
            return Err(err);
        }

        if let Some(length) = response.content_length() {
            if length > self.config.max_body_size {
                return Err(AttemptError::Permanent {
                    status: Some(status.as_u16()),
                    message: format!(
                        "body of {} bytes exceeds limit of {}",
                        length, self.config.max_body_size
                    ),
                });
            }
        }

        let final_url = response.url().to_string();
        let headers = response.headers().clone();
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        // Chunked bodies carry no length, so enforce the limit while reading
        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(classify_reqwest_error)? {
            if (body.len() + chunk.len()) as u64 > self.config.max_body_size {
                return Err(AttemptError::Permanent {
                    status: Some(status.as_u16()),
                    message: format!("body exceeds limit of {} bytes", self.config.max_body_size),
                });
            }
            body.extend_from_slice(&chunk);
        }

        Ok(FetchResult {
            url: url.to_string(),
            final_url,
            status_code: status.as_u16(),
            headers,
            content_type,
            body: String::from_utf8_lossy(&body).into_owned(),
            retries: 0,
        })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<FetchResult, FetchError> {
        let parsed = match Url::parse(url) {
            Ok(u) if u.scheme() == "http" || u.scheme() == "https" => u,
            Ok(u) => {
                return Err(FetchError::Permanent {
                    url: url.to_string(),
                    status: None,
                    message: format!("unsupported scheme '{}'", u.scheme()),
                    retries: 0,
                })
            }
            Err(e) => {
                return Err(FetchError::Permanent {
                    url: url.to_string(),
                    status: None,
                    message: format!("malformed URL: {}", e),
                    retries: 0,
                })
            }
        };

        let mut retries = 0;
        loop {
            match self.attempt(&parsed, timeout).await {
                Ok(mut result) => {
                    result.retries = retries;
                    return Ok(result);
                }
                Err(AttemptError::Permanent { status, message }) => {
                    return Err(FetchError::Permanent {
                        url: url.to_string(),
                        status,
                        message,
                        retries,
                    });
                }
                Err(AttemptError::Transient {
                    status,
                    message,
                    retry_after,
                }) => {
                    if retries >= self.config.max_retries {
                        return Err(FetchError::Transient {
                            url: url.to_string(),
                            status,
                            message,
                            retries,
                        });
                    }

                    let max = Duration::from_millis(self.config.backoff_max);
                    let delay = retry_after
                        .map(|d| d.min(max))
                        .unwrap_or_else(|| self.config.backoff(retries));
                    tracing::debug!(
                        "Retrying {} in {:?} after {} (retry {}/{})",
                        url,
                        delay,
                        message,
                        retries + 1,
                        self.config.max_retries
                    );
                    tokio::time::sleep(delay).await;
                    retries += 1;
                }
            }
        }
    }
}

/// Maps a client error to transient or permanent
fn classify_reqwest_error(e: reqwest::Error) -> AttemptError {
    let status = e.status().map(|s| s.as_u16());

    if e.is_redirect() || e.is_builder() {
        AttemptError::Permanent {
            status,
            message: e.to_string(),
        }
    } else if e.is_timeout() {
        AttemptError::Transient {
            status,
            message: "request timed out".to_string(),
            retry_after: None,
        }
    } else if e.is_connect() {
        AttemptError::Transient {
            status,
            message: format!("connection failed: {}", e),
            retry_after: None,
        }
    } else {
        // Resets and truncated bodies land here
        AttemptError::Transient {
            status,
            message: e.to_string(),
            retry_after: None,
        }
    }
}

/// Reads a `Retry-After` header given in seconds
///
/// HTTP-date values are ignored and the regular backoff applies.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}
