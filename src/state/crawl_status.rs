/// Crawl status definitions for tracking crawl progress
///
/// A URL starts out `Unvisited`, is `Fetching` while a worker owns it and ends
/// one dispatch as either `Fetched` or `Failed`.
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Represents the current status of a URL in the crawl process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrawlStatus {
    /// URL has been discovered but not yet dispatched
    Unvisited,

    /// URL is currently owned by a worker
    Fetching,

    /// URL was fetched and processed
    Fetched,

    /// URL fetch failed permanently or ran out of retries
    Failed,
}

impl CrawlStatus {
    /// Returns true if this status ends a dispatch
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Fetched | Self::Failed)
    }

    /// Converts the status to its stored string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Unvisited => "unvisited",
            Self::Fetching => "fetching",
            Self::Fetched => "fetched",
            Self::Failed => "failed",
        }
    }

    /// Parses a status from its stored string representation
    ///
    /// Returns None if the string doesn't match any known status.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "unvisited" => Some(Self::Unvisited),
            "fetching" => Some(Self::Fetching),
            "fetched" => Some(Self::Fetched),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Returns all possible statuses
    pub fn all_states() -> Vec<Self> {
        vec![Self::Unvisited, Self::Fetching, Self::Fetched, Self::Failed]
    }
}

impl fmt::Display for CrawlStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

impl FromStr for CrawlStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_string(&s.to_ascii_lowercase())
            .ok_or_else(|| format!("unknown crawl status '{}'", s))
    }
}
