//! Crawl tasks and the failure kinds that drive retries

use crate::listing::CarriedData;
use crate::url::canonical_key;
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// Role of a fetched page, deciding which extractor runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Search,
    Detail,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Search => "search",
            Self::Detail => "detail",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "search" => Some(Self::Search),
            "detail" => Some(Self::Detail),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Queue position of a task
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    #[default]
    Normal,
    Front,
}

/// Why a task attempt failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Transport error or unexpected HTTP status
    Network,
    /// Fetch exceeded the request timeout
    Timeout,
    /// Fetcher saw a block/rate-limit response
    Blocked,
    /// The page no longer exists (404/410)
    Gone,
    /// Content did not look like the expected page, typically a challenge
    Classification,
    /// The sink rejected the record
    Sink,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::Blocked => "blocked",
            Self::Gone => "gone",
            Self::Classification => "classification",
            Self::Sink => "sink",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "network" => Some(Self::Network),
            "timeout" => Some(Self::Timeout),
            "blocked" => Some(Self::Blocked),
            "gone" => Some(Self::Gone),
            "classification" => Some(Self::Classification),
            "sink" => Some(Self::Sink),
            _ => None,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of crawl work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Normalized URL to fetch
    pub url: Url,

    /// Deduplication key derived from `url`
    pub key: String,

    /// Why the URL is fetched; `None` lets the classifier sniff content
    pub role: Option<Role>,

    /// Failed attempts so far
    pub attempt: u32,

    pub priority: Priority,

    /// Card fields from the page that linked here
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carried: Option<CarriedData>,

    /// Set by the retry policy when the next attempt should use a fresh session
    #[serde(default)]
    pub rotate_session: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<FailureKind>,
}

impl Task {
    /// Creates a task for an already-normalized URL
    pub fn new(url: Url, role: Option<Role>, priority: Priority) -> Self {
        let key = canonical_key(&url);
        Self {
            url,
            key,
            role,
            attempt: 0,
            priority,
            carried: None,
            rotate_session: false,
            last_error: None,
        }
    }

    /// Creates a search-results task
    pub fn search(url: Url) -> Self {
        Self::new(url, Some(Role::Search), Priority::Normal)
    }

    /// Creates a detail task carrying the card summary it was found with
    pub fn detail(url: Url, carried: CarriedData, priority: Priority) -> Self {
        let mut task = Self::new(url, Some(Role::Detail), priority);
        task.carried = Some(carried);
        task
    }

    /// Role label used in logs and failure reports
    pub fn role_label(&self) -> &'static str {
        self.role.map_or("unknown", |r| r.as_str())
    }
}
