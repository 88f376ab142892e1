//! Listing Crawler: a resilient crawl engine for paginated real-estate listings
//!
//! This crate drives a page fetcher against search-result and detail pages,
//! deduplicates work through a frontier, extracts normalized listing records
//! and hands them to an append-only sink, retrying transient failures with a
//! configurable backoff.

pub mod config;
pub mod crawler;
pub mod extract;
pub mod listing;
pub mod output;
pub mod sink;
pub mod state;
pub mod url;

use thiserror::Error;

/// Main error type for crawl operations
///
/// Only configuration problems, unusable storage and an excessive
/// abandonment rate surface here. Per-task failures are absorbed by the
/// retry policy and reported to the sink instead.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("URL error: {0}")]
    Url(#[from] UrlError),

    #[error("Sink error: {0}")]
    Sink(#[from] sink::SinkError),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error(
        "Failure rate exceeded: {abandoned} of {finished} tasks abandoned (threshold {threshold})"
    )]
    FailureRateExceeded {
        abandoned: u64,
        finished: u64,
        threshold: f64,
    },

    #[error("Output error: {0}")]
    Output(#[from] output::OutputError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid CSS selector for '{field}': {message}")]
    InvalidSelector { field: String, message: String },
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL")]
    MissingHost,
}

/// Result type alias for crawl operations
pub type Result<T> = std::result::Result<T, CrawlError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{Coordinator, CrawlReport, Frontier, Role, Task};
pub use listing::{CarriedData, ListingRecord};
pub use sink::{FailureReport, MemorySink, Sink, SqliteSink};
pub use state::{CrawlState, TaskState};
pub use url::{canonical_key, normalize_url};
