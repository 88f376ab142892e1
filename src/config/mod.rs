//! Configuration module for the listing crawler
//!
//! This module handles loading, parsing, and validating TOML configuration
//! files, and compiles the configured CSS selectors.
//!
//! # Example
//!
//! ```no_run
//! use listing_crawler::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("crawler.toml")).unwrap();
//! println!("Crawl will stop after {} listings", config.crawl.max_listings);
//! ```

mod parser;
mod selectors;
mod types;
mod validation;

// Re-export types
pub use selectors::SelectorSet;
pub use types::{
    BackoffConfig, BackoffStrategy, Config, CrawlConfig, DetailPriority, OutputConfig,
    ProxyConfig, SelectorConfig, UserAgentConfig,
};

// Re-export parser functions
pub use parser::{
    compute_config_hash, load_config, load_config_with_hash, parse_config, resolve_search_url,
};
