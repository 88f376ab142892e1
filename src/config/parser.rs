use crate::config::types::{Config, CrawlConfig};
use crate::config::validation::validate;
use crate::url::normalize_parsed;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;
use url::Url;

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
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use listing_crawler::config::load_config;
///
/// let config = load_config(Path::new("crawler.toml")).unwrap();
/// println!("Listing cap: {}", config.crawl.max_listings);
/// ```
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
/// This is recorded with every crawl run so a resumed run can be traced
/// back to the configuration that started it.
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(String)` - Hex-encoded SHA-256 hash of the file content
/// * `Err(ConfigError)` - Failed to read the file
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let result = hasher.finalize();
    Ok(hex::encode(result))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}

/// Resolves the first search-results URL
///
/// When `search-query` is configured it replaces any existing `q`
/// parameter of `search-url`. The result is normalized, so the first
/// page shares its dedup key with any link back to it.
pub fn resolve_search_url(crawl: &CrawlConfig) -> Result<Url, ConfigError> {
    let mut url = Url::parse(&crawl.search_url).map_err(|e| {
        ConfigError::InvalidUrl(format!("Invalid search-url '{}': {}", crawl.search_url, e))
    })?;

    if let Some(query) = &crawl.search_query {
        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(k, _)| k != "q")
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        url.query_pairs_mut()
            .clear()
            .extend_pairs(kept.iter())
            .append_pair("q", query);
    }

    normalize_parsed(url).map_err(|e| {
        ConfigError::InvalidUrl(format!("Invalid search-url '{}': {}", crawl.search_url, e))
    })
}
