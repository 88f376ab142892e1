use serde::Deserialize;

/// Main configuration structure for the listing crawler
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawl: CrawlConfig,
    #[serde(default)]
    pub backoff: BackoffConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(rename = "user-agent", default)]
    pub user_agent: UserAgentConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub selectors: SelectorConfig,
}

/// Crawl behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CrawlConfig {
    /// First search-results page
    pub search_url: String,

    /// Overrides the `q` query parameter of `search_url` when set
    #[serde(default)]
    pub search_query: Option<String>,

    /// Maximum number of listings to emit
    #[serde(default = "default_max_listings")]
    pub max_listings: usize,

    /// Fetch detail pages, or emit search-card summaries directly
    #[serde(default = "default_true")]
    pub include_details: bool,

    /// Number of concurrent workers (and fetch sessions)
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Ceiling on fetch attempts per task
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Per-fetch timeout (milliseconds)
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Global crawl deadline (seconds)
    #[serde(default)]
    pub deadline_secs: Option<u64>,

    /// Abandoned/finished ratio above which the crawl is reported as failed
    #[serde(default = "default_max_failure_rate")]
    pub max_failure_rate: f64,

    /// Queue position for detail tasks discovered on search pages
    #[serde(default)]
    pub detail_priority: DetailPriority,
}

/// Where newly discovered detail tasks are inserted in the frontier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetailPriority {
    /// Back of the queue, breadth-first discovery order
    #[default]
    Normal,
    /// Front of the queue, detail pages drain before further pagination
    Front,
}

/// Retry backoff configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BackoffConfig {
    /// Delay unit (milliseconds)
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// How the delay grows with the attempt count
    #[serde(default)]
    pub strategy: BackoffStrategy,

    /// Upper bound on any single delay (milliseconds)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            strategy: BackoffStrategy::default(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

/// Backoff growth strategy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    #[default]
    Fixed,
    Linear,
    Exponential,
}

/// Proxy configuration
///
/// Credentials are opaque to the engine and only handed to the fetcher.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProxyConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Proxy endpoint, required when enabled
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            crawler_name: "ListingCrawler".to_string(),
            crawler_version: env!("CARGO_PKG_VERSION").to_string(),
            contact_url: "https://example.com/about".to_string(),
            contact_email: "crawler@example.com".to_string(),
        }
    }
}

impl UserAgentConfig {
    /// Formats the user agent header value
    ///
    /// Format: `CrawlerName/Version (+ContactURL; ContactEmail)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Path to the markdown summary file
    #[serde(rename = "summary-path")]
    pub summary_path: String,
}

/// CSS selectors used by the classifier and the extractors
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct SelectorConfig {
    // ===== Search page =====
    pub card: String,
    pub card_link: String,
    pub card_title: String,
    pub card_price: String,
    pub card_location: String,
    pub next_page: String,
    pub no_results: String,

    // ===== Challenge / block page =====
    pub blocked: String,

    // ===== Detail page =====
    pub title: String,
    pub price: String,
    pub location: String,
    pub address: String,
    pub city: String,
    pub postal_code: String,
    pub description: String,
    pub details: String,
    pub images: String,
    pub agent: String,
    pub agent_name: String,
    pub agent_phone: String,
    pub agent_email: String,
    pub posted_date: String,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            card: ".listing-card".to_string(),
            card_link: "a[href]".to_string(),
            card_title: "h3".to_string(),
            card_price: ".listing-price".to_string(),
            card_location: ".listing-location".to_string(),
            next_page: ".next-page".to_string(),
            no_results: ".no-results".to_string(),
            blocked: "#challenge-form, .g-recaptcha, .cf-browser-verification, #captcha"
                .to_string(),
            title: "h1".to_string(),
            price: ".listing-price".to_string(),
            location: ".listing-location".to_string(),
            address: ".listing-address".to_string(),
            city: ".listing-city".to_string(),
            postal_code: ".listing-postal-code".to_string(),
            description: ".listing-description".to_string(),
            details: ".listing-details".to_string(),
            images: ".listing-images img".to_string(),
            agent: ".listing-agent".to_string(),
            agent_name: ".agent-name".to_string(),
            agent_phone: ".agent-phone".to_string(),
            agent_email: ".agent-email".to_string(),
            posted_date: ".listing-date".to_string(),
        }
    }
}

fn default_max_listings() -> usize {
    50
}

fn default_true() -> bool {
    true
}

fn default_workers() -> usize {
    4
}

fn default_max_attempts() -> u32 {
    3
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_max_failure_rate() -> f64 {
    1.0
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    60_000
}
