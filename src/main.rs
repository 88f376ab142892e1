//! Listing crawler main entry point
//!
//! This is the command-line interface for the listing crawl engine.

use anyhow::{Context, Result};
use clap::Parser;
use listing_crawler::config::{load_config_with_hash, resolve_search_url, Config};
use listing_crawler::crawler::run_crawl;
use listing_crawler::output::{generate_markdown_summary, generate_summary, print_summary};
use listing_crawler::sink::SqliteSink;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Listing Crawler: extracts structured listing records from a paginated
/// listings site
///
/// Follows search-result pages, fetches each listing's detail page, and
/// stores normalized records in SQLite. Interrupted crawls resume where
/// they stopped.
#[derive(Parser, Debug)]
#[command(name = "listing-crawler")]
#[command(version)]
#[command(about = "A resilient crawler for paginated real-estate listings", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Resume an interrupted crawl (default behavior)
    #[arg(long, conflicts_with = "fresh")]
    resume: bool,

    /// Start a fresh crawl, ignoring previous state
    #[arg(long, conflicts_with = "resume")]
    fresh: bool,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long, conflicts_with_all = ["stats", "export_summary"])]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with_all = ["dry_run", "export_summary"])]
    stats: bool,

    /// Generate markdown summary from existing data and exit
    #[arg(long, conflicts_with_all = ["dry_run", "stats"])]
    export_summary: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.dry_run {
        handle_dry_run(&config)
    } else if cli.stats {
        handle_stats(&config)
    } else if cli.export_summary {
        handle_export_summary(&config)
    } else {
        handle_crawl(config, &config_hash, cli.fresh).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("listing_crawler=info,warn"),
            1 => EnvFilter::new("listing_crawler=debug,info"),
            2 => EnvFilter::new("listing_crawler=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: validates config and shows the crawl plan
fn handle_dry_run(config: &Config) -> Result<()> {
    println!("=== Listing Crawler Dry Run ===\n");

    let search_url = resolve_search_url(&config.crawl)?;
    let crawl = &config.crawl;

    println!("Crawl:");
    println!("  Search URL: {}", search_url);
    println!("  Max listings: {}", crawl.max_listings);
    println!("  Include details: {}", crawl.include_details);
    println!("  Workers: {}", crawl.workers);
    println!("  Max attempts: {}", crawl.max_attempts);
    println!("  Request timeout: {}ms", crawl.request_timeout_ms);
    match crawl.deadline_secs {
        Some(secs) => println!("  Deadline: {}s", secs),
        None => println!("  Deadline: none"),
    }
    println!("  Max failure rate: {:.2}", crawl.max_failure_rate);
    println!("  Detail priority: {:?}", crawl.detail_priority);

    println!("\nBackoff:");
    println!("  Strategy: {:?}", config.backoff.strategy);
    println!("  Base delay: {}ms", config.backoff.base_delay_ms);
    println!("  Max delay: {}ms", config.backoff.max_delay_ms);

    println!("\nProxy:");
    match (config.proxy.enabled, &config.proxy.url) {
        (true, Some(url)) => println!(
            "  {} ({})",
            url,
            if config.proxy.username.is_some() {
                "with credentials"
            } else {
                "no credentials"
            }
        ),
        _ => println!("  disabled"),
    }

    println!("\nUser Agent:");
    println!("  {}", config.user_agent.header_value());

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);
    println!("  Summary: {}", config.output.summary_path);

    println!("\n✓ Configuration is valid");
    println!(
        "✓ Would crawl up to {} listings starting from {}",
        crawl.max_listings, search_url
    );

    Ok(())
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> Result<()> {
    println!("Database: {}\n", config.output.database_path);

    let sink = SqliteSink::new(Path::new(&config.output.database_path))?;
    let summary = generate_summary(&sink)?;
    print_summary(&summary);

    Ok(())
}

/// Handles the --export-summary mode: generates markdown summary
fn handle_export_summary(config: &Config) -> Result<()> {
    println!("=== Exporting Crawl Summary ===\n");
    println!("Database: {}", config.output.database_path);
    println!("Output: {}", config.output.summary_path);
    println!();

    let sink = SqliteSink::new(Path::new(&config.output.database_path))?;

    tracing::info!("Loading crawl data from database...");
    let summary = generate_summary(&sink)?;

    tracing::info!("Generating markdown summary...");
    generate_markdown_summary(&summary, Path::new(&config.output.summary_path))?;

    println!("✓ Summary exported to: {}", config.output.summary_path);

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config, config_hash: &str, fresh: bool) -> Result<()> {
    if fresh {
        tracing::info!("Starting fresh crawl (ignoring previous state)");
    } else {
        tracing::info!("Starting crawl (will resume if an unfinished run exists)");
    }

    match run_crawl(config, config_hash, fresh).await {
        Ok(report) => {
            tracing::info!(
                emitted = report.listings_emitted,
                abandoned = report.abandoned,
                interrupted = report.interrupted,
                "Crawl finished in {:?}",
                report.elapsed
            );
            Ok(())
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            Err(e.into())
        }
    }
}
