//! Crawler module: the crawl engine
//!
//! This module contains the core crawling logic, including:
//! - Tasks and the deduplicating frontier
//! - Page classification and the retry policy
//! - The fetcher seam and its session pool
//! - Overall crawl coordination, persistence and resume

mod classifier;
mod coordinator;
mod fetcher;
mod frontier;
mod retry;
mod session;
mod task;

pub use classifier::{classify, ClassificationError};
pub use coordinator::{Coordinator, CrawlReport};
pub use fetcher::{
    classify_status, FetchError, FetchErrorKind, FetchOptions, Fetcher, HttpFetcher, RenderedPage,
};
pub use frontier::Frontier;
pub use retry::{Backoff, RetryDecision, RetryPolicy};
pub use session::{SessionHint, SessionLease, SessionPool};
pub use task::{FailureKind, Priority, Role, Task};

use crate::config::{resolve_search_url, Config};
use crate::output::{generate_markdown_summary, summarize_run};
use crate::sink::{RunStatus, SqliteSink};
use crate::state::CrawlState;
use crate::CrawlError;
use std::path::Path;
use std::sync::Arc;

/// Runs a complete crawl against the configured site
///
/// This is the main entry point for starting a crawl. It will:
/// 1. Open the SQLite sink
/// 2. Resume the latest unfinished run, or create a new one
/// 3. Seed the frontier from the saved snapshot or the search URL
/// 4. Run the coordinator until the frontier drains or Ctrl-C arrives
/// 5. Snapshot the frontier on interruption, or write the summary on completion
///
/// # Arguments
///
/// * `config` - The crawler configuration
/// * `config_hash` - Hash recorded with a newly created run
/// * `fresh` - Ignore any unfinished run and start from the search URL
///
/// # Returns
///
/// * `Ok(CrawlReport)` - Crawl completed or was interrupted
/// * `Err(CrawlError)` - Storage was unusable or too many tasks were abandoned
pub async fn run_crawl(
    config: Config,
    config_hash: &str,
    fresh: bool,
) -> Result<CrawlReport, CrawlError> {
    let sink = Arc::new(SqliteSink::new(Path::new(&config.output.database_path))?);
    let cap = config.crawl.max_listings;

    let resumable = if fresh {
        None
    } else {
        sink.get_latest_run()?
            .filter(|run| run.status.is_resumable())
    };

    let fetcher = Arc::new(HttpFetcher::new(&config.user_agent, &config.proxy)?);

    let (run_id, coordinator) = match resumable {
        Some(run) => {
            sink.resume_run(run.id)?;
            let emitted_urls = sink.emitted_urls(run.id)?;
            let pending = sink.load_frontier(run.id)?;
            tracing::info!(
                run = run.id,
                emitted = emitted_urls.len(),
                pending = pending.len(),
                "Resuming run"
            );

            let state = CrawlState::with_emitted(cap, emitted_urls.len());
            let coordinator = Coordinator::with_state(&config, fetcher, sink.clone(), state)?;
            for url in &emitted_urls {
                coordinator.mark_delivered(url);
            }

            if pending.is_empty() {
                // Interrupted before the first snapshot
                coordinator.seed(Task::search(resolve_search_url(&config.crawl)?));
            } else {
                for task in pending {
                    coordinator.seed(task);
                }
            }
            (run.id, coordinator)
        }
        None => {
            if let Some(previous) = sink.get_latest_run()? {
                if previous.status.is_resumable() {
                    tracing::info!(run = previous.id, "Discarding unfinished run");
                    sink.clear_frontier(previous.id)?;
                    sink.finish_run(previous.id, RunStatus::Failed)?;
                }
            }

            let run_id = sink.create_run(config_hash)?;
            tracing::info!(run = run_id, "Starting new run");
            let coordinator = Coordinator::new(&config, fetcher, sink.clone())?;
            coordinator.seed(Task::search(resolve_search_url(&config.crawl)?));
            (run_id, coordinator)
        }
    };

    let token = coordinator.cancellation_token();
    let interrupt_watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, stopping crawl");
            token.cancel();
        }
    });

    let result = coordinator.run().await;
    interrupt_watcher.abort();

    let report = match result {
        Ok(report) => report,
        Err(e) => {
            sink.clear_frontier(run_id)?;
            sink.finish_run(run_id, RunStatus::Failed)?;
            write_summary(&sink, run_id, &config);
            return Err(e);
        }
    };

    if report.interrupted {
        sink.save_frontier(run_id, &report.pending)?;
        sink.update_run_status(run_id, RunStatus::Interrupted)?;
        tracing::info!(
            run = run_id,
            pending = report.pending.len(),
            "Saved frontier; run again without --fresh to resume"
        );
    } else {
        sink.clear_frontier(run_id)?;
        sink.finish_run(run_id, RunStatus::Completed)?;
        write_summary(&sink, run_id, &config);
    }

    Ok(report)
}

fn write_summary(sink: &SqliteSink, run_id: i64, config: &Config) {
    let path = Path::new(&config.output.summary_path);
    let written = summarize_run(sink, run_id)
        .and_then(|summary| generate_markdown_summary(&summary, path));

    match written {
        Ok(()) => tracing::info!("Summary written to {}", path.display()),
        Err(e) => tracing::warn!("Failed to write summary: {}", e),
    }
}
