//! Crawler coordinator - worker pool and per-task state machine
//!
//! Each worker repeatedly:
//! 1. Dequeues a task from the frontier
//! 2. Leases a fetch session and fetches the page under a timeout
//! 3. Classifies the page and runs the extractor for its role
//! 4. Enqueues discovered work or appends the record to the sink
//! 5. Routes failures through the retry policy
//!
//! Cancellation (external token or deadline) closes the frontier and returns
//! every interrupted task to the ready queue so it can be snapshotted.

use crate::config::{Config, DetailPriority, SelectorSet};
use crate::crawler::classifier::{classify, ClassificationError};
use crate::crawler::fetcher::{FetchOptions, Fetcher, RenderedPage};
use crate::crawler::frontier::Frontier;
use crate::crawler::retry::{Backoff, RetryDecision, RetryPolicy};
use crate::crawler::session::SessionPool;
use crate::crawler::task::{FailureKind, Priority, Role, Task};
use crate::extract::{extract_detail, extract_search, Card, SearchPage};
use crate::listing::ListingRecord;
use crate::sink::{FailureReport, Sink, SinkError};
use crate::state::CrawlState;
use crate::url::canonical_key;
use crate::{ConfigError, CrawlError};
use scraper::Html;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Outcome of a crawl
#[derive(Debug, Clone)]
pub struct CrawlReport {
    /// Listings emitted, including those of earlier runs when resumed
    pub listings_emitted: usize,
    pub abandoned: u64,
    pub retries: u64,
    /// Tasks that reached the Delivered state
    pub pages_done: u64,
    /// True when the crawl stopped on cancellation or deadline
    pub interrupted: bool,
    pub elapsed: Duration,
    /// Ready tasks left in the frontier, in dequeue order
    pub pending: Vec<Task>,
}

/// Engine settings taken from the configuration
#[derive(Debug, Clone)]
struct EngineSettings {
    workers: usize,
    include_details: bool,
    detail_priority: Priority,
    request_timeout: Duration,
    deadline: Option<Duration>,
    max_failure_rate: f64,
}

impl From<&Config> for EngineSettings {
    fn from(config: &Config) -> Self {
        let crawl = &config.crawl;
        Self {
            workers: crawl.workers.max(1),
            include_details: crawl.include_details,
            detail_priority: match crawl.detail_priority {
                DetailPriority::Normal => Priority::Normal,
                DetailPriority::Front => Priority::Front,
            },
            request_timeout: Duration::from_millis(crawl.request_timeout_ms),
            deadline: crawl.deadline_secs.map(Duration::from_secs),
            max_failure_rate: crawl.max_failure_rate,
        }
    }
}

/// A failed attempt at processing a fetched page
#[derive(Debug)]
struct PageFailure {
    kind: FailureKind,
    message: String,
}

impl From<ClassificationError> for PageFailure {
    fn from(err: ClassificationError) -> Self {
        let kind = match err {
            ClassificationError::Blocked => FailureKind::Blocked,
            ClassificationError::MarkersMissing { .. } => FailureKind::Classification,
        };
        Self {
            kind,
            message: err.to_string(),
        }
    }
}

impl From<SinkError> for PageFailure {
    fn from(err: SinkError) -> Self {
        Self {
            kind: FailureKind::Sink,
            message: err.to_string(),
        }
    }
}

/// State shared by all workers
struct Shared {
    frontier: Frontier,
    state: CrawlState,
    sessions: SessionPool,
    policy: RetryPolicy,
    selectors: SelectorSet,
    fetcher: Arc<dyn Fetcher>,
    sink: Arc<dyn Sink>,
    settings: EngineSettings,
    cancel: CancellationToken,
}

/// Main crawler coordinator structure
pub struct Coordinator {
    shared: Arc<Shared>,
}

impl Coordinator {
    /// Creates a coordinator for a fresh crawl
    ///
    /// # Arguments
    ///
    /// * `config` - The crawler configuration
    /// * `fetcher` - Turns URLs into page content
    /// * `sink` - Receives records and failure reports
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Ready to be seeded and run
    /// * `Err(ConfigError)` - A selector in the configuration does not compile
    pub fn new(
        config: &Config,
        fetcher: Arc<dyn Fetcher>,
        sink: Arc<dyn Sink>,
    ) -> Result<Self, ConfigError> {
        let state = CrawlState::new(config.crawl.max_listings);
        Self::with_state(config, fetcher, sink, state)
    }

    /// Creates a coordinator with pre-seeded counters, for resumed crawls
    pub fn with_state(
        config: &Config,
        fetcher: Arc<dyn Fetcher>,
        sink: Arc<dyn Sink>,
        state: CrawlState,
    ) -> Result<Self, ConfigError> {
        let settings = EngineSettings::from(config);
        let selectors = SelectorSet::compile(&config.selectors)?;
        let policy = RetryPolicy::new(config.crawl.max_attempts, Backoff::from(&config.backoff));

        Ok(Self {
            shared: Arc::new(Shared {
                frontier: Frontier::new(),
                state,
                sessions: SessionPool::new(settings.workers),
                policy,
                selectors,
                fetcher,
                sink,
                settings,
                cancel: CancellationToken::new(),
            }),
        })
    }

    /// Token that stops the crawl when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shared.cancel.clone()
    }

    pub fn frontier(&self) -> &Frontier {
        &self.shared.frontier
    }

    pub fn state(&self) -> &CrawlState {
        &self.shared.state
    }

    /// Adds a starting task
    ///
    /// Detail tasks take a share of the listings budget; they are dropped
    /// when the cap is already committed.
    pub fn seed(&self, task: Task) -> bool {
        let shared = &self.shared;
        match task.role {
            Some(Role::Detail) => {
                if shared.state.reserve(1) == 0 {
                    debug!(url = %task.url, "Listings cap reached, dropping detail seed");
                    return false;
                }
                let enqueued = shared.frontier.enqueue(task);
                if !enqueued {
                    shared.state.release(1);
                }
                enqueued
            }
            _ if shared.state.cap_reached() => {
                debug!(url = %task.url, "Listings cap reached, dropping seed");
                false
            }
            _ => shared.frontier.enqueue(task),
        }
    }

    /// Marks a URL as already emitted, e.g. by an earlier run
    pub fn mark_delivered(&self, url: &str) -> bool {
        match crate::url::normalize_url(url) {
            Ok(url) => self.shared.frontier.mark_delivered_key(&canonical_key(&url)),
            Err(_) => false,
        }
    }

    /// Runs the crawl until the frontier is idle-empty or the crawl is cancelled
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlReport)` - Crawl finished or was interrupted
    /// * `Err(CrawlError::FailureRateExceeded)` - Too many tasks were abandoned
    pub async fn run(&self) -> Result<CrawlReport, CrawlError> {
        let shared = &self.shared;
        let started = Instant::now();

        info!(
            workers = shared.settings.workers,
            cap = shared.state.cap(),
            emitted = shared.state.listings_emitted(),
            queued = shared.frontier.len(),
            "Starting crawl"
        );

        let deadline_guard = shared.settings.deadline.map(|deadline| {
            let token = shared.cancel.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = token.cancelled() => {}
                    _ = tokio::time::sleep(deadline) => {
                        info!(deadline_secs = deadline.as_secs(), "Crawl deadline reached");
                        token.cancel();
                    }
                }
            })
        });

        let handles: Vec<JoinHandle<()>> = (0..shared.settings.workers)
            .map(|worker| {
                let shared = Arc::clone(shared);
                tokio::spawn(async move { shared.worker_loop(worker).await })
            })
            .collect();

        for handle in handles {
            if let Err(e) = handle.await {
                error!("Worker task failed: {}", e);
            }
        }

        if let Some(guard) = deadline_guard {
            guard.abort();
        }

        let interrupted = shared.frontier.is_closed();
        let report = CrawlReport {
            listings_emitted: shared.state.listings_emitted(),
            abandoned: shared.state.failed_count(),
            retries: shared.state.retry_count(),
            pages_done: shared.state.done_count(),
            interrupted,
            elapsed: started.elapsed(),
            pending: shared.frontier.snapshot(),
        };

        if interrupted {
            info!(
                pending = report.pending.len(),
                emitted = report.listings_emitted,
                "Crawl interrupted"
            );
        } else {
            info!(
                emitted = report.listings_emitted,
                abandoned = report.abandoned,
                retries = report.retries,
                "Crawl completed in {:?}",
                report.elapsed
            );
        }

        let threshold = shared.settings.max_failure_rate;
        if !interrupted && shared.state.failure_rate() > threshold {
            let abandoned = shared.state.failed_count();
            return Err(CrawlError::FailureRateExceeded {
                abandoned,
                finished: abandoned + shared.state.done_count(),
                threshold,
            });
        }

        Ok(report)
    }
}

impl Shared {
    async fn worker_loop(&self, worker: usize) {
        loop {
            let task = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    self.shut_down();
                    break;
                }
                task = self.frontier.dequeue() => match task {
                    Some(task) => task,
                    None => break,
                },
            };

            self.process(worker, task).await;
        }

        debug!(worker, "Worker finished");
    }

    async fn process(&self, worker: usize, task: Task) {
        // The pool is closed on cancellation
        let Some(lease) = self.sessions.acquire().await else {
            return self.interrupt(task);
        };

        let session = if task.rotate_session {
            lease.rotate()
        } else {
            lease.hint()
        };
        let options = FetchOptions {
            timeout: self.settings.request_timeout,
            session,
        };

        debug!(
            worker,
            url = %task.url,
            role = task.role_label(),
            attempt = task.attempt,
            slot = session.slot,
            "Fetching"
        );

        let fetched = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                drop(lease);
                return self.interrupt(task);
            }
            result = tokio::time::timeout(
                self.settings.request_timeout,
                self.fetcher.fetch(&task.url, &options),
            ) => result,
        };
        drop(lease);

        let outcome = match fetched {
            Ok(Ok(page)) => self.handle_page(&task, &page),
            Ok(Err(e)) => Err(PageFailure {
                kind: e.kind.into(),
                message: e.message,
            }),
            Err(_) => Err(PageFailure {
                kind: FailureKind::Timeout,
                message: format!("no response within {:?}", self.settings.request_timeout),
            }),
        };

        match outcome {
            Ok(()) => {
                self.frontier.mark_done(&task);
                self.state.record_done();
            }
            Err(failure) => self.fail(task, failure).await,
        }
    }

    /// Parses, classifies and extracts a fetched page
    ///
    /// Runs without suspension points: the parsed document is not `Send`.
    fn handle_page(&self, task: &Task, page: &RenderedPage) -> Result<(), PageFailure> {
        let document = Html::parse_document(&page.html);

        match classify(task, &document, &self.selectors)? {
            Role::Search => {
                let limit = self.state.remaining();
                let search = extract_search(&document, &page.url, &self.selectors, limit, |key| {
                    self.frontier.is_known(key)
                });
                drop(document);
                self.apply_search(task, search)
            }
            Role::Detail => {
                let record = extract_detail(
                    &document,
                    &task.url,
                    &page.url,
                    task.carried.as_ref(),
                    &self.selectors,
                );
                drop(document);
                self.apply_detail(task, record)
            }
        }
    }

    fn apply_search(&self, task: &Task, page: SearchPage) -> Result<(), PageFailure> {
        let found = page.cards.len();
        let granted = self.state.reserve(found);
        let mut used = 0;

        let result = if self.settings.include_details {
            for card in page.cards {
                if used == granted {
                    break;
                }
                let detail = Task::detail(card.url, card.summary, self.settings.detail_priority);
                if self.frontier.enqueue(detail) {
                    used += 1;
                }
            }
            Ok(())
        } else {
            self.emit_summaries(page.cards, granted, &mut used)
        };

        self.state.release(granted - used);
        result?;

        debug!(
            url = %task.url,
            cards = found,
            skipped = page.skipped,
            known = page.known,
            accepted = used,
            "Processed search page"
        );

        match page.next {
            Some(next) if self.state.remaining() > 0 => {
                if self.frontier.enqueue(Task::search(next.clone())) {
                    debug!(url = %next, "Enqueued next search page");
                }
            }
            Some(_) => info!(url = %task.url, "Listings cap reached, not following next page"),
            None => info!(url = %task.url, "No next page"),
        }

        Ok(())
    }

    /// Emits card summaries directly, deduplicated through the frontier
    fn emit_summaries(
        &self,
        cards: Vec<Card>,
        granted: usize,
        used: &mut usize,
    ) -> Result<(), PageFailure> {
        for card in cards {
            if *used == granted {
                break;
            }

            let key = canonical_key(&card.url);
            if !self.frontier.mark_delivered_key(&key) {
                debug!(url = %card.url, "Summary already emitted");
                continue;
            }

            let record = ListingRecord::from_carried(card.url.as_str(), &card.summary);
            if let Err(e) = self.sink.append(&record) {
                self.frontier.unmark_delivered_key(&key);
                return Err(e.into());
            }

            let emitted = self.state.record_emitted();
            *used += 1;
            debug!(url = %card.url, emitted, "Emitted listing summary");
        }
        Ok(())
    }

    fn apply_detail(&self, task: &Task, record: ListingRecord) -> Result<(), PageFailure> {
        // Tasks seeded without a role hold no reservation yet
        if task.role != Some(Role::Detail) && self.state.reserve(1) == 0 {
            info!(url = %task.url, "Listings cap reached, not emitting");
            return Ok(());
        }

        if let Err(e) = self.sink.append(&record) {
            if task.role != Some(Role::Detail) {
                self.state.release(1);
            }
            return Err(e.into());
        }

        let emitted = self.state.record_emitted();
        info!(url = %task.url, emitted, cap = self.state.cap(), "Emitted listing");
        if emitted >= self.state.cap() {
            info!(cap = self.state.cap(), "Listings cap reached");
        }
        Ok(())
    }

    async fn fail(&self, mut task: Task, failure: PageFailure) {
        match self.policy.decide(&task, failure.kind) {
            RetryDecision::Retry {
                delay,
                rotate_session,
            } => {
                warn!(
                    url = %task.url,
                    role = task.role_label(),
                    attempt = task.attempt + 1,
                    kind = %failure.kind,
                    delay_ms = delay.as_millis() as u64,
                    "Task failed, retrying: {}",
                    failure.message
                );
                self.state.record_retry();

                task.attempt += 1;
                task.last_error = Some(failure.kind);
                task.rotate_session = rotate_session;

                // On cancellation the task goes back unchanged for the snapshot
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => {}
                    _ = tokio::time::sleep(delay) => {}
                }
                self.frontier.requeue(task);
            }
            RetryDecision::Abandon => self.abandon(task, failure),
        }
    }

    fn abandon(&self, task: Task, failure: PageFailure) {
        if !self.frontier.mark_failed(&task) {
            return;
        }

        self.state.record_failed();
        if task.role == Some(Role::Detail) {
            self.state.release(1);
        }

        let attempts = task.attempt + 1;
        error!(
            url = %task.url,
            role = task.role_label(),
            attempts,
            kind = %failure.kind,
            "Abandoning task: {}",
            failure.message
        );

        let report = FailureReport {
            url: task.url.to_string(),
            role: task.role,
            attempts,
            last_error_kind: failure.kind,
            message: Some(failure.message),
        };
        if let Err(e) = self.sink.append_failure(&report) {
            error!(url = %task.url, "Failed to record failure report: {}", e);
        }
    }

    /// Returns a task interrupted by cancellation to the ready queue
    fn interrupt(&self, task: Task) {
        debug!(url = %task.url, "Returning interrupted task to the frontier");
        self.shut_down();
        self.frontier.requeue(task);
    }

    /// Stops handing out tasks and sessions
    fn shut_down(&self) {
        self.frontier.close();
        self.sessions.close();
    }
}
