//! Crawl orchestration
//!
//! This module contains the worker pool that drives a crawl:
//! - Seeding the work queue (or reloading it from the state store on resume)
//! - Admission through the shared rate limiter
//! - Classifying fetch outcomes into store transitions
//! - Stop conditions: drained queue, page and runtime limits, the circuit
//!   breaker, and external cancellation
//!
//! Workers share one `Arc<Mutex<SqliteStorage>>`; the lock is only ever held
//! for synchronous store calls, never across an await.

use crate::config::CrawlerConfig;
use crate::crawler::circuit_breaker::CircuitBreaker;
use crate::crawler::fetcher::{FetchError, FetchResponse, PageFetcher};
use crate::crawler::parser::ContentProcessor;
use crate::crawler::queue::{Dequeue, WorkItem, WorkQueue};
use crate::crawler::rate_limiter::{AcquireError, RateLimiter};
use crate::crawler::retry::backoff_delay;
use crate::output::{plan_output_path, DocumentSink};
use crate::state::{PageStatus, Session};
use crate::storage::{RedirectEdge, SqliteStorage, Storage};
use crate::url::{normalize_url, resolve_href, CrawlScope};
use crate::{MirrorError, Result};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

/// Completed pages between progress lines and session checkpoints
pub const PROGRESS_INTERVAL: u64 = 10;

/// Why a crawl run stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionOutcome {
    /// Nothing left to fetch
    Completed,
    PageLimitReached,
    RuntimeLimitReached,
    /// External cancellation (Ctrl-C)
    Interrupted,
    /// Too many consecutive failures
    HaltedByCircuitBreaker,
}

impl SessionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionOutcome::Completed => "completed",
            SessionOutcome::PageLimitReached => "page_limit_reached",
            SessionOutcome::RuntimeLimitReached => "runtime_limit_reached",
            SessionOutcome::Interrupted => "interrupted",
            SessionOutcome::HaltedByCircuitBreaker => "halted_by_circuit_breaker",
        }
    }

    /// Process exit code for this outcome
    pub fn exit_code(&self) -> i32 {
        match self {
            SessionOutcome::Completed
            | SessionOutcome::PageLimitReached
            | SessionOutcome::RuntimeLimitReached => 0,
            SessionOutcome::HaltedByCircuitBreaker => 2,
            SessionOutcome::Interrupted => 130,
        }
    }

    /// True when the mirror is consistent enough to resolve links
    pub fn allows_resolution(&self) -> bool {
        self.exit_code() == 0
    }
}

impl fmt::Display for SessionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-run stop conditions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrawlLimits {
    /// Maximum distance from a seed
    pub max_depth: Option<u32>,
    /// Maximum pages completed by this run
    pub max_pages: Option<u64>,
    /// Maximum wall-clock time for this run
    pub max_runtime: Option<Duration>,
}

impl CrawlLimits {
    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self {
            max_depth: config.max_depth,
            max_pages: config.page_limit(),
            max_runtime: config.runtime_limit(),
        }
    }
}

#[derive(Debug, Clone)]
struct CrawlSettings {
    workers: usize,
    max_attempts: u32,
    backoff_initial: Duration,
    backoff_max: Duration,
    acquire_timeout: Duration,
}

impl CrawlSettings {
    fn from_config(config: &CrawlerConfig) -> Self {
        Self {
            workers: config.workers.max(1) as usize,
            max_attempts: config.max_retries.max(1),
            backoff_initial: Duration::from_millis(config.backoff_initial_ms),
            backoff_max: Duration::from_millis(config.backoff_max_ms),
            acquire_timeout: config.acquire_timeout(),
        }
    }
}

/// Drives crawl runs against one state store
pub struct Orchestrator {
    storage: Arc<Mutex<SqliteStorage>>,
    session: Arc<Session>,
    scope: Arc<CrawlScope>,
    fetcher: Arc<dyn PageFetcher>,
    processor: Arc<dyn ContentProcessor>,
    sink: Arc<dyn DocumentSink>,
    limiter: Arc<RateLimiter>,
    breaker: Arc<CircuitBreaker>,
    settings: CrawlSettings,
}

impl Orchestrator {
    /// Creates an orchestrator
    ///
    /// The rate limiter and circuit breaker are built from `config` and live
    /// as long as the orchestrator.
    pub fn new(
        storage: Arc<Mutex<SqliteStorage>>,
        session: Arc<Session>,
        scope: CrawlScope,
        fetcher: Arc<dyn PageFetcher>,
        processor: Arc<dyn ContentProcessor>,
        sink: Arc<dyn DocumentSink>,
        config: &CrawlerConfig,
    ) -> Self {
        Self {
            storage,
            session,
            scope: Arc::new(scope),
            fetcher,
            processor,
            sink,
            limiter: Arc::new(RateLimiter::new(config.request_delay())),
            breaker: Arc::new(CircuitBreaker::new(config.circuit_breaker_threshold)),
            settings: CrawlSettings::from_config(config),
        }
    }

    /// Runs the crawl until a stop condition is met
    ///
    /// Seeds are inserted at depth 0 (already known seeds are left alone),
    /// then every page the store still considers pending is queued, so a
    /// resumed run continues where the previous one stopped.
    ///
    /// On return no page is left InProgress and the session has been
    /// persisted with the outcome.
    pub async fn run(
        &self,
        seeds: &[String],
        limits: CrawlLimits,
        shutdown: CancellationToken,
    ) -> Result<SessionOutcome> {
        let run = Arc::new(CrawlRun {
            storage: self.storage.clone(),
            session: self.session.clone(),
            scope: self.scope.clone(),
            fetcher: self.fetcher.clone(),
            processor: self.processor.clone(),
            sink: self.sink.clone(),
            limiter: self.limiter.clone(),
            breaker: self.breaker.clone(),
            settings: self.settings.clone(),
            limits,
            queue: WorkQueue::new(),
            stop: shutdown.child_token(),
            halt_reason: Mutex::new(None),
            completed: AtomicU64::new(0),
            started: Instant::now(),
        });

        let queued = run.seed(seeds)?;
        info!(
            "Starting crawl of {} with {} workers, {} URLs queued",
            run.scope.root(),
            run.settings.workers,
            queued
        );

        let mut workers = JoinSet::new();
        for id in 0..run.settings.workers {
            let run = run.clone();
            workers.spawn(async move { run.worker(id).await });
        }

        let mut first_error: Option<MirrorError> = None;
        while let Some(joined) = workers.join_next().await {
            let failure = match joined {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e),
                Err(e) => Some(MirrorError::Worker(e.to_string())),
            };
            if let Some(e) = failure {
                error!("Worker failed: {}", e);
                run.stop.cancel();
                first_error.get_or_insert(e);
            }
        }

        let outcome = run.outcome(&shutdown);

        let released = run.store()?.reset_in_progress()?;
        if released > 0 {
            info!("Released {} unfinished pages for the next run", released);
        }

        if let Some(e) = first_error {
            run.persist_session(Some("error"))?;
            return Err(e);
        }
        run.persist_session(Some(outcome.as_str()))?;

        info!(
            "Crawl stopped ({}): {} pages written this run in {:?}",
            outcome,
            run.completed.load(Ordering::SeqCst),
            run.started.elapsed()
        );
        Ok(outcome)
    }
}

/// State shared by the workers of one run
struct CrawlRun {
    storage: Arc<Mutex<SqliteStorage>>,
    session: Arc<Session>,
    scope: Arc<CrawlScope>,
    fetcher: Arc<dyn PageFetcher>,
    processor: Arc<dyn ContentProcessor>,
    sink: Arc<dyn DocumentSink>,
    limiter: Arc<RateLimiter>,
    breaker: Arc<CircuitBreaker>,
    settings: CrawlSettings,
    limits: CrawlLimits,
    queue: WorkQueue,
    stop: CancellationToken,
    halt_reason: Mutex<Option<SessionOutcome>>,
    completed: AtomicU64,
    started: Instant,
}

impl CrawlRun {
    fn store(&self) -> Result<MutexGuard<'_, SqliteStorage>> {
        Ok(self.storage.lock()?)
    }

    /// Records the first stop reason and tells every worker to stop
    fn halt(&self, outcome: SessionOutcome) {
        if let Ok(mut reason) = self.halt_reason.lock() {
            reason.get_or_insert(outcome);
        }
        self.stop.cancel();
    }

    fn outcome(&self, shutdown: &CancellationToken) -> SessionOutcome {
        let reason = self.halt_reason.lock().ok().and_then(|r| *r);
        match reason {
            Some(outcome) => outcome,
            None if shutdown.is_cancelled() => SessionOutcome::Interrupted,
            None => SessionOutcome::Completed,
        }
    }

    fn seed(&self, seeds: &[String]) -> Result<usize> {
        let pending = {
            let mut storage = self.store()?;
            for seed in seeds {
                match normalize_url(seed) {
                    Ok(url) if self.scope.contains(&url) => {
                        if storage.insert_discovered(url.as_str(), 0, None)? {
                            debug!("Seeded {}", url);
                        }
                    }
                    Ok(url) => warn!("Seed {} is outside the crawl scope, skipping", url),
                    Err(e) => warn!("Invalid seed {}: {}", seed, e),
                }
            }
            storage.pending_pages(self.settings.max_attempts)?
        };

        let count = pending.len();
        for page in pending {
            self.queue.push(WorkItem::new(page.url, page.depth));
        }
        Ok(count)
    }

    async fn worker(self: Arc<Self>, id: usize) -> Result<()> {
        debug!("Worker {} started", id);
        while let Some(item) = self.next_item().await {
            let result = self.process(item).await;
            self.queue.finish();
            result?;
        }
        debug!("Worker {} stopped", id);
        Ok(())
    }

    /// Blocks until there is work or the run must stop
    async fn next_item(&self) -> Option<WorkItem> {
        loop {
            if self.stop.is_cancelled() {
                return None;
            }
            if self.breaker.is_tripped() {
                self.halt(SessionOutcome::HaltedByCircuitBreaker);
                return None;
            }
            if let Some(limit) = self.limits.max_runtime {
                if self.started.elapsed() >= limit {
                    info!("Runtime limit of {:?} reached", limit);
                    self.halt(SessionOutcome::RuntimeLimitReached);
                    return None;
                }
            }

            let completed = self.completed.load(Ordering::SeqCst);
            match self.queue.pop(self.limits.max_pages, completed) {
                Dequeue::Item(item) => return Some(item),
                Dequeue::Wait(delay) => {
                    tokio::select! {
                        _ = self.stop.cancelled() => return None,
                        _ = self.queue.wait(delay) => {}
                    }
                }
                Dequeue::Drained => {
                    self.halt(SessionOutcome::Completed);
                    return None;
                }
                Dequeue::LimitReached => {
                    info!("Page limit of {} reached", completed);
                    self.halt(SessionOutcome::PageLimitReached);
                    return None;
                }
            }
        }
    }

    async fn process(&self, item: WorkItem) -> Result<()> {
        if let Some(max_depth) = self.limits.max_depth {
            if item.depth > max_depth {
                debug!("Skipping {} beyond max depth {}", item.url, max_depth);
                self.session.record_skipped();
                return Ok(());
            }
        }

        let settled = self
            .store()?
            .lookup(&item.url)?
            .map_or(false, |record| record.is_settled(self.settings.max_attempts));
        if settled {
            debug!("Skipping already settled {}", item.url);
            self.session.record_skipped();
            return Ok(());
        }

        match self
            .limiter
            .acquire(&self.stop, self.settings.acquire_timeout)
            .await
        {
            Ok(()) => {}
            Err(AcquireError::Cancelled) => return Ok(()),
            Err(AcquireError::TimedOut) => {
                warn!("Timed out waiting for a request slot for {}, requeueing", item.url);
                self.queue.push(item);
                return Ok(());
            }
        }

        let claimed = self
            .store()?
            .claim_for_fetch(&item.url, self.settings.max_attempts)?;
        if !claimed {
            debug!("{} is held by another worker or already settled", item.url);
            return Ok(());
        }

        debug!("Fetching {} (depth {})", item.url, item.depth);
        let result = self.fetcher.fetch(&item.url).await;
        self.handle_fetch(&item, result)
    }

    fn handle_fetch(
        &self,
        item: &WorkItem,
        result: std::result::Result<FetchResponse, FetchError>,
    ) -> Result<()> {
        let response = match result {
            Ok(response) => response,
            Err(e) => {
                return self.record_failure(&item.url, item.depth, &e.to_string(), !e.is_retryable())
            }
        };

        for edge in &response.redirects {
            self.record_edge(edge)?;
        }

        match response.status {
            200..=299 => self.handle_success(item, response),
            300..=399 => self.handle_redirect(item, response.location.as_deref()),
            429 | 500..=599 => self.record_failure(
                &item.url,
                item.depth,
                &format!("HTTP {}", response.status),
                false,
            ),
            status => {
                self.record_failure(&item.url, item.depth, &format!("HTTP {}", status), true)
            }
        }
    }

    fn handle_success(&self, item: &WorkItem, response: FetchResponse) -> Result<()> {
        let final_url = normalize_url(&response.final_url)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| item.url.clone());

        // The fetcher followed redirects: the content belongs to the final URL
        let content_url = if final_url == item.url {
            item.url.clone()
        } else {
            let target = Url::parse(&final_url)?;

            // Fetchers that follow redirects silently report no hops; the
            // source still needs an edge to its final URL
            let has_edge = response.redirects.iter().any(|edge| {
                normalize_url(&edge.source).map_or(false, |source| source.as_str() == item.url)
            });
            if !has_edge {
                self.record_edge(&RedirectEdge::new(item.url.as_str(), final_url.as_str()))?;
            }

            let mut storage = self.store()?;
            storage.mark_redirected(&item.url)?;
            self.session.record_redirected();
            self.breaker.record_success();

            if !self.scope.contains(&target) {
                info!("{} redirects out of scope to {}", item.url, final_url);
                return Ok(());
            }

            storage.insert_discovered(&final_url, item.depth, Some(&item.url))?;
            if !storage.claim_for_fetch(&final_url, self.settings.max_attempts)? {
                debug!("Redirect target {} is already handled", final_url);
                return Ok(());
            }
            final_url
        };

        if !response.is_html() {
            let content_type = response.content_type.as_deref().unwrap_or("unknown");
            return self.record_failure(
                &content_url,
                item.depth,
                &format!("Unsupported content type {}", content_type),
                true,
            );
        }

        let url = Url::parse(&content_url)?;
        let page = self.processor.process(&url, &response.body);
        let desired = plan_output_path(&self.scope, &url, page.title.as_deref());
        let path = self.store()?.reserve_output_path(&content_url, &desired)?;

        if let Err(e) = self.sink.write(&path, &page.to_document(&content_url)) {
            return self.record_failure(
                &content_url,
                item.depth,
                &format!("Failed to write {}: {}", path, e),
                false,
            );
        }

        self.store()?
            .mark_completed(&content_url, page.title.as_deref())?;
        self.breaker.record_success();
        self.completed.fetch_add(1, Ordering::SeqCst);
        let fetched = self.session.record_fetched();
        debug!("Completed {} -> {}", content_url, path);

        if fetched % PROGRESS_INTERVAL == 0 {
            self.report_progress(fetched);
            self.persist_session(None)?;
        }

        self.enqueue_links(&content_url, item.depth + 1, &page.links)
    }

    fn handle_redirect(&self, item: &WorkItem, location: Option<&str>) -> Result<()> {
        let base = Url::parse(&item.url)?;
        let Some(target) = location.and_then(|l| resolve_href(&base, l)) else {
            return self.record_failure(
                &item.url,
                item.depth,
                "Redirect without a usable Location header",
                true,
            );
        };

        let target_url = target.to_string();
        if target_url == item.url {
            return self.record_failure(&item.url, item.depth, "Redirects to itself", true);
        }

        self.record_edge(&RedirectEdge::new(item.url.as_str(), target_url.as_str()))?;

        let enqueue = {
            let mut storage = self.store()?;
            storage.mark_redirected(&item.url)?;

            if self.scope.contains(&target) {
                storage.insert_discovered(&target_url, item.depth, Some(&item.url))?;
                storage.lookup(&target_url)?.map_or(false, |record| {
                    record.status != PageStatus::InProgress
                        && !record.is_settled(self.settings.max_attempts)
                })
            } else {
                info!("{} redirects out of scope to {}", item.url, target_url);
                false
            }
        };

        self.session.record_redirected();
        self.breaker.record_success();
        debug!("Redirect {} -> {}", item.url, target_url);

        if enqueue {
            self.queue.push(WorkItem::new(target_url, item.depth));
        }
        Ok(())
    }

    fn record_edge(&self, edge: &RedirectEdge) -> Result<()> {
        let canonical = |url: &str| {
            normalize_url(url)
                .map(|u| u.to_string())
                .unwrap_or_else(|_| url.to_string())
        };
        let source = canonical(&edge.source);
        let target = canonical(&edge.target);
        if source == target {
            return Ok(());
        }

        let previous = self.store()?.record_redirect(&source, &target)?;
        if let Some(previous) = previous {
            warn!(
                "Redirect from {} changed: {} replaced by {}",
                source, previous, target
            );
        }
        Ok(())
    }

    fn record_failure(&self, url: &str, depth: u32, error: &str, permanent: bool) -> Result<()> {
        let attempts = self.store()?.mark_failed(url, error, permanent)?;

        if self.breaker.record_failure() {
            error!(
                "Circuit breaker tripped after {} consecutive failures, halting crawl",
                self.breaker.threshold()
            );
            self.halt(SessionOutcome::HaltedByCircuitBreaker);
        }

        if !permanent && attempts < self.settings.max_attempts {
            let delay = backoff_delay(
                attempts,
                self.settings.backoff_initial,
                self.settings.backoff_max,
            );
            warn!(
                "Fetch of {} failed (attempt {}/{}): {}, retrying in {:?}",
                url, attempts, self.settings.max_attempts, error, delay
            );
            self.queue.push(WorkItem::delayed(url, depth, delay));
        } else {
            self.session.record_failed();
            warn!("Giving up on {} after {} attempts: {}", url, attempts, error);
        }
        Ok(())
    }

    fn enqueue_links(&self, parent: &str, depth: u32, links: &[Url]) -> Result<()> {
        if let Some(max_depth) = self.limits.max_depth {
            if depth > max_depth {
                return Ok(());
            }
        }

        let mut fresh = Vec::new();
        {
            let mut storage = self.store()?;
            for link in links.iter().filter(|link| self.scope.contains(link)) {
                if storage.insert_discovered(link.as_str(), depth, Some(parent))? {
                    fresh.push(link.to_string());
                }
            }
        }

        for url in fresh {
            self.queue.push(WorkItem::new(url, depth));
        }
        Ok(())
    }

    fn report_progress(&self, fetched: u64) {
        let this_run = self.completed.load(Ordering::SeqCst);
        let rate = this_run as f64 / self.started.elapsed().as_secs_f64().max(0.001);
        info!(
            "Progress: {} pages written ({} this run), {} queued, {} in flight, {:.2} pages/sec",
            fetched,
            this_run,
            self.queue.len(),
            self.queue.in_flight(),
            rate
        );
    }

    fn persist_session(&self, outcome: Option<&str>) -> Result<()> {
        let entries = self.session.snapshot(outcome).to_entries();
        self.store()?.save_session(&entries)?;
        Ok(())
    }
}
