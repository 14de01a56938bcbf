//! End-to-end mirror run
//!
//! A run has three phases:
//! 1. Prepare the state store (fresh start, resume checks, retry-failed reset)
//! 2. Crawl, unless only resolution was requested
//! 3. Generate folder notes, the table of contents and (optionally)
//!    redirect stubs, then rewrite links
//!
//! A run that was interrupted or halted by the circuit breaker skips phase 3:
//! the next run resumes the crawl and resolves afterwards. Every run ends by
//! writing the Markdown report.

use crate::config::Config;
use crate::crawler::{
    ContentProcessor, CrawlLimits, HtmlContentProcessor, HttpFetcher, Orchestrator, PageFetcher,
    RateLimiter, SessionOutcome,
};
use crate::output::{
    load_statistics, plan_folder_notes, plan_output_path, render_table_of_contents,
    slug_to_title, DocumentSink, FsDocumentSink, RedirectStub, RunReport, TOC_PATH,
};
use crate::redirect::RedirectTracker;
use crate::resolve::{
    probe_targets, HttpLinkProbe, LinkProbe, LinkResolver, PathIndex, ResolutionReport,
};
use crate::state::{PageStatus, Session, SessionSnapshot};
use crate::storage::{open_storage, CompletedPage, RedirectEdge, SqliteStorage, Storage};
use crate::url::{normalize_url, url_variants, CrawlScope};
use crate::{MirrorError, Result};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

/// How a run treats existing state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Discard all previous state before crawling
    pub fresh: bool,
    /// Give pages that ran out of transient retries a new attempt budget
    pub retry_failed: bool,
    /// Skip the crawl; rebuild folder notes and resolve links only
    pub resolve_only: bool,
}

/// What a run did
#[derive(Debug, Clone)]
pub struct MirrorSummary {
    /// `None` for resolve-only runs
    pub outcome: Option<SessionOutcome>,
    /// `None` when resolution was skipped
    pub resolution: Option<ResolutionReport>,
}

impl MirrorSummary {
    pub fn exit_code(&self) -> i32 {
        self.outcome.map_or(0, |outcome| outcome.exit_code())
    }
}

/// A configured mirror of one documentation subtree
pub struct Mirror {
    config: Config,
    config_hash: String,
    fetcher: Option<Arc<dyn PageFetcher>>,
    probe: Option<Arc<dyn LinkProbe>>,
    processor: Arc<dyn ContentProcessor>,
}

impl Mirror {
    pub fn new(config: Config, config_hash: impl Into<String>) -> Self {
        Self {
            config,
            config_hash: config_hash.into(),
            fetcher: None,
            probe: None,
            processor: Arc::new(HtmlContentProcessor::new()),
        }
    }

    /// Replaces the HTTP fetcher
    pub fn with_fetcher(mut self, fetcher: Arc<dyn PageFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Probes unresolved targets with `probe`, regardless of the config flag
    pub fn with_probe(mut self, probe: Arc<dyn LinkProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Runs the mirror
    ///
    /// Cancelling `shutdown` stops the crawl gracefully; the outcome is then
    /// `Interrupted` and links are not resolved.
    pub async fn run(
        &self,
        options: RunOptions,
        shutdown: CancellationToken,
    ) -> Result<MirrorSummary> {
        let scope = CrawlScope::from_config(&self.config.site)?;
        let mut storage = open_storage(Path::new(&self.config.output.database_path))?;
        let session = Arc::new(self.prepare_session(&mut storage, &scope, options)?);
        let storage = Arc::new(Mutex::new(storage));
        let sink = Arc::new(FsDocumentSink::new(&self.config.output.directory));

        let outcome = if options.resolve_only {
            info!("Resolve-only run, skipping the crawl");
            None
        } else {
            let fetcher: Arc<dyn PageFetcher> = match &self.fetcher {
                Some(fetcher) => fetcher.clone(),
                None => Arc::new(HttpFetcher::from_config(
                    &self.config.user_agent,
                    &self.config.crawler,
                )?),
            };
            let orchestrator = Orchestrator::new(
                storage.clone(),
                session.clone(),
                scope.clone(),
                fetcher,
                self.processor.clone(),
                sink.clone(),
                &self.config.crawler,
            );
            let outcome = orchestrator
                .run(
                    &self.config.site.effective_seeds(),
                    CrawlLimits::from_config(&self.config.crawler),
                    shutdown.clone(),
                )
                .await?;
            Some(outcome)
        };

        let resolution = match outcome {
            Some(outcome) if !outcome.allows_resolution() => {
                warn!("Crawl stopped ({}), link resolution deferred to the next run", outcome);
                None
            }
            _ => Some(
                self.resolve_links(&storage, &scope, sink.as_ref(), &shutdown)
                    .await?,
            ),
        };

        self.write_report(&storage, &session, resolution.as_ref())?;

        Ok(MirrorSummary {
            outcome,
            resolution,
        })
    }

    fn prepare_session(
        &self,
        storage: &mut SqliteStorage,
        scope: &CrawlScope,
        options: RunOptions,
    ) -> Result<Session> {
        let root = scope.root().to_string();

        if options.fresh {
            info!("Starting fresh, discarding previous crawl state");
            storage.clear_all()?;
        }

        let session = match SessionSnapshot::from_entries(&storage.load_session()?) {
            Some(previous) => {
                if previous.crawl_root != root {
                    return Err(MirrorError::RootMismatch {
                        stored: previous.crawl_root,
                        configured: root,
                    });
                }
                if previous.config_hash != self.config_hash {
                    warn!("Configuration changed since the previous run");
                }
                info!(
                    "Resuming session started {} ({} pages fetched so far)",
                    previous.started_at, previous.fetched
                );
                Session::resume(&previous, self.config_hash.as_str())
            }
            None => Session::new(root, self.config_hash.as_str()),
        };

        let released = storage.reset_in_progress()?;
        if released > 0 {
            info!("Reset {} pages left in progress by a previous run", released);
        }

        if options.retry_failed {
            let reset = storage.reset_exhausted_failures(self.config.crawler.max_retries)?;
            info!("Reset {} failed pages for another attempt", reset);
        }

        // Resolve-only runs keep the outcome of the last crawl
        if !options.resolve_only {
            storage.save_session(&session.snapshot(None).to_entries())?;
        }
        Ok(session)
    }

    async fn resolve_links(
        &self,
        storage: &Mutex<SqliteStorage>,
        scope: &CrawlScope,
        sink: &dyn DocumentSink,
        shutdown: &CancellationToken,
    ) -> Result<ResolutionReport> {
        let (completed, edges) = {
            let store = storage.lock()?;
            (store.all_completed()?, store.load_redirects()?)
        };
        let mut tracker = RedirectTracker::from_edges(edges);
        info!(
            "Resolving links across {} documents with {} redirect edges",
            completed.len(),
            tracker.len()
        );

        let index = write_navigation(scope, &completed, &tracker, sink)?;

        if let Some(probe) = self.link_probe()? {
            let resolver = LinkResolver::new(scope.clone(), index.clone(), tracker.clone());
            let targets = unresolved_targets(&resolver, scope, &completed, sink);
            if !targets.is_empty() {
                let limiter = RateLimiter::new(self.config.crawler.request_delay());
                let found = probe_targets(
                    probe.as_ref(),
                    &limiter,
                    shutdown,
                    self.config.crawler.acquire_timeout(),
                    &targets,
                )
                .await;
                record_probed(storage, &mut tracker, &found)?;
            }
        }

        if self.config.output.create_redirect_stubs {
            let written = write_redirect_stubs(storage, scope, &index, &tracker, sink)?;
            info!("Wrote {} redirect stubs", written);
        }

        let paths: Vec<String> = completed.iter().map(|p| p.output_path.clone()).collect();
        let resolver = LinkResolver::new(scope.clone(), index, tracker);
        Ok(resolver.resolve_documents(sink, &paths)?)
    }

    fn link_probe(&self) -> Result<Option<Arc<dyn LinkProbe>>> {
        if let Some(probe) = &self.probe {
            return Ok(Some(probe.clone()));
        }
        if !self.config.resolver.probe_unresolved {
            return Ok(None);
        }
        let probe = HttpLinkProbe::from_config(&self.config.user_agent, &self.config.resolver)?;
        Ok(Some(Arc::new(probe)))
    }

    fn write_report(
        &self,
        storage: &Mutex<SqliteStorage>,
        session: &Session,
        resolution: Option<&ResolutionReport>,
    ) -> Result<()> {
        let (stats, stored) = {
            let store = storage.lock()?;
            (load_statistics(&*store)?, store.load_session()?)
        };
        let snapshot =
            SessionSnapshot::from_entries(&stored).unwrap_or_else(|| session.snapshot(None));

        let path = Path::new(&self.config.output.report_path);
        RunReport {
            session: &snapshot,
            stats: &stats,
            resolution,
        }
        .write_to(path)?;
        info!("Report written to {}", path.display());
        Ok(())
    }
}

/// Writes folder notes and the table of contents, returning the index the
/// resolver works from
fn write_navigation(
    scope: &CrawlScope,
    completed: &[CompletedPage],
    tracker: &RedirectTracker,
    sink: &dyn DocumentSink,
) -> Result<PathIndex> {
    let mut index = PathIndex::from_completed(completed);

    let notes = plan_folder_notes(scope, completed, |url| tracker.is_redirect_source(url));
    for note in &notes {
        sink.write(&note.path, &note.render())?;
        index.insert_folder_note(&note.url, &note.path);
    }

    let root = scope.root().to_string();
    let title = completed
        .iter()
        .find(|page| page.url == root)
        .and_then(|page| page.title.clone())
        .or_else(|| {
            scope
                .root()
                .path_segments()
                .and_then(|mut segments| segments.next_back().map(slug_to_title))
                .filter(|title| !title.is_empty())
        })
        .unwrap_or_else(|| "Documentation".to_string());
    sink.write(TOC_PATH, &render_table_of_contents(&title, completed))?;

    // The root URL lands on the table of contents when it has no page
    if index.lookup(&root).is_none() {
        index.insert_folder_note(&root, TOC_PATH);
    }

    info!("Wrote {} folder notes and {}", notes.len(), TOC_PATH);
    Ok(index)
}

/// Writes a stub for every redirected page whose chain ends on a document
///
/// Stub paths are reserved in the state store like page paths, so they never
/// collide with a page. Stubs stay out of `index`: links keep resolving to
/// the final page.
fn write_redirect_stubs(
    storage: &Mutex<SqliteStorage>,
    scope: &CrawlScope,
    index: &PathIndex,
    tracker: &RedirectTracker,
    sink: &dyn DocumentSink,
) -> Result<usize> {
    let stubs = {
        let mut store = storage.lock()?;
        let mut stubs = Vec::new();

        for edge in store.load_redirects()? {
            let redirected = store
                .lookup(&edge.source)?
                .map_or(false, |record| record.status == PageStatus::Redirected);
            if !redirected {
                continue;
            }
            let Ok(url) = Url::parse(&edge.source) else {
                continue;
            };
            if !scope.contains(&url) {
                continue;
            }

            let target_url = tracker.resolve_chain(&edge.source);
            let target = url_variants(&target_url).iter().find_map(|variant| {
                index
                    .lookup(variant)
                    .map(|entry| (entry.path.clone(), entry.title.clone()))
                    .or_else(|| index.folder_note(variant).map(|path| (path.to_string(), None)))
            });
            let Some((target_path, target_title)) = target else {
                debug!("No document for {} (redirected from {})", target_url, edge.source);
                continue;
            };

            let desired = plan_output_path(scope, &url, None);
            let path = store.reserve_output_path(&edge.source, &desired)?;
            stubs.push(RedirectStub {
                url: edge.source,
                target_url,
                path,
                target_path,
                target_title,
            });
        }
        stubs
    };

    for stub in &stubs {
        sink.write(&stub.path, &stub.render())?;
    }
    Ok(stubs.len())
}

/// Internal URLs the resolver cannot place yet
fn unresolved_targets(
    resolver: &LinkResolver,
    scope: &CrawlScope,
    completed: &[CompletedPage],
    sink: &dyn DocumentSink,
) -> Vec<String> {
    let mut preview = ResolutionReport::default();
    for page in completed {
        if let Ok(text) = sink.read(&page.output_path) {
            resolver.resolve_with_report(&text, &page.output_path, &mut preview);
        }
    }

    preview
        .unresolved_urls()
        .into_iter()
        .filter(|target| Url::parse(target).map_or(false, |url| scope.is_internal(&url)))
        .collect()
}

fn record_probed(
    storage: &Mutex<SqliteStorage>,
    tracker: &mut RedirectTracker,
    edges: &[RedirectEdge],
) -> Result<()> {
    let mut store = storage.lock()?;
    for edge in edges {
        let (Ok(source), Ok(target)) = (normalize_url(&edge.source), normalize_url(&edge.target))
        else {
            continue;
        };
        if source == target {
            continue;
        }
        store.record_redirect(source.as_str(), target.as_str())?;
        tracker.record(source.as_str(), target.as_str());
    }
    Ok(())
}
