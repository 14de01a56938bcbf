//! Integration tests for the crawl and resolution pipeline
//!
//! These tests drive a full mirror run against a scripted in-process fetcher
//! and check the state store, the written Markdown tree and the exit codes.

use async_trait::async_trait;
use docmirror::config::{
    Config, CrawlerConfig, OutputConfig, ResolverConfig, SiteConfig, UserAgentConfig,
};
use docmirror::crawler::{FetchError, FetchResponse, PageFetcher};
use docmirror::storage::{open_storage, Storage};
use docmirror::{Mirror, PageStatus, RunOptions, SessionOutcome};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

const ROOT: &str = "https://docs.example.com/docs";

/// Serves canned pages; unknown URLs get a 404
#[derive(Default)]
struct ScriptedFetcher {
    responses: HashMap<String, FetchResponse>,
    calls: Mutex<Vec<(String, Instant)>>,
}

impl ScriptedFetcher {
    fn page(mut self, path: &str, body: &str) -> Self {
        let url = format!("{}{}", ROOT, path);
        self.responses
            .insert(url.clone(), FetchResponse::html(url, body));
        self
    }

    fn redirect(mut self, path: &str, location: &str) -> Self {
        let url = format!("{}{}", ROOT, path);
        self.responses
            .insert(url.clone(), FetchResponse::redirect(url, 301, location));
        self
    }

    /// `path` answers with the content of `final_path`, hops not reported
    fn followed(mut self, path: &str, final_path: &str, body: &str) -> Self {
        self.responses.insert(
            format!("{}{}", ROOT, path),
            FetchResponse::html(format!("{}{}", ROOT, final_path), body),
        );
        self
    }

    fn called(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(url, _)| url.clone())
            .collect()
    }

    fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().iter().map(|(_, at)| *at).collect()
    }
}

#[async_trait]
impl PageFetcher for ScriptedFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchResponse, FetchError> {
        self.calls
            .lock()
            .unwrap()
            .push((url.to_string(), Instant::now()));
        Ok(self
            .responses
            .get(url)
            .cloned()
            .unwrap_or_else(|| FetchResponse::status(url, 404)))
    }
}

fn test_config(dir: &Path) -> Config {
    let out = dir.join("out");
    Config {
        site: SiteConfig {
            root_url: ROOT.to_string(),
            seeds: vec![],
            exclude: vec!["/api/".to_string()],
        },
        crawler: CrawlerConfig {
            workers: 2,
            request_delay_ms: 100,
            backoff_initial_ms: 100,
            backoff_max_ms: 1000,
            ..CrawlerConfig::default()
        },
        user_agent: UserAgentConfig {
            crawler_name: "TestMirror".to_string(),
            crawler_version: "1.0".to_string(),
            contact_url: "https://example.com/contact".to_string(),
        },
        output: OutputConfig {
            directory: out.to_string_lossy().into_owned(),
            database_path: dir.join("mirror.db").to_string_lossy().into_owned(),
            report_path: out.join("_report.md").to_string_lossy().into_owned(),
        create_redirect_stubs: false,
        },
        resolver: ResolverConfig::default(),
    }
}

fn site() -> ScriptedFetcher {
    ScriptedFetcher::default()
        .page("", r#"<h1>Docs</h1><p><a href="/docs/a">Start here</a></p>"#)
        .page(
            "/a",
            r#"<main><h1>Alpha</h1>
            <p>Read <a href="/docs/b">Beta</a> and the <a href="/docs/old">Old</a> page.</p>
            <p><a href="https://elsewhere.org/x">External</a> <a href="/docs/api/v1">API</a></p>
            </main>"#,
        )
        .page("/b", "<h1>Beta</h1><p>Second page.</p>")
        .redirect("/old", "/docs/new/")
        .page("/new", "<h1>New Page</h1><p>Moved here.</p>")
}

async fn run_mirror(
    config: Config,
    fetcher: Arc<ScriptedFetcher>,
    options: RunOptions,
) -> docmirror::MirrorSummary {
    Mirror::new(config, "test-hash")
        .with_fetcher(fetcher)
        .run(options, CancellationToken::new())
        .await
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_full_mirror_resolves_links_through_redirects() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let out = dir.path().join("out");
    let fetcher = Arc::new(site());

    let summary = run_mirror(config.clone(), fetcher.clone(), RunOptions::default()).await;

    assert_eq!(summary.outcome, Some(SessionOutcome::Completed));
    assert_eq!(summary.exit_code(), 0);

    let alpha = fs::read_to_string(out.join("Alpha.md")).unwrap();
    assert!(alpha.starts_with("---\ntitle: \"Alpha\"\nurl: \"https://docs.example.com/docs/a\""));
    assert!(alpha.contains("[[Beta]]"), "{}", alpha);
    assert!(alpha.contains("[[New Page|Old]]"), "{}", alpha);
    // External links are never rewritten
    assert!(alpha.contains("[External](https://elsewhere.org/x)"), "{}", alpha);

    let toc = fs::read_to_string(out.join("index.md")).unwrap();
    assert!(toc.contains("Total: 4 pages"), "{}", toc);

    let resolution = summary.resolution.unwrap();
    assert!(resolution.via_redirect >= 1);

    // Excluded and external URLs are never fetched
    let called = fetcher.called();
    assert!(!called.iter().any(|u| u.contains("/api/") || u.contains("elsewhere")));
    assert_eq!(called.len(), 5);

    let storage = open_storage(Path::new(&config.output.database_path)).unwrap();
    assert_eq!(
        storage
            .lookup(&format!("{}/old", ROOT))
            .unwrap()
            .unwrap()
            .status,
        PageStatus::Redirected
    );
    assert_eq!(storage.count_redirects().unwrap(), 1);

    let report = fs::read_to_string(&config.output.report_path).unwrap();
    assert!(report.contains("- **Outcome**: completed"));
}

#[tokio::test(start_paused = true)]
async fn test_silently_followed_redirect_still_resolves_old_links() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let out = dir.path().join("out");
    let fetcher = Arc::new(
        ScriptedFetcher::default()
            .page("", r#"<h1>Docs</h1><p><a href="/docs/a">Start here</a></p>"#)
            .page(
                "/a",
                r#"<h1>Alpha</h1><p><a href="/docs/old">Old</a> <a href="/docs/new">New</a></p>"#,
            )
            .followed("/old", "/new", "<h1>New Page</h1>"),
    );

    let summary = run_mirror(config.clone(), fetcher, RunOptions::default()).await;
    assert_eq!(summary.outcome, Some(SessionOutcome::Completed));

    let alpha = fs::read_to_string(out.join("Alpha.md")).unwrap();
    assert!(alpha.contains("[[New Page|Old]]"), "{}", alpha);
    assert!(alpha.contains("[[New Page|New]]"), "{}", alpha);
    assert!(!alpha.contains("/docs/old)"), "{}", alpha);

    let storage = open_storage(Path::new(&config.output.database_path)).unwrap();
    let edges = storage.load_redirects().unwrap();
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].source, format!("{}/old", ROOT));
    assert_eq!(edges[0].target, format!("{}/new", ROOT));
}

#[tokio::test(start_paused = true)]
async fn test_redirect_stubs_point_at_the_final_page() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path());
    config.output.create_redirect_stubs = true;
    let out = dir.path().join("out");

    run_mirror(config.clone(), Arc::new(site()), RunOptions::default()).await;

    let stub = fs::read_to_string(out.join("Old.md")).unwrap();
    assert!(stub.contains("redirect-to: \"https://docs.example.com/docs/new\""), "{}", stub);
    assert!(stub.contains("[[New Page]]"), "{}", stub);

    // Links keep pointing at the page itself, and the TOC lists pages only
    let alpha = fs::read_to_string(out.join("Alpha.md")).unwrap();
    assert!(alpha.contains("[[New Page|Old]]"), "{}", alpha);
    let toc = fs::read_to_string(out.join("index.md")).unwrap();
    assert!(toc.contains("Total: 4 pages"), "{}", toc);

    let storage = open_storage(Path::new(&config.output.database_path)).unwrap();
    let old = storage.lookup(&format!("{}/old", ROOT)).unwrap().unwrap();
    assert_eq!(old.status, PageStatus::Redirected);
    assert_eq!(old.output_path.as_deref(), Some("Old.md"));
}

#[tokio::test(start_paused = true)]
async fn test_second_run_fetches_nothing_and_keeps_links_stable() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let out = dir.path().join("out");
    let fetcher = Arc::new(site());

    run_mirror(config.clone(), fetcher.clone(), RunOptions::default()).await;
    let first = fs::read_to_string(out.join("Alpha.md")).unwrap();
    let calls_after_first = fetcher.called().len();

    let summary = run_mirror(config, fetcher.clone(), RunOptions::default()).await;

    assert_eq!(summary.outcome, Some(SessionOutcome::Completed));
    assert_eq!(fetcher.called().len(), calls_after_first);
    assert_eq!(fs::read_to_string(out.join("Alpha.md")).unwrap(), first);
    assert_eq!(summary.resolution.unwrap().documents_changed, 0);
}

#[tokio::test(start_paused = true)]
async fn test_resume_refetches_only_unfinished_pages() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let root_url = ROOT.to_string();
    let a_url = format!("{}/a", ROOT);

    // A previous run completed the root and died while fetching /a
    {
        let mut storage = open_storage(Path::new(&config.output.database_path)).unwrap();
        storage.insert_discovered(&root_url, 0, None).unwrap();
        assert!(storage.claim_for_fetch(&root_url, 3).unwrap());
        storage.reserve_output_path(&root_url, "Docs.md").unwrap();
        storage.mark_completed(&root_url, Some("Docs")).unwrap();
        storage.insert_discovered(&a_url, 1, Some(&root_url)).unwrap();
        assert!(storage.claim_for_fetch(&a_url, 3).unwrap());
    }
    let out = dir.path().join("out");
    fs::create_dir_all(&out).unwrap();
    fs::write(
        out.join("Docs.md"),
        format!("---\ntitle: \"Docs\"\n---\n\n# Docs\n\n[Start here]({})\n", a_url),
    )
    .unwrap();

    let fetcher = Arc::new(ScriptedFetcher::default().page("/a", "<h1>Alpha</h1>"));
    let summary = run_mirror(config.clone(), fetcher.clone(), RunOptions::default()).await;

    assert_eq!(summary.outcome, Some(SessionOutcome::Completed));
    assert_eq!(fetcher.called(), vec![a_url.clone()]);

    let storage = open_storage(Path::new(&config.output.database_path)).unwrap();
    assert_eq!(
        storage.lookup(&a_url).unwrap().unwrap().status,
        PageStatus::Completed
    );
    let docs = fs::read_to_string(out.join("Docs.md")).unwrap();
    assert!(docs.contains("[[Alpha|Start here]]"), "{}", docs);
}

#[tokio::test(start_paused = true)]
async fn test_circuit_breaker_halts_and_defers_resolution() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path());
    config.crawler.workers = 1;
    config.crawler.circuit_breaker_threshold = 3;

    let links: String = (0..8)
        .map(|i| format!(r#"<a href="/docs/missing-{}">m</a>"#, i))
        .collect();
    let fetcher = Arc::new(ScriptedFetcher::default().page("", &links));

    let summary = run_mirror(config.clone(), fetcher.clone(), RunOptions::default()).await;

    assert_eq!(summary.outcome, Some(SessionOutcome::HaltedByCircuitBreaker));
    assert_eq!(summary.exit_code(), 2);
    assert!(summary.resolution.is_none());
    assert_eq!(fetcher.called().len(), 4);

    let storage = open_storage(Path::new(&config.output.database_path)).unwrap();
    let counts = storage.count_by_status().unwrap();
    assert_eq!(counts.get(&PageStatus::Failed), Some(&3));
    assert_eq!(counts.get(&PageStatus::InProgress), None);

    let report = fs::read_to_string(&config.output.report_path).unwrap();
    assert!(report.contains("halted_by_circuit_breaker"));
}

#[tokio::test(start_paused = true)]
async fn test_interrupted_run_exits_130() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let fetcher = Arc::new(site());

    let shutdown = CancellationToken::new();
    shutdown.cancel();
    let summary = Mirror::new(config, "test-hash")
        .with_fetcher(fetcher.clone())
        .run(RunOptions::default(), shutdown)
        .await
        .unwrap();

    assert_eq!(summary.outcome, Some(SessionOutcome::Interrupted));
    assert_eq!(summary.exit_code(), 130);
    assert!(summary.resolution.is_none());
    assert!(fetcher.called().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_requests_are_spaced_by_the_rate_limiter() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path());
    config.crawler.workers = 4;
    config.crawler.request_delay_ms = 1500;

    let links: String = (0..5)
        .map(|i| format!(r#"<a href="/docs/p{}">p</a>"#, i))
        .collect();
    let mut fetcher = ScriptedFetcher::default().page("", &links);
    for i in 0..5 {
        fetcher = fetcher.page(&format!("/p{}", i), &format!("<h1>Page {}</h1>", i));
    }
    let fetcher = Arc::new(fetcher);

    run_mirror(config, fetcher.clone(), RunOptions::default()).await;

    let mut times = fetcher.call_times();
    times.sort();
    assert_eq!(times.len(), 6);
    for pair in times.windows(2) {
        assert!(pair[1] - pair[0] >= std::time::Duration::from_millis(1500));
    }
}

#[tokio::test(start_paused = true)]
async fn test_root_mismatch_requires_fresh() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    run_mirror(config.clone(), Arc::new(site()), RunOptions::default()).await;

    let mut other = config.clone();
    other.site.root_url = "https://docs.example.com/other".to_string();
    let result = Mirror::new(other.clone(), "test-hash")
        .with_fetcher(Arc::new(ScriptedFetcher::default()))
        .run(RunOptions::default(), CancellationToken::new())
        .await;
    assert!(matches!(
        result,
        Err(docmirror::MirrorError::RootMismatch { .. })
    ));

    // --fresh discards the old state and starts over
    let summary = Mirror::new(other, "test-hash")
        .with_fetcher(Arc::new(ScriptedFetcher::default()))
        .run(
            RunOptions {
                fresh: true,
                ..RunOptions::default()
            },
            CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(summary.outcome, Some(SessionOutcome::Completed));
}

#[tokio::test(start_paused = true)]
async fn test_resolve_only_does_not_fetch() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    run_mirror(config.clone(), Arc::new(site()), RunOptions::default()).await;

    let fetcher = Arc::new(ScriptedFetcher::default());
    let summary = run_mirror(
        config,
        fetcher.clone(),
        RunOptions {
            resolve_only: true,
            ..RunOptions::default()
        },
    )
    .await;

    assert!(summary.outcome.is_none());
    assert!(summary.resolution.is_some());
    assert!(fetcher.called().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_retry_failed_gives_transient_failures_another_attempt() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let flaky_url = format!("{}/flaky", ROOT);

    let mut failing = ScriptedFetcher::default().page("", r#"<a href="/docs/flaky">Flaky</a>"#);
    failing
        .responses
        .insert(flaky_url.clone(), FetchResponse::status(flaky_url.clone(), 503));
    run_mirror(config.clone(), Arc::new(failing), RunOptions::default()).await;

    {
        let storage = open_storage(Path::new(&config.output.database_path)).unwrap();
        let record = storage.lookup(&flaky_url).unwrap().unwrap();
        assert_eq!(record.status, PageStatus::Failed);
        assert_eq!(record.attempts, 3);
    }

    // Without --retry-failed the exhausted page stays failed
    let healed = Arc::new(site().page("/flaky", "<h1>Flaky</h1>"));
    run_mirror(config.clone(), healed.clone(), RunOptions::default()).await;
    assert!(!healed.called().contains(&flaky_url));

    run_mirror(
        config.clone(),
        healed.clone(),
        RunOptions {
            retry_failed: true,
            ..RunOptions::default()
        },
    )
    .await;
    assert!(healed.called().contains(&flaky_url));

    let storage = open_storage(Path::new(&config.output.database_path)).unwrap();
    assert_eq!(
        storage.lookup(&flaky_url).unwrap().unwrap().status,
        PageStatus::Completed
    );
}
