use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for docmirror
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub site: SiteConfig,
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub resolver: ResolverConfig,
}

/// The documentation subtree being mirrored
#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Crawl root; its host and path prefix bound the crawl
    #[serde(rename = "root-url")]
    pub root_url: String,

    /// Seed URLs, defaults to the root when empty
    #[serde(default)]
    pub seeds: Vec<String>,

    /// Regexes matched against URL paths that must never be fetched
    #[serde(default = "default_excludes")]
    pub exclude: Vec<String>,
}

impl SiteConfig {
    /// Returns the configured seeds, or the crawl root if none were given
    pub fn effective_seeds(&self) -> Vec<String> {
        if self.seeds.is_empty() {
            vec![self.root_url.clone()]
        } else {
            self.seeds.clone()
        }
    }
}

fn default_excludes() -> Vec<String> {
    [
        "/api/",
        "/rest/",
        r"\.pdf$",
        r"\.zip$",
        "/download/",
        "/attachments/",
        "/login",
        "/signup",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct CrawlerConfig {
    /// Number of concurrent fetch workers
    pub workers: u32,

    /// Token refill interval of the rate limiter (milliseconds)
    pub request_delay_ms: u64,

    /// Upper bound on waiting for a rate-limiter token (seconds)
    pub acquire_timeout_secs: u64,

    /// Maximum distance from a seed; unlimited when absent
    pub max_depth: Option<u32>,

    /// Maximum pages to complete in one run, 0 means unlimited
    pub max_pages: u64,

    /// Maximum wall-clock runtime in minutes, 0 means unlimited
    pub max_runtime_minutes: u64,

    /// Fetch attempts per URL before a transient failure becomes permanent
    pub max_retries: u32,

    pub backoff_initial_ms: u64,
    pub backoff_max_ms: u64,

    /// Consecutive failures that halt the crawl
    pub circuit_breaker_threshold: u32,

    pub request_timeout_secs: u64,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            request_delay_ms: 1500,
            acquire_timeout_secs: 120,
            max_depth: None,
            max_pages: 0,
            max_runtime_minutes: 0,
            max_retries: 3,
            backoff_initial_ms: 2000,
            backoff_max_ms: 60_000,
            circuit_breaker_threshold: 10,
            request_timeout_secs: 30,
        }
    }
}

impl CrawlerConfig {
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    /// Page limit, `None` when unlimited
    pub fn page_limit(&self) -> Option<u64> {
        (self.max_pages > 0).then_some(self.max_pages)
    }

    /// Runtime limit, `None` when unlimited
    pub fn runtime_limit(&self) -> Option<Duration> {
        (self.max_runtime_minutes > 0).then(|| Duration::from_secs(self.max_runtime_minutes * 60))
    }
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
}

impl UserAgentConfig {
    /// Formats the header value: `Name/Version (+ContactURL)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{})",
            self.crawler_name, self.crawler_version, self.contact_url
        )
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Root of the generated Markdown tree
    pub directory: String,

    /// Path to the SQLite state store
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Path of the Markdown run report
    #[serde(rename = "report-path")]
    pub report_path: String,

    /// Write a stub document for every redirected URL, pointing at the
    /// page it redirects to
    #[serde(rename = "create-redirect-stubs", default)]
    pub create_redirect_stubs: bool,
}

/// Link resolution configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ResolverConfig {
    /// Probe never-crawled internal targets with HEAD before resolving
    pub probe_unresolved: bool,

    pub probe_timeout_secs: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            probe_unresolved: false,
            probe_timeout_secs: 10,
        }
    }
}
