//! Crawler module for fetching and converting documentation pages
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching with manual redirect handling
//! - HTML to Markdown conversion and link extraction
//! - Rate limiting, retry backoff and the circuit breaker
//! - The worker pool that drives a crawl run

mod circuit_breaker;
mod fetcher;
mod orchestrator;
mod parser;
mod queue;
mod rate_limiter;
mod retry;

pub use circuit_breaker::CircuitBreaker;
pub(crate) use fetcher::follow_redirects;
pub use fetcher::{
    build_http_client, FetchError, FetchResponse, HttpFetcher, PageFetcher, MAX_REDIRECT_HOPS,
};
pub use orchestrator::{CrawlLimits, Orchestrator, SessionOutcome, PROGRESS_INTERVAL};
pub use parser::{ContentProcessor, HtmlContentProcessor, ProcessedPage};
pub use queue::{Dequeue, WorkItem, WorkQueue};
pub use rate_limiter::{AcquireError, RateLimiter};
pub use retry::{backoff_delay, base_backoff};
