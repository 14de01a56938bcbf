//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building HTTP clients with the configured user agent
//! - Following redirects manually so every hop is reported to the caller
//! - Error classification into retryable and permanent failures

use crate::config::{CrawlerConfig, UserAgentConfig};
use crate::storage::RedirectEdge;
use async_trait::async_trait;
use reqwest::{header, redirect::Policy, Client, Method, StatusCode};
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Maximum redirect hops followed for one fetch
pub const MAX_REDIRECT_HOPS: usize = 10;

/// Network-level fetch failures
///
/// HTTP error statuses are not errors at this layer; they come back as a
/// `FetchResponse` and the orchestrator classifies them.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Request to {url} timed out")]
    Timeout { url: String },

    #[error("Connection to {url} failed: {message}")]
    Connection { url: String, message: String },

    #[error("Failed to read body of {url}: {message}")]
    Body { url: String, message: String },

    #[error("Redirect loop at {url}")]
    RedirectLoop { url: String },

    #[error("More than {max} redirects starting at {url}")]
    TooManyRedirects { url: String, max: usize },

    #[error("Invalid URL {url}: {message}")]
    InvalidUrl { url: String, message: String },

    #[error("Request to {url} failed: {message}")]
    Request { url: String, message: String },
}

impl FetchError {
    /// Transient failures are worth another attempt after backoff
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FetchError::Timeout { .. } | FetchError::Connection { .. } | FetchError::Body { .. }
        )
    }

    fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
            }
        } else if err.is_connect() {
            FetchError::Connection {
                url: url.to_string(),
                message: err.to_string(),
            }
        } else if err.is_body() || err.is_decode() {
            FetchError::Body {
                url: url.to_string(),
                message: err.to_string(),
            }
        } else {
            FetchError::Request {
                url: url.to_string(),
                message: err.to_string(),
            }
        }
    }
}

/// What a fetch produced
#[derive(Debug, Clone, Default)]
pub struct FetchResponse {
    /// HTTP status of the last response
    pub status: u16,

    /// URL that produced the last response
    pub final_url: String,

    /// Hops followed on the way to `final_url`, in order
    pub redirects: Vec<RedirectEdge>,

    /// `Location` of an unfollowed 3xx response
    pub location: Option<String>,

    pub content_type: Option<String>,

    pub body: String,
}

impl FetchResponse {
    /// A 200 HTML response served directly from `url`
    pub fn html(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            status: 200,
            final_url: url.into(),
            content_type: Some("text/html; charset=utf-8".to_string()),
            body: body.into(),
            ..Self::default()
        }
    }

    /// An unfollowed redirect from `url` to `location`
    pub fn redirect(url: impl Into<String>, status: u16, location: impl Into<String>) -> Self {
        Self {
            status,
            final_url: url.into(),
            location: Some(location.into()),
            ..Self::default()
        }
    }

    /// A bodiless response with the given status
    pub fn status(url: impl Into<String>, status: u16) -> Self {
        Self {
            status,
            final_url: url.into(),
            ..Self::default()
        }
    }

    /// True unless the server declared a non-HTML content type
    pub fn is_html(&self) -> bool {
        self.content_type.as_deref().map_or(true, |ct| {
            let ct = ct.to_ascii_lowercase();
            ct.contains("text/html") || ct.contains("application/xhtml")
        })
    }
}

/// Retrieves pages for the orchestrator
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetches `url`
    ///
    /// Implementations may follow redirects themselves, in which case every
    /// hop is reported in `FetchResponse::redirects`, or return the 3xx with
    /// its `location` and let the orchestrator schedule the target.
    async fn fetch(&self, url: &str) -> Result<FetchResponse, FetchError>;
}

/// Builds an HTTP client with proper configuration
///
/// Redirects are disabled at the client level; `HttpFetcher` follows them
/// by hand so that every hop can be recorded.
///
/// # Example
///
/// ```no_run
/// use docmirror::config::UserAgentConfig;
/// use docmirror::crawler::build_http_client;
/// use std::time::Duration;
///
/// let config = UserAgentConfig {
///     crawler_name: "DocMirror".to_string(),
///     crawler_version: "0.1".to_string(),
///     contact_url: "https://example.com/about".to_string(),
/// };
///
/// let client = build_http_client(&config, Duration::from_secs(30)).unwrap();
/// ```
pub fn build_http_client(
    config: &UserAgentConfig,
    timeout: Duration,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.header_value())
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::none())
        .gzip(true)
        .brotli(true)
        .build()
}

/// reqwest-backed fetcher that follows up to `MAX_REDIRECT_HOPS` redirects
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Builds a fetcher from the user-agent and crawler sections of the config
    pub fn from_config(
        user_agent: &UserAgentConfig,
        crawler: &CrawlerConfig,
    ) -> Result<Self, reqwest::Error> {
        let client =
            build_http_client(user_agent, Duration::from_secs(crawler.request_timeout_secs))?;
        Ok(Self::new(client))
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchResponse, FetchError> {
        let hops = follow_redirects(&self.client, Method::GET, url).await?;
        let response = hops.response;

        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let mut fetched = FetchResponse {
            status: status.as_u16(),
            final_url: hops.final_url.to_string(),
            redirects: hops.edges,
            location: None,
            content_type,
            body: String::new(),
        };

        // Non-HTML bodies are never converted, so skip downloading them
        if status.is_success() && fetched.is_html() {
            fetched.body = response
                .text()
                .await
                .map_err(|e| FetchError::from_reqwest(&fetched.final_url, e))?;
        }

        Ok(fetched)
    }
}

/// Outcome of a redirect walk
pub(crate) struct RedirectWalk {
    pub response: reqwest::Response,
    pub final_url: Url,
    pub edges: Vec<RedirectEdge>,
}

/// Sends `method` to `url`, following Location headers by hand
///
/// A 3xx without a usable Location ends the walk and is returned as is.
pub(crate) async fn follow_redirects(
    client: &Client,
    method: Method,
    url: &str,
) -> Result<RedirectWalk, FetchError> {
    let mut current = Url::parse(url).map_err(|e| FetchError::InvalidUrl {
        url: url.to_string(),
        message: e.to_string(),
    })?;
    let mut visited = HashSet::new();
    visited.insert(current.to_string());
    let mut edges = Vec::new();

    loop {
        let response = client
            .request(method.clone(), current.clone())
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(current.as_str(), e))?;

        if !is_followed_redirect(response.status()) {
            return Ok(RedirectWalk {
                response,
                final_url: current,
                edges,
            });
        }

        let next = response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|location| current.join(location).ok());

        let Some(next) = next else {
            return Ok(RedirectWalk {
                response,
                final_url: current,
                edges,
            });
        };

        if edges.len() >= MAX_REDIRECT_HOPS {
            return Err(FetchError::TooManyRedirects {
                url: url.to_string(),
                max: MAX_REDIRECT_HOPS,
            });
        }

        tracing::debug!("Redirect {} -> {}", current, next);
        edges.push(RedirectEdge::new(current.as_str(), next.as_str()));

        if !visited.insert(next.to_string()) {
            return Err(FetchError::RedirectLoop {
                url: next.to_string(),
            });
        }
        current = next;
    }
}

fn is_followed_redirect(status: StatusCode) -> bool {
    matches!(status.as_u16(), 301 | 302 | 303 | 307 | 308)
}
