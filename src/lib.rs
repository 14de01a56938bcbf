//! Docmirror: a resumable documentation-site mirror
//!
//! This crate crawls one product subtree of a documentation site into a local,
//! cross-linked Markdown tree. The crawl is driven from a durable SQLite state
//! store so an interrupted run picks up where it stopped, and a second pass
//! rewrites every internal link into a redirect-resolved relative wikilink.

pub mod config;
pub mod crawler;
pub mod output;
pub mod pipeline;
pub mod redirect;
pub mod resolve;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for docmirror operations
#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] crawler::FetchError),

    #[error("Output error: {0}")]
    Output(#[from] output::OutputError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Invalid state transition for {url}: {from} -> {to}")]
    InvalidTransition {
        url: String,
        from: state::PageStatus,
        to: state::PageStatus,
    },

    #[error(
        "State store belongs to a crawl of {stored}, not {configured}; rerun with --fresh to discard it"
    )]
    RootMismatch { stored: String, configured: String },

    #[error("Shared state lock poisoned: {0}")]
    LockPoisoned(String),

    #[error("Worker task failed: {0}")]
    Worker(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl<T> From<std::sync::PoisonError<T>> for MirrorError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        MirrorError::LockPoisoned(err.to_string())
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid exclude pattern: {0}")]
    InvalidPattern(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL")]
    MissingHost,
}

/// Result type alias for docmirror operations
pub type Result<T> = std::result::Result<T, MirrorError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{Orchestrator, SessionOutcome};
pub use pipeline::{Mirror, MirrorSummary, RunOptions};
pub use redirect::RedirectTracker;
pub use resolve::LinkResolver;
pub use state::{PageStatus, Session};
pub use url::{normalize_url, CrawlScope};
