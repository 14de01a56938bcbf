//! Storage module for persisting crawl state
//!
//! The state store is the single source of truth for resumption:
//! - Per-URL page records (status, depth, attempts, output path)
//! - Redirect edges observed while fetching
//! - Session metadata (crawl root, counters, outcome)
//!
//! Opening a store verifies its integrity first and refuses to continue on a
//! damaged file rather than silently starting over.

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::state::PageStatus;
use std::path::Path;

/// Opens (or creates) the state store at `path`
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteStorage)` - Store opened and verified
/// * `Err(StorageError)` - Store unavailable or corrupt
pub fn open_storage(path: &Path) -> StorageResult<SqliteStorage> {
    SqliteStorage::new(path)
}

/// A page in the state store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRecord {
    /// Normalized URL, the identity key
    pub url: String,
    pub status: PageStatus,
    /// Distance from the nearest seed
    pub depth: u32,
    /// Output file relative to the mirror root, set once content is written
    pub output_path: Option<String>,
    pub title: Option<String>,
    pub attempts: u32,
    pub last_error: Option<String>,
    /// Set for failures that must never be retried (4xx other than 429)
    pub permanent: bool,
    pub parent_url: Option<String>,
    pub updated_at: String,
}

impl PageRecord {
    /// True when the crawl will never fetch this page again
    ///
    /// Completed and Redirected pages are done; Failed pages are done once the
    /// failure is permanent or the attempt budget is spent.
    pub fn is_settled(&self, max_attempts: u32) -> bool {
        match self.status {
            PageStatus::Completed | PageStatus::Redirected => true,
            PageStatus::Failed => self.permanent || self.attempts >= max_attempts,
            PageStatus::Discovered | PageStatus::InProgress => false,
        }
    }
}

/// A completed page as seen by the link resolver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPage {
    pub url: String,
    pub output_path: String,
    pub title: Option<String>,
}

/// A single redirect hop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectEdge {
    pub source: String,
    pub target: String,
}

impl RedirectEdge {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(status: PageStatus, attempts: u32, permanent: bool) -> PageRecord {
        PageRecord {
            url: "https://docs.example.com/a".to_string(),
            status,
            depth: 0,
            output_path: None,
            title: None,
            attempts,
            last_error: None,
            permanent,
            parent_url: None,
            updated_at: String::new(),
        }
    }

    #[test]
    fn test_is_settled() {
        assert!(record(PageStatus::Completed, 1, false).is_settled(3));
        assert!(record(PageStatus::Redirected, 1, false).is_settled(3));
        assert!(record(PageStatus::Failed, 1, true).is_settled(3));
        assert!(record(PageStatus::Failed, 3, false).is_settled(3));

        assert!(!record(PageStatus::Failed, 2, false).is_settled(3));
        assert!(!record(PageStatus::Discovered, 0, false).is_settled(3));
        assert!(!record(PageStatus::InProgress, 0, false).is_settled(3));
    }
}
