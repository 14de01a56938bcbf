//! Storage traits and error types
//!
//! This module defines the trait interface for state store backends and
//! associated error types.

use crate::state::PageStatus;
use crate::storage::{CompletedPage, PageRecord, RedirectEdge};
use std::collections::HashMap;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("State store unavailable: {0}")]
    Unavailable(String),

    #[error("State store is corrupt: {0}")]
    Corrupt(String),

    #[error("Page not found: {0}")]
    PageNotFound(String),

    #[error("Invalid state transition for {url}: {from} -> {to}")]
    InvalidTransition {
        url: String,
        from: PageStatus,
        to: PageStatus,
    },

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for state store implementations
///
/// Every mutation of a page record goes through this interface. Callers hold
/// the store behind a mutex, so each method is one linearized step.
pub trait Storage {
    // ===== Page Lookup =====

    /// Looks up a page by normalized URL
    fn lookup(&self, url: &str) -> StorageResult<Option<PageRecord>>;

    /// Returns every completed page with its output path and title
    fn all_completed(&self) -> StorageResult<Vec<CompletedPage>>;

    // ===== Discovery and Claiming =====

    /// Records a newly discovered URL
    ///
    /// # Arguments
    ///
    /// * `url` - The normalized URL
    /// * `depth` - Distance from the nearest seed
    /// * `parent_url` - The page the link was found on, if any
    ///
    /// # Returns
    ///
    /// `true` if the URL was new. An existing, still-Discovered record keeps
    /// the smaller of its old and new depth.
    fn insert_discovered(
        &mut self,
        url: &str,
        depth: u32,
        parent_url: Option<&str>,
    ) -> StorageResult<bool>;

    /// Atomically moves a page to InProgress if it may be fetched
    ///
    /// Succeeds for Discovered pages and for non-permanent Failed pages with
    /// fewer than `max_attempts` attempts. Returns `false` otherwise, which
    /// means another worker holds the page or it is already settled.
    fn claim_for_fetch(&mut self, url: &str, max_attempts: u32) -> StorageResult<bool>;

    /// Returns every page that still needs work, ordered by depth
    fn pending_pages(&self, max_attempts: u32) -> StorageResult<Vec<PageRecord>>;

    /// Hands InProgress pages left by an interrupted run back to Discovered
    ///
    /// Output paths reserved by those pages are released.
    fn reset_in_progress(&mut self) -> StorageResult<usize>;

    // ===== Outcomes =====

    /// Reserves a unique output path for an InProgress page, or for the
    /// redirect stub of a Redirected page
    ///
    /// Tries `desired` first, then `stem_1.ext`, `stem_2.ext`, and so on.
    /// Comparison ignores case so the tree survives case-insensitive filesystems.
    fn reserve_output_path(&mut self, url: &str, desired: &str) -> StorageResult<String>;

    /// Marks an InProgress page Completed; it must hold an output path
    fn mark_completed(&mut self, url: &str, title: Option<&str>) -> StorageResult<()>;

    /// Marks an InProgress page Failed and bumps its attempt counter
    ///
    /// # Returns
    ///
    /// The attempt count after this failure
    fn mark_failed(&mut self, url: &str, error: &str, permanent: bool) -> StorageResult<u32>;

    /// Marks a page Redirected (terminal, its content lives elsewhere)
    fn mark_redirected(&mut self, url: &str) -> StorageResult<()>;

    /// Gives every non-permanent exhausted failure a fresh attempt budget
    fn reset_exhausted_failures(&mut self, max_attempts: u32) -> StorageResult<usize>;

    // ===== Redirects =====

    /// Records a redirect edge, replacing any previous edge from `source`
    ///
    /// # Returns
    ///
    /// The previous target if it differed from the new one
    fn record_redirect(&mut self, source: &str, target: &str) -> StorageResult<Option<String>>;

    /// Loads every recorded redirect edge
    fn load_redirects(&self) -> StorageResult<Vec<RedirectEdge>>;

    // ===== Session =====

    /// Loads the session key/value rows
    fn load_session(&self) -> StorageResult<HashMap<String, String>>;

    /// Upserts session key/value rows in one transaction
    fn save_session(&mut self, entries: &[(&str, String)]) -> StorageResult<()>;

    // ===== Maintenance =====

    /// Deletes all pages, redirects and session rows
    fn clear_all(&mut self) -> StorageResult<()>;

    // ===== Statistics =====

    /// Counts pages grouped by status
    fn count_by_status(&self) -> StorageResult<HashMap<PageStatus, u64>>;

    /// Counts all page records
    fn count_total_pages(&self) -> StorageResult<u64>;

    /// Counts redirect edges
    fn count_redirects(&self) -> StorageResult<u64>;

    /// Returns every Failed page, most attempts first
    fn failed_pages(&self) -> StorageResult<Vec<PageRecord>>;
}
