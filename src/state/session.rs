//! Run-wide session metadata
//!
//! A `Session` is created once per process and shared by handle with the
//! orchestrator, the state store writer and the resolver. Its counters are
//! atomics so workers can bump them without taking the store lock.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Session keys as stored in the `session` table
pub mod keys {
    pub const CRAWL_ROOT: &str = "crawl_root";
    pub const STARTED_AT: &str = "started_at";
    pub const UPDATED_AT: &str = "updated_at";
    pub const CONFIG_HASH: &str = "config_hash";
    pub const FETCHED: &str = "fetched";
    pub const FAILED: &str = "failed";
    pub const SKIPPED: &str = "skipped";
    pub const REDIRECTED: &str = "redirected";
    pub const OUTCOME: &str = "outcome";
}

/// Process-wide run metadata
#[derive(Debug)]
pub struct Session {
    crawl_root: String,
    config_hash: String,
    started_at: DateTime<Utc>,
    started: Instant,
    fetched: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
    redirected: AtomicU64,
}

/// Plain copy of a session's persisted values
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub crawl_root: String,
    pub config_hash: String,
    pub started_at: String,
    pub updated_at: Option<String>,
    pub fetched: u64,
    pub failed: u64,
    pub skipped: u64,
    pub redirected: u64,
    pub outcome: Option<String>,
}

impl Session {
    /// Starts a new session for `crawl_root`
    pub fn new(crawl_root: impl Into<String>, config_hash: impl Into<String>) -> Self {
        Self {
            crawl_root: crawl_root.into(),
            config_hash: config_hash.into(),
            started_at: Utc::now(),
            started: Instant::now(),
            fetched: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            redirected: AtomicU64::new(0),
        }
    }

    /// Continues an interrupted session, carrying its counters forward
    ///
    /// The runtime clock restarts; `started_at` keeps the original value.
    pub fn resume(previous: &SessionSnapshot, config_hash: impl Into<String>) -> Self {
        let started_at = DateTime::parse_from_rfc3339(&previous.started_at)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        Self {
            crawl_root: previous.crawl_root.clone(),
            config_hash: config_hash.into(),
            started_at,
            started: Instant::now(),
            fetched: AtomicU64::new(previous.fetched),
            failed: AtomicU64::new(previous.failed),
            skipped: AtomicU64::new(previous.skipped),
            redirected: AtomicU64::new(previous.redirected),
        }
    }

    pub fn crawl_root(&self) -> &str {
        &self.crawl_root
    }

    pub fn config_hash(&self) -> &str {
        &self.config_hash
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Time since this process started the session
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn record_fetched(&self) -> u64 {
        self.fetched.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_redirected(&self) {
        self.redirected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn fetched(&self) -> u64 {
        self.fetched.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    pub fn redirected(&self) -> u64 {
        self.redirected.load(Ordering::Relaxed)
    }

    /// Captures the current values, tagged with an optional outcome
    pub fn snapshot(&self, outcome: Option<&str>) -> SessionSnapshot {
        SessionSnapshot {
            crawl_root: self.crawl_root.clone(),
            config_hash: self.config_hash.clone(),
            started_at: self.started_at.to_rfc3339(),
            updated_at: Some(Utc::now().to_rfc3339()),
            fetched: self.fetched(),
            failed: self.failed(),
            skipped: self.skipped(),
            redirected: self.redirected(),
            outcome: outcome.map(|s| s.to_string()),
        }
    }
}

impl SessionSnapshot {
    /// Flattens the snapshot into `session` table rows
    pub fn to_entries(&self) -> Vec<(&'static str, String)> {
        let mut entries = vec![
            (keys::CRAWL_ROOT, self.crawl_root.clone()),
            (keys::CONFIG_HASH, self.config_hash.clone()),
            (keys::STARTED_AT, self.started_at.clone()),
            (keys::FETCHED, self.fetched.to_string()),
            (keys::FAILED, self.failed.to_string()),
            (keys::SKIPPED, self.skipped.to_string()),
            (keys::REDIRECTED, self.redirected.to_string()),
        ];
        if let Some(updated) = &self.updated_at {
            entries.push((keys::UPDATED_AT, updated.clone()));
        }
        if let Some(outcome) = &self.outcome {
            entries.push((keys::OUTCOME, outcome.clone()));
        }
        entries
    }

    /// Rebuilds a snapshot from `session` table rows
    ///
    /// Returns `None` when no crawl root was ever stored.
    pub fn from_entries(entries: &HashMap<String, String>) -> Option<Self> {
        let count = |key: &str| {
            entries
                .get(key)
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(0)
        };

        Some(Self {
            crawl_root: entries.get(keys::CRAWL_ROOT)?.clone(),
            config_hash: entries.get(keys::CONFIG_HASH).cloned().unwrap_or_default(),
            started_at: entries.get(keys::STARTED_AT).cloned().unwrap_or_default(),
            updated_at: entries.get(keys::UPDATED_AT).cloned(),
            fetched: count(keys::FETCHED),
            failed: count(keys::FAILED),
            skipped: count(keys::SKIPPED),
            redirected: count(keys::REDIRECTED),
            outcome: entries.get(keys::OUTCOME).cloned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let session = Session::new("https://docs.example.com/product", "abc");
        assert_eq!(session.record_fetched(), 1);
        assert_eq!(session.record_fetched(), 2);
        session.record_failed();
        session.record_redirected();
        session.record_skipped();

        assert_eq!(session.fetched(), 2);
        assert_eq!(session.failed(), 1);
        assert_eq!(session.redirected(), 1);
        assert_eq!(session.skipped(), 1);
    }

    #[test]
    fn test_snapshot_entries_roundtrip() {
        let session = Session::new("https://docs.example.com/product", "abc");
        session.record_fetched();
        let snapshot = session.snapshot(Some("completed"));

        let entries: HashMap<String, String> = snapshot
            .to_entries()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();

        assert_eq!(SessionSnapshot::from_entries(&entries), Some(snapshot));
    }

    #[test]
    fn test_from_entries_requires_root() {
        assert_eq!(SessionSnapshot::from_entries(&HashMap::new()), None);
    }

    #[test]
    fn test_resume_carries_counters() {
        let original = Session::new("https://docs.example.com/product", "abc");
        original.record_fetched();
        original.record_failed();
        let snapshot = original.snapshot(Some("interrupted"));

        let resumed = Session::resume(&snapshot, "def");
        assert_eq!(resumed.fetched(), 1);
        assert_eq!(resumed.failed(), 1);
        assert_eq!(resumed.config_hash(), "def");
        assert_eq!(resumed.crawl_root(), "https://docs.example.com/product");
        assert_eq!(
            resumed.started_at().timestamp(),
            original.started_at().timestamp()
        );
    }
}
