//! Statistics generation from the state store
//!
//! This module provides functionality for extracting and displaying
//! crawl statistics from the storage layer.

use crate::state::PageStatus;
use crate::storage::{PageRecord, Storage, StorageResult};
use std::collections::HashMap;

/// Crawl statistics summary
#[derive(Debug, Clone, Default)]
pub struct CrawlStatistics {
    /// Total number of page records
    pub total_pages: u64,

    /// Count of pages by status
    pub pages_by_status: HashMap<PageStatus, u64>,

    /// Number of recorded redirect edges
    pub redirects: u64,

    /// Failed pages, most attempts first
    pub failed_pages: Vec<PageRecord>,
}

impl CrawlStatistics {
    pub fn count(&self, status: PageStatus) -> u64 {
        self.pages_by_status.get(&status).copied().unwrap_or(0)
    }

    /// Share of page records that completed, in percent
    pub fn completion_rate(&self) -> f64 {
        if self.total_pages == 0 {
            return 0.0;
        }
        self.count(PageStatus::Completed) as f64 / self.total_pages as f64 * 100.0
    }
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
///
/// # Returns
///
/// * `Ok(CrawlStatistics)` - Successfully loaded statistics
/// * `Err(StorageError)` - Failed to query statistics
pub fn load_statistics(storage: &dyn Storage) -> StorageResult<CrawlStatistics> {
    let total_pages = storage.count_total_pages()?;

    let mut pages_by_status = storage.count_by_status()?;
    pages_by_status.retain(|_, count| *count > 0);

    let redirects = storage.count_redirects()?;
    let failed_pages = storage.failed_pages()?;

    Ok(CrawlStatistics {
        total_pages,
        pages_by_status,
        redirects,
        failed_pages,
    })
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &CrawlStatistics) {
    println!("=== Mirror Statistics ===\n");

    println!("Overview:");
    println!("  Total pages known: {}", stats.total_pages);
    println!("  Redirects recorded: {}", stats.redirects);
    println!();

    println!("Pages by Status:");
    for status in PageStatus::all() {
        let count = stats.count(status);
        if count == 0 {
            continue;
        }
        let percentage = if stats.total_pages > 0 {
            (count as f64 / stats.total_pages as f64) * 100.0
        } else {
            0.0
        };
        println!("  {}: {} ({:.1}%)", status, count, percentage);
    }
    println!();

    if !stats.failed_pages.is_empty() {
        println!("Failed Pages ({}):", stats.failed_pages.len());
        for page in stats.failed_pages.iter().take(20) {
            println!(
                "  - {} (attempts: {}{}) {}",
                page.url,
                page.attempts,
                if page.permanent { ", permanent" } else { "" },
                page.last_error.as_deref().unwrap_or("")
            );
        }
        if stats.failed_pages.len() > 20 {
            println!("  ... and {} more", stats.failed_pages.len() - 20);
        }
        println!();
    }

    println!(
        "Completion Rate: {:.1}% ({} / {} pages written)",
        stats.completion_rate(),
        stats.count(PageStatus::Completed),
        stats.total_pages
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteStorage;

    #[test]
    fn test_load_statistics() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let a = "https://docs.example.com/a";
        let b = "https://docs.example.com/b";
        storage.insert_discovered(a, 0, None).unwrap();
        storage.insert_discovered(b, 1, Some(a)).unwrap();

        storage.claim_for_fetch(a, 3).unwrap();
        storage.reserve_output_path(a, "A.md").unwrap();
        storage.mark_completed(a, Some("A")).unwrap();

        storage.claim_for_fetch(b, 3).unwrap();
        storage.mark_failed(b, "HTTP 404", true).unwrap();
        storage.record_redirect(b, a).unwrap();

        let stats = load_statistics(&storage).unwrap();
        assert_eq!(stats.total_pages, 2);
        assert_eq!(stats.count(PageStatus::Completed), 1);
        assert_eq!(stats.count(PageStatus::Failed), 1);
        assert_eq!(stats.count(PageStatus::Discovered), 0);
        assert_eq!(stats.redirects, 1);
        assert_eq!(stats.failed_pages.len(), 1);
        assert!((stats.completion_rate() - 50.0).abs() < f64::EPSILON);
    }
}
