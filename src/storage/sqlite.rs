//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::state::PageStatus;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{CompletedPage, PageRecord, RedirectEdge};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::Path;

const PAGE_COLUMNS: &str = "url, status, depth, output_path, title, attempts, last_error,
     permanent, parent_url, updated_at";

/// Upper bound on `_N` suffixes tried for one output path
const MAX_PATH_SUFFIX: u32 = 10_000;

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Opens or creates the state store at `path`
    ///
    /// The file is integrity-checked before anything else touches it. A file
    /// that is not a database, or one SQLite reports as damaged, is an error.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(StorageError)` - Store unavailable or corrupt
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)
            .map_err(|e| StorageError::Unavailable(format!("{}: {}", path.display(), e)))?;

        verify_integrity(&conn)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    fn status_of(&self, url: &str) -> StorageResult<PageStatus> {
        let status: Option<String> = self
            .conn
            .query_row(
                "SELECT status FROM pages WHERE url = ?1",
                params![url],
                |row| row.get(0),
            )
            .optional()?;

        status
            .map(|s| PageStatus::from_db_string(&s).unwrap_or(PageStatus::Failed))
            .ok_or_else(|| StorageError::PageNotFound(url.to_string()))
    }

    fn ensure_transition(&self, url: &str, to: PageStatus) -> StorageResult<()> {
        let from = self.status_of(url)?;
        if from.can_transition_to(to) {
            Ok(())
        } else {
            Err(StorageError::InvalidTransition {
                url: url.to_string(),
                from,
                to,
            })
        }
    }

    fn path_taken(&self, candidate: &str, url: &str) -> StorageResult<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM pages WHERE output_path = ?1 COLLATE NOCASE AND url != ?2",
            params![candidate, url],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}

/// Runs `PRAGMA integrity_check` and fails closed on anything but "ok"
fn verify_integrity(conn: &Connection) -> StorageResult<()> {
    let result: String = conn
        .query_row("PRAGMA integrity_check", [], |row| row.get(0))
        .map_err(|e| StorageError::Corrupt(e.to_string()))?;

    if result == "ok" {
        Ok(())
    } else {
        Err(StorageError::Corrupt(result))
    }
}

fn row_to_page(row: &Row<'_>) -> rusqlite::Result<PageRecord> {
    Ok(PageRecord {
        url: row.get(0)?,
        status: PageStatus::from_db_string(&row.get::<_, String>(1)?)
            .unwrap_or(PageStatus::Failed),
        depth: row.get(2)?,
        output_path: row.get(3)?,
        title: row.get(4)?,
        attempts: row.get(5)?,
        last_error: row.get(6)?,
        permanent: row.get(7)?,
        parent_url: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

/// Splits `dir/name.ext` into (`dir/name`, `.ext`)
fn split_extension(path: &str) -> (&str, &str) {
    let name_start = path.rfind('/').map(|i| i + 1).unwrap_or(0);
    match path.rfind('.') {
        Some(dot) if dot > name_start => (&path[..dot], &path[dot..]),
        _ => (path, ""),
    }
}

impl Storage for SqliteStorage {
    // ===== Page Lookup =====

    fn lookup(&self, url: &str) -> StorageResult<Option<PageRecord>> {
        let page = self
            .conn
            .query_row(
                &format!("SELECT {} FROM pages WHERE url = ?1", PAGE_COLUMNS),
                params![url],
                row_to_page,
            )
            .optional()?;

        Ok(page)
    }

    fn all_completed(&self) -> StorageResult<Vec<CompletedPage>> {
        let mut stmt = self.conn.prepare(
            "SELECT url, output_path, title FROM pages
             WHERE status = ?1 AND output_path IS NOT NULL
             ORDER BY output_path",
        )?;

        let pages = stmt
            .query_map(params![PageStatus::Completed.to_db_string()], |row| {
                Ok(CompletedPage {
                    url: row.get(0)?,
                    output_path: row.get(1)?,
                    title: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(pages)
    }

    // ===== Discovery and Claiming =====

    fn insert_discovered(
        &mut self,
        url: &str,
        depth: u32,
        parent_url: Option<&str>,
    ) -> StorageResult<bool> {
        let now = Utc::now().to_rfc3339();
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO pages (url, status, depth, parent_url, discovered_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![
                url,
                PageStatus::Discovered.to_db_string(),
                depth,
                parent_url,
                now
            ],
        )?;

        if inserted == 0 {
            // Keep the shallowest depth for pages nobody has fetched yet
            self.conn.execute(
                "UPDATE pages SET depth = ?2 WHERE url = ?1 AND status = ?3 AND depth > ?2",
                params![url, depth, PageStatus::Discovered.to_db_string()],
            )?;
        }

        Ok(inserted == 1)
    }

    fn claim_for_fetch(&mut self, url: &str, max_attempts: u32) -> StorageResult<bool> {
        let now = Utc::now().to_rfc3339();
        let changed = self.conn.execute(
            "UPDATE pages SET status = ?2, updated_at = ?3
             WHERE url = ?1
               AND (status = ?4 OR (status = ?5 AND permanent = 0 AND attempts < ?6))",
            params![
                url,
                PageStatus::InProgress.to_db_string(),
                now,
                PageStatus::Discovered.to_db_string(),
                PageStatus::Failed.to_db_string(),
                max_attempts
            ],
        )?;
        Ok(changed == 1)
    }

    fn pending_pages(&self, max_attempts: u32) -> StorageResult<Vec<PageRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM pages
             WHERE status IN (?1, ?2) OR (status = ?3 AND permanent = 0 AND attempts < ?4)
             ORDER BY depth, discovered_at",
            PAGE_COLUMNS
        ))?;

        let pages = stmt
            .query_map(
                params![
                    PageStatus::Discovered.to_db_string(),
                    PageStatus::InProgress.to_db_string(),
                    PageStatus::Failed.to_db_string(),
                    max_attempts
                ],
                row_to_page,
            )?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(pages)
    }

    fn reset_in_progress(&mut self) -> StorageResult<usize> {
        let now = Utc::now().to_rfc3339();
        let changed = self.conn.execute(
            "UPDATE pages SET status = ?1, output_path = NULL, updated_at = ?2 WHERE status = ?3",
            params![
                PageStatus::Discovered.to_db_string(),
                now,
                PageStatus::InProgress.to_db_string()
            ],
        )?;
        Ok(changed)
    }

    // ===== Outcomes =====

    fn reserve_output_path(&mut self, url: &str, desired: &str) -> StorageResult<String> {
        let status = self.status_of(url)?;
        if !matches!(status, PageStatus::InProgress | PageStatus::Redirected) {
            return Err(StorageError::InvalidTransition {
                url: url.to_string(),
                from: status,
                to: PageStatus::Completed,
            });
        }

        let (stem, ext) = split_extension(desired);
        let mut candidate = desired.to_string();
        let mut suffix = 0;

        while self.path_taken(&candidate, url)? {
            suffix += 1;
            if suffix > MAX_PATH_SUFFIX {
                return Err(StorageError::ConstraintViolation(format!(
                    "no free output path for {} near {}",
                    url, desired
                )));
            }
            candidate = format!("{}_{}{}", stem, suffix, ext);
        }

        self.conn.execute(
            "UPDATE pages SET output_path = ?2 WHERE url = ?1",
            params![url, candidate],
        )?;

        Ok(candidate)
    }

    fn mark_completed(&mut self, url: &str, title: Option<&str>) -> StorageResult<()> {
        self.ensure_transition(url, PageStatus::Completed)?;

        let now = Utc::now().to_rfc3339();
        let changed = self.conn.execute(
            "UPDATE pages SET status = ?2, title = ?3, last_error = NULL, updated_at = ?4
             WHERE url = ?1 AND output_path IS NOT NULL",
            params![url, PageStatus::Completed.to_db_string(), title, now],
        )?;

        if changed == 0 {
            return Err(StorageError::ConstraintViolation(format!(
                "{} completed without an output path",
                url
            )));
        }
        Ok(())
    }

    fn mark_failed(&mut self, url: &str, error: &str, permanent: bool) -> StorageResult<u32> {
        self.ensure_transition(url, PageStatus::Failed)?;

        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "UPDATE pages SET status = ?2, attempts = attempts + 1, last_error = ?3,
             permanent = ?4, output_path = NULL, updated_at = ?5
             WHERE url = ?1",
            params![url, PageStatus::Failed.to_db_string(), error, permanent, now],
        )?;

        let attempts: u32 = self.conn.query_row(
            "SELECT attempts FROM pages WHERE url = ?1",
            params![url],
            |row| row.get(0),
        )?;
        Ok(attempts)
    }

    fn mark_redirected(&mut self, url: &str) -> StorageResult<()> {
        self.ensure_transition(url, PageStatus::Redirected)?;

        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "UPDATE pages SET status = ?2, output_path = NULL, last_error = NULL, updated_at = ?3
             WHERE url = ?1",
            params![url, PageStatus::Redirected.to_db_string(), now],
        )?;
        Ok(())
    }

    fn reset_exhausted_failures(&mut self, max_attempts: u32) -> StorageResult<usize> {
        let changed = self.conn.execute(
            "UPDATE pages SET attempts = 0 WHERE status = ?1 AND permanent = 0 AND attempts >= ?2",
            params![PageStatus::Failed.to_db_string(), max_attempts],
        )?;
        Ok(changed)
    }

    // ===== Redirects =====

    fn record_redirect(&mut self, source: &str, target: &str) -> StorageResult<Option<String>> {
        let previous: Option<String> = self
            .conn
            .query_row(
                "SELECT target_url FROM redirects WHERE source_url = ?1",
                params![source],
                |row| row.get(0),
            )
            .optional()?;

        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO redirects (source_url, target_url, recorded_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(source_url) DO UPDATE SET
                target_url = excluded.target_url, recorded_at = excluded.recorded_at",
            params![source, target, now],
        )?;

        Ok(previous.filter(|p| p != target))
    }

    fn load_redirects(&self) -> StorageResult<Vec<RedirectEdge>> {
        let mut stmt = self
            .conn
            .prepare("SELECT source_url, target_url FROM redirects ORDER BY recorded_at")?;

        let edges = stmt
            .query_map([], |row| {
                Ok(RedirectEdge {
                    source: row.get(0)?,
                    target: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(edges)
    }

    // ===== Session =====

    fn load_session(&self) -> StorageResult<HashMap<String, String>> {
        let mut stmt = self.conn.prepare("SELECT key, value FROM session")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut entries = HashMap::new();
        for row in rows {
            let (key, value) = row?;
            entries.insert(key, value);
        }
        Ok(entries)
    }

    fn save_session(&mut self, entries: &[(&str, String)]) -> StorageResult<()> {
        let tx = self.conn.transaction()?;
        for (key, value) in entries {
            tx.execute(
                "INSERT INTO session (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key, value],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    // ===== Maintenance =====

    fn clear_all(&mut self) -> StorageResult<()> {
        self.conn.execute_batch(
            "
            DELETE FROM pages;
            DELETE FROM redirects;
            DELETE FROM session;
        ",
        )?;
        Ok(())
    }

    // ===== Statistics =====

    fn count_by_status(&self) -> StorageResult<HashMap<PageStatus, u64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT status, COUNT(*) FROM pages GROUP BY status")?;

        let rows = stmt.query_map([], |row| {
            let status: String = row.get(0)?;
            let count: i64 = row.get(1)?;
            Ok((status, count))
        })?;

        let mut counts = HashMap::new();
        for row in rows {
            let (status, count) = row?;
            if let Some(status) = PageStatus::from_db_string(&status) {
                counts.insert(status, count as u64);
            }
        }
        Ok(counts)
    }

    fn count_total_pages(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM pages", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn count_redirects(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM redirects", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn failed_pages(&self) -> StorageResult<Vec<PageRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM pages WHERE status = ?1 ORDER BY attempts DESC, url",
            PAGE_COLUMNS
        ))?;

        let pages = stmt
            .query_map(params![PageStatus::Failed.to_db_string()], row_to_page)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(pages)
    }
}
