//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the docmirror state store.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- One row per normalized URL
CREATE TABLE IF NOT EXISTS pages (
    url TEXT PRIMARY KEY,
    status TEXT NOT NULL,
    depth INTEGER NOT NULL,
    output_path TEXT,
    title TEXT,
    attempts INTEGER NOT NULL DEFAULT 0,
    last_error TEXT,
    permanent INTEGER NOT NULL DEFAULT 0,
    parent_url TEXT,
    discovered_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_pages_status ON pages(status);

-- No two pages may own the same output file
CREATE UNIQUE INDEX IF NOT EXISTS idx_pages_output_path
    ON pages(output_path) WHERE output_path IS NOT NULL;

-- One outgoing edge per redirect source
CREATE TABLE IF NOT EXISTS redirects (
    source_url TEXT PRIMARY KEY,
    target_url TEXT NOT NULL,
    recorded_at TEXT NOT NULL
);

-- Run metadata
CREATE TABLE IF NOT EXISTS session (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();

        initialize_schema(&conn).unwrap();
        let result = initialize_schema(&conn);

        assert!(result.is_ok());
    }

    #[test]
    fn test_tables_exist_after_init() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();

        for table in ["pages", "redirects", "session"] {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                    [table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "Table {} should exist", table);
        }
    }

    #[test]
    fn test_output_path_unique_but_nullable() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();

        let insert = "INSERT INTO pages (url, status, depth, output_path, discovered_at, updated_at)
                      VALUES (?1, 'completed', 0, ?2, 'now', 'now')";
        conn.execute(insert, rusqlite::params!["https://a/1", None::<String>])
            .unwrap();
        conn.execute(insert, rusqlite::params!["https://a/2", None::<String>])
            .unwrap();
        conn.execute(insert, rusqlite::params!["https://a/3", "Guide/Intro.md"])
            .unwrap();
        assert!(conn
            .execute(insert, rusqlite::params!["https://a/4", "Guide/Intro.md"])
            .is_err());
    }
}
