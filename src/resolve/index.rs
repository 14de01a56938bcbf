//! URL to output path index
//!
//! Built once from the completed pages in the state store plus any generated
//! folder notes. Every URL maps to at most one path.

use crate::resolve::paths::strip_extension;
use crate::storage::CompletedPage;
use std::collections::{HashMap, HashSet};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// Output path including `.md`
    pub path: String,
    pub title: Option<String>,
}

/// Lookup tables used by the link resolver
#[derive(Debug, Clone, Default)]
pub struct PathIndex {
    by_url: HashMap<String, IndexEntry>,
    folder_notes: HashMap<String, String>,
    /// Source URL of each document, keyed by path without extension
    url_by_path: HashMap<String, String>,
    /// Lowercased title -> path; titles shared by two pages are dropped
    by_title: HashMap<String, String>,
    ambiguous_titles: HashSet<String>,
    /// Lowercased file stem -> path
    by_stem: HashMap<String, String>,
    ambiguous_stems: HashSet<String>,
    /// Every known path without extension
    paths: HashSet<String>,
}

impl PathIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Indexes every completed page
    pub fn from_completed(pages: &[CompletedPage]) -> Self {
        let mut index = Self::new();
        for page in pages {
            index.insert_page(&page.url, &page.output_path, page.title.as_deref());
        }
        index
    }

    /// Adds a written document
    ///
    /// # Returns
    ///
    /// `false` if the URL already mapped to a different path; the first
    /// mapping is kept.
    pub fn insert_page(&mut self, url: &str, path: &str, title: Option<&str>) -> bool {
        if let Some(existing) = self.by_url.get(url) {
            if existing.path != path {
                warn!(
                    "{} already indexed at {}, ignoring {}",
                    url, existing.path, path
                );
                return false;
            }
            return true;
        }

        self.by_url.insert(
            url.to_string(),
            IndexEntry {
                path: path.to_string(),
                title: title.map(|t| t.to_string()),
            },
        );
        self.register_path(url, path);

        if let Some(title) = title {
            insert_unique(
                &mut self.by_title,
                &mut self.ambiguous_titles,
                title.to_lowercase(),
                path,
            );
        }
        true
    }

    /// Adds a folder note standing in for a category URL
    pub fn insert_folder_note(&mut self, url: &str, path: &str) -> bool {
        if self.by_url.contains_key(url) || self.folder_notes.contains_key(url) {
            return false;
        }
        self.folder_notes.insert(url.to_string(), path.to_string());
        self.register_path(url, path);
        true
    }

    fn register_path(&mut self, url: &str, path: &str) {
        let bare = strip_extension(path).to_string();
        let stem = bare.rsplit('/').next().unwrap_or(&bare).to_lowercase();
        insert_unique(&mut self.by_stem, &mut self.ambiguous_stems, stem, path);
        self.url_by_path.insert(bare.clone(), url.to_string());
        self.paths.insert(bare);
    }

    pub fn lookup(&self, url: &str) -> Option<&IndexEntry> {
        self.by_url.get(url)
    }

    pub fn folder_note(&self, url: &str) -> Option<&str> {
        self.folder_notes.get(url).map(|s| s.as_str())
    }

    /// Path of the only page with this title, ignoring case
    pub fn by_title(&self, title: &str) -> Option<&str> {
        self.by_title.get(&title.to_lowercase()).map(|s| s.as_str())
    }

    /// Path of the only document with this file stem, ignoring case
    pub fn by_stem(&self, stem: &str) -> Option<&str> {
        self.by_stem.get(&stem.to_lowercase()).map(|s| s.as_str())
    }

    /// True for a known document path, given without extension
    pub fn contains_path(&self, bare_path: &str) -> bool {
        self.paths.contains(bare_path)
    }

    /// URL a document was written for
    pub fn url_for_path(&self, path: &str) -> Option<&str> {
        self.url_by_path
            .get(strip_extension(path))
            .map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.by_url.len() + self.folder_notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn insert_unique(
    map: &mut HashMap<String, String>,
    ambiguous: &mut HashSet<String>,
    key: String,
    path: &str,
) {
    if ambiguous.contains(&key) {
        return;
    }
    match map.get(&key) {
        Some(existing) if existing != path => {
            map.remove(&key);
            ambiguous.insert(key);
        }
        Some(_) => {}
        None => {
            map.insert(key, path.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(url: &str, path: &str, title: &str) -> CompletedPage {
        CompletedPage {
            url: url.to_string(),
            output_path: path.to_string(),
            title: Some(title.to_string()),
        }
    }

    #[test]
    fn test_lookup_by_url_title_and_stem() {
        let index = PathIndex::from_completed(&[
            page("https://d.example.com/a", "Guide/Alpha.md", "Alpha Guide"),
            page("https://d.example.com/b", "Beta.md", "Beta"),
        ]);

        assert_eq!(
            index.lookup("https://d.example.com/a").map(|e| e.path.as_str()),
            Some("Guide/Alpha.md")
        );
        assert_eq!(index.by_title("alpha guide"), Some("Guide/Alpha.md"));
        assert_eq!(index.by_stem("ALPHA"), Some("Guide/Alpha.md"));
        assert!(index.contains_path("Guide/Alpha"));
        assert_eq!(index.url_for_path("Beta.md"), Some("https://d.example.com/b"));
    }

    #[test]
    fn test_one_path_per_url() {
        let mut index = PathIndex::new();
        assert!(index.insert_page("https://d.example.com/a", "A.md", None));
        assert!(index.insert_page("https://d.example.com/a", "A.md", None));
        assert!(!index.insert_page("https://d.example.com/a", "Other.md", None));
        assert!(!index.insert_folder_note("https://d.example.com/a", "A/index.md"));
        assert_eq!(index.lookup("https://d.example.com/a").unwrap().path, "A.md");
    }

    #[test]
    fn test_ambiguous_titles_dropped() {
        let index = PathIndex::from_completed(&[
            page("https://d.example.com/a", "A/Overview.md", "Overview"),
            page("https://d.example.com/b", "B/Overview.md", "Overview"),
            page("https://d.example.com/c", "C/Overview.md", "Overview"),
        ]);
        assert_eq!(index.by_title("Overview"), None);
        assert_eq!(index.by_stem("overview"), None);
    }
}
