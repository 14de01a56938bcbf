//! Folder notes and the table of contents
//!
//! Documentation sites often have category URLs that only list their
//! children, or that fail to render for a crawler. When such a URL has
//! crawled descendants but no document of its own, a folder note
//! (`<folder>/index.md`) stands in for it so links to the category still land
//! somewhere useful. The root `index.md` lists every completed page.

use crate::output::paths::{folder_for, slug_to_title, INDEX_STEM};
use crate::resolve::{relative_path, strip_extension};
use crate::storage::CompletedPage;
use crate::url::{normalize_url, CrawlScope};
use std::collections::{BTreeMap, HashSet};
use url::Url;

/// Output path of the table of contents
pub const TOC_PATH: &str = "index.md";

/// A generated stand-in document for a category URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderNote {
    /// Category URL the note stands in for
    pub url: String,
    /// `<folder>/index.md`
    pub path: String,
    pub title: String,
    /// `(output path, title)` of every document directly inside the folder
    pub entries: Vec<(String, String)>,
}

impl FolderNote {
    /// Note body; every entry is already a resolved relative wikilink
    pub fn render(&self) -> String {
        let mut doc = format!(
            "---\ntitle: \"{}\"\nurl: \"{}\"\n---\n\n# {}\n\n",
            self.title, self.url, self.title
        );
        for (path, title) in &self.entries {
            doc.push_str(&format!("- [[{}|{}]]\n", relative_path(&self.path, path), title));
        }
        doc
    }
}

/// Directory part of a `/`-separated output path, empty at the root
pub fn parent_dir(path: &str) -> &str {
    path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

fn display_title(page: &CompletedPage) -> String {
    page.title.clone().unwrap_or_else(|| {
        let stem = strip_extension(&page.output_path);
        stem.rsplit('/').next().unwrap_or(stem).to_string()
    })
}

/// Plans a folder note for every category URL that needs one
///
/// # Arguments
///
/// * `scope` - The crawl scope, used to map URLs to folders
/// * `completed` - Every completed page
/// * `has_document` - True for URLs that need no note, such as redirect sources
pub fn plan_folder_notes<F>(
    scope: &CrawlScope,
    completed: &[CompletedPage],
    has_document: F,
) -> Vec<FolderNote>
where
    F: Fn(&str) -> bool,
{
    let completed_urls: HashSet<&str> = completed.iter().map(|p| p.url.as_str()).collect();
    let root_path = scope.root().path().trim_end_matches('/').to_string();

    // folder -> category URL
    let mut folders: BTreeMap<String, String> = BTreeMap::new();
    for page in completed {
        let Ok(url) = Url::parse(&page.url) else {
            continue;
        };
        let Some(segments) = scope.relative_segments(&url) else {
            continue;
        };

        for depth in 1..segments.len() {
            let mut ancestor = scope.root().clone();
            ancestor.set_path(&format!("{}/{}", root_path, segments[..depth].join("/")));
            let Ok(ancestor) = normalize_url(ancestor.as_str()) else {
                continue;
            };
            let ancestor_url = ancestor.to_string();

            if completed_urls.contains(ancestor_url.as_str()) || has_document(&ancestor_url) {
                continue;
            }
            if let Some(folder) = folder_for(scope, &ancestor) {
                folders.entry(folder).or_insert(ancestor_url);
            }
        }
    }

    folders
        .iter()
        .map(|(folder, url)| {
            let mut entries: Vec<(String, String)> = completed
                .iter()
                .filter(|p| parent_dir(&p.output_path) == folder)
                .map(|p| (p.output_path.clone(), display_title(p)))
                .collect();

            // Sub-folders that got a note of their own
            for sub in folders.keys() {
                if parent_dir(sub) == folder {
                    let title = sub.rsplit('/').next().unwrap_or(sub).to_string();
                    entries.push((format!("{}/{}.md", sub, INDEX_STEM), title));
                }
            }
            entries.sort_by(|a, b| a.1.to_lowercase().cmp(&b.1.to_lowercase()));

            let title = url
                .rsplit('/')
                .next()
                .map(slug_to_title)
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| folder.clone());

            FolderNote {
                url: url.clone(),
                path: format!("{}/{}.md", folder, INDEX_STEM),
                title,
                entries,
            }
        })
        .collect()
}

/// Renders the root table of contents
///
/// Pages are grouped by directory, top-level pages first, and the listing
/// ends with the total count.
pub fn render_table_of_contents(title: &str, completed: &[CompletedPage]) -> String {
    let mut groups: BTreeMap<&str, Vec<&CompletedPage>> = BTreeMap::new();
    for page in completed {
        groups
            .entry(parent_dir(&page.output_path))
            .or_default()
            .push(page);
    }

    let mut doc = format!("---\ntitle: \"{}\"\n---\n\n# {}\n", title, title);
    for (dir, mut pages) in groups {
        pages.sort_by_key(|p| p.output_path.to_lowercase());
        let heading = if dir.is_empty() { "Top Level" } else { dir };
        doc.push_str(&format!("\n## {}\n\n", heading));
        for page in pages {
            doc.push_str(&format!(
                "- [[{}|{}]]\n",
                relative_path(TOC_PATH, &page.output_path),
                display_title(page)
            ));
        }
    }

    doc.push_str(&format!("\n---\n\nTotal: {} pages\n", completed.len()));
    doc
}
