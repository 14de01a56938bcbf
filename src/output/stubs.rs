//! Redirect stub documents
//!
//! When enabled, a redirected URL inside the crawl scope gets a short
//! document at its own planned path that points at the page its redirect
//! chain ends on. Stubs are never link targets: links to a redirected URL
//! still resolve to the final page.

use crate::resolve::{relative_path, strip_extension};

/// A stand-in document for a redirected URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectStub {
    /// Redirected URL the stub is written for
    pub url: String,
    /// Where the redirect chain ends
    pub target_url: String,
    /// Output path of the stub
    pub path: String,
    /// Output path of the final page
    pub target_path: String,
    pub target_title: Option<String>,
}

impl RedirectStub {
    pub fn render(&self) -> String {
        let title = self.target_title.clone().unwrap_or_else(|| {
            let stem = strip_extension(&self.target_path);
            stem.rsplit('/').next().unwrap_or(stem).to_string()
        });
        let target = relative_path(&self.path, &self.target_path);
        let link = if target == title {
            format!("[[{}]]", target)
        } else {
            format!("[[{}|{}]]", target, title)
        };
        format!(
            "---\nurl: \"{}\"\nredirect-to: \"{}\"\ncanonical-file: \"{}\"\n---\n\n\
             # Redirected\n\nThis page has moved to {}.\n",
            self.url, self.target_url, self.target_path, link
        )
    }
}
