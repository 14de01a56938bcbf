//! URL handling module for docmirror
//!
//! This module provides URL normalization, trailing-slash variants, and the
//! crawl-scope check that keeps the mirror inside one documentation subtree.

mod normalize;

use crate::config::SiteConfig;
use crate::ConfigError;
use regex::Regex;
use url::Url;

// Re-export main functions
pub use normalize::{normalize_url, resolve_href, url_variants};

/// The subtree a crawl is allowed to traverse
///
/// A URL is in scope when it shares the crawl root's host and port, its path
/// lies at or below the root path, and no exclude pattern matches its path.
#[derive(Debug, Clone)]
pub struct CrawlScope {
    root: Url,
    root_path: String,
    excludes: Vec<Regex>,
}

impl CrawlScope {
    /// Builds a scope from a root URL and exclude regexes
    pub fn new(root_url: &str, excludes: &[String]) -> Result<Self, ConfigError> {
        let root = normalize_url(root_url)
            .map_err(|e| ConfigError::InvalidUrl(format!("{}: {}", root_url, e)))?;
        let root_path = root.path().trim_end_matches('/').to_string();
        let excludes = excludes
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|e| ConfigError::InvalidPattern(format!("'{}': {}", p, e)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            root,
            root_path,
            excludes,
        })
    }

    /// Builds a scope from the `[site]` section of the configuration
    pub fn from_config(site: &SiteConfig) -> Result<Self, ConfigError> {
        Self::new(&site.root_url, &site.exclude)
    }

    /// The normalized crawl root
    pub fn root(&self) -> &Url {
        &self.root
    }

    /// True when `url` is served by the crawl root's host (and port)
    pub fn is_internal(&self, url: &Url) -> bool {
        url.host_str() == self.root.host_str()
            && url.port_or_known_default() == self.root.port_or_known_default()
    }

    /// True when `url` may be fetched by this crawl
    pub fn contains(&self, url: &Url) -> bool {
        if !self.is_internal(url) {
            return false;
        }

        let path = url.path();
        let under_root = self.root_path.is_empty()
            || path == self.root_path
            || path.starts_with(&format!("{}/", self.root_path));

        under_root && !self.is_excluded(path)
    }

    fn is_excluded(&self, path: &str) -> bool {
        let lowered = path.to_lowercase();
        self.excludes.iter().any(|re| re.is_match(&lowered))
    }

    /// Path segments of `url` below the crawl root, or `None` when out of scope
    ///
    /// The root itself yields an empty list.
    pub fn relative_segments(&self, url: &Url) -> Option<Vec<String>> {
        if !self.is_internal(url) {
            return None;
        }
        let rest = url.path().strip_prefix(&self.root_path)?;
        if !rest.is_empty() && !rest.starts_with('/') {
            return None;
        }
        Some(
            rest.split('/')
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string())
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope() -> CrawlScope {
        CrawlScope::new(
            "https://docs.example.com/product/",
            &["/api/".to_string(), r"\.pdf$".to_string()],
        )
        .unwrap()
    }

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_contains_subtree() {
        let scope = scope();
        assert!(scope.contains(&url("https://docs.example.com/product")));
        assert!(scope.contains(&url("https://docs.example.com/product/guide/intro")));
    }

    #[test]
    fn test_rejects_sibling_prefix() {
        assert!(!scope().contains(&url("https://docs.example.com/productivity")));
    }

    #[test]
    fn test_rejects_other_host_and_port() {
        let scope = scope();
        assert!(!scope.contains(&url("https://example.com/product/x")));
        assert!(!scope.contains(&url("https://docs.example.com:8443/product/x")));
    }

    #[test]
    fn test_excludes_are_applied_to_path() {
        let scope = scope();
        assert!(!scope.contains(&url("https://docs.example.com/product/api/v1")));
        assert!(!scope.contains(&url("https://docs.example.com/product/manual.PDF")));
    }

    #[test]
    fn test_is_internal_ignores_path() {
        assert!(scope().is_internal(&url("https://docs.example.com/elsewhere")));
    }

    #[test]
    fn test_relative_segments() {
        let scope = scope();
        assert_eq!(
            scope.relative_segments(&url("https://docs.example.com/product/guide/intro")),
            Some(vec!["guide".to_string(), "intro".to_string()])
        );
        assert_eq!(
            scope.relative_segments(&url("https://docs.example.com/product")),
            Some(vec![])
        );
        assert_eq!(
            scope.relative_segments(&url("https://docs.example.com/productivity")),
            None
        );
    }
}
