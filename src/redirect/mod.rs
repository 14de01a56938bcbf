//! Redirect tracking and chain resolution
//!
//! The tracker is an in-memory view of the redirect edges persisted in the
//! state store. Workers persist edges as they observe them; the resolver loads
//! them once after the crawl and asks for final destinations.

use crate::storage::RedirectEdge;
use crate::url::{normalize_url, url_variants};
use std::collections::{HashMap, HashSet};
use tracing::warn;

/// `source -> target` redirect graph
#[derive(Debug, Clone, Default)]
pub struct RedirectTracker {
    edges: HashMap<String, String>,
}

impl RedirectTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a tracker from persisted edges, later edges winning
    pub fn from_edges<I>(edges: I) -> Self
    where
        I: IntoIterator<Item = RedirectEdge>,
    {
        let mut tracker = Self::new();
        for edge in edges {
            tracker.record(&edge.source, &edge.target);
        }
        tracker
    }

    /// Records `source -> target`
    ///
    /// A source has at most one outgoing edge. Recording a different target
    /// for a known source replaces the old edge and logs a warning.
    ///
    /// # Returns
    ///
    /// The replaced target, if it differed
    pub fn record(&mut self, source: &str, target: &str) -> Option<String> {
        let source = canonical(source);
        let target = canonical(target);

        match self.edges.insert(source.clone(), target.clone()) {
            Some(previous) if previous != target => {
                warn!(
                    "Redirect from {} changed: {} replaced by {}",
                    source, previous, target
                );
                Some(previous)
            }
            _ => None,
        }
    }

    /// Number of recorded edges
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// True when `url` (in any trailing-slash form) has an outgoing edge
    pub fn is_redirect_source(&self, url: &str) -> bool {
        self.next_hop(url).is_some()
    }

    fn next_hop(&self, url: &str) -> Option<&String> {
        url_variants(url)
            .iter()
            .find_map(|variant| self.edges.get(variant))
    }

    /// Follows redirect edges from `url` to the final destination
    ///
    /// Every hop tries the URL with and without a trailing slash before
    /// concluding the chain has ended. A cycle stops the walk at the last URL
    /// before the repeat and logs a warning. The walk visits each URL at most
    /// once, so it ends after at most `len() + 1` hops.
    ///
    /// # Examples
    ///
    /// ```
    /// use docmirror::redirect::RedirectTracker;
    ///
    /// let mut tracker = RedirectTracker::new();
    /// tracker.record("https://docs.example.com/a", "https://docs.example.com/b/");
    /// tracker.record("https://docs.example.com/b", "https://docs.example.com/c");
    /// assert_eq!(
    ///     tracker.resolve_chain("https://docs.example.com/a"),
    ///     "https://docs.example.com/c"
    /// );
    /// ```
    pub fn resolve_chain(&self, url: &str) -> String {
        let mut current = canonical(url);
        let mut seen = HashSet::new();
        seen.insert(current.clone());

        while let Some(next) = self.next_hop(&current) {
            let next = canonical(next);
            if !seen.insert(next.clone()) {
                warn!("Redirect loop detected at {} (next hop {})", current, next);
                return current;
            }
            current = next;
        }

        current
    }
}

/// Identity form used for graph keys; unparseable input only loses its trailing slash
fn canonical(url: &str) -> String {
    match normalize_url(url) {
        Ok(normalized) => normalized.to_string(),
        Err(_) => url.trim_end_matches('/').to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: &str = "https://docs.example.com/a";
    const B: &str = "https://docs.example.com/b";
    const C: &str = "https://docs.example.com/c";

    #[test]
    fn test_no_edges_returns_input() {
        let tracker = RedirectTracker::new();
        assert_eq!(tracker.resolve_chain(A), A);
        assert_eq!(tracker.resolve_chain(&format!("{}/", A)), A);
    }

    #[test]
    fn test_chain_resolves_to_end() {
        let mut tracker = RedirectTracker::new();
        tracker.record(A, B);
        tracker.record(B, C);
        assert_eq!(tracker.resolve_chain(A), C);
        assert_eq!(tracker.resolve_chain(B), C);
        assert_eq!(tracker.resolve_chain(C), C);
    }

    #[test]
    fn test_two_cycle_stops_before_repeat() {
        let mut tracker = RedirectTracker::new();
        tracker.record(A, B);
        tracker.record(B, A);
        assert_eq!(tracker.resolve_chain(A), B);
        assert_eq!(tracker.resolve_chain(B), A);
    }

    #[test]
    fn test_self_loop() {
        let mut tracker = RedirectTracker::new();
        tracker.record(A, &format!("{}/", A));
        assert_eq!(tracker.resolve_chain(A), A);
    }

    #[test]
    fn test_trailing_slash_variants_are_tried() {
        let mut tracker = RedirectTracker::new();
        tracker.edges.insert(format!("{}/", A), B.to_string());
        tracker.edges.insert(B.to_string(), format!("{}/", C));
        assert_eq!(tracker.resolve_chain(A), C);
    }

    #[test]
    fn test_record_reports_replaced_target() {
        let mut tracker = RedirectTracker::new();
        assert_eq!(tracker.record(A, B), None);
        assert_eq!(tracker.record(A, B), None);
        assert_eq!(tracker.record(A, C), Some(B.to_string()));
        assert_eq!(tracker.len(), 1);
        assert_eq!(tracker.resolve_chain(A), C);
    }

    #[test]
    fn test_long_cycle_terminates() {
        let mut tracker = RedirectTracker::new();
        let urls: Vec<String> = (0..500)
            .map(|i| format!("https://docs.example.com/p{}", i))
            .collect();
        for pair in urls.windows(2) {
            tracker.record(&pair[0], &pair[1]);
        }
        tracker.record(&urls[499], &urls[0]);

        assert_eq!(tracker.resolve_chain(&urls[0]), urls[499]);
    }

    #[test]
    fn test_from_edges() {
        let tracker = RedirectTracker::from_edges(vec![
            RedirectEdge::new(A, B),
            RedirectEdge::new(B, C),
        ]);
        assert!(tracker.is_redirect_source(&format!("{}/", A)));
        assert_eq!(tracker.resolve_chain(A), C);
    }
}
