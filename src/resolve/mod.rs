//! Link resolution
//!
//! After the crawl, every document still links to absolute URLs. The resolver
//! rewrites each internal link into a relative wikilink to the document that
//! holds the content, following recorded redirects first:
//!
//! 1. Follow the redirect chain from the link target
//! 2. Direct hit in the URL index: relative path to that document
//! 3. Category URL with a folder note: relative path to the note
//! 4. A page whose title equals the link text: reference by file name
//! 5. Otherwise leave the link as written and report it
//!
//! Links to other hosts are never touched. Rewriting is idempotent: links
//! already in resolved form are recognized and left alone.

mod index;
mod paths;
mod probe;
mod scanner;

pub use index::{IndexEntry, PathIndex};
pub use paths::{join_relative, relative_path, strip_extension, DOC_EXTENSION};
pub use probe::{probe_targets, HttpLinkProbe, LinkProbe};
pub use scanner::{link_targets, rewrite_links, LinkRef};

use crate::output::{clean_filename, slug_to_title, DocumentSink, OutputError, OutputResult};
use crate::redirect::RedirectTracker;
use crate::url::{normalize_url, CrawlScope};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};
use url::Url;

/// A link the resolver could not map to a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedLink {
    /// Document containing the link
    pub document: String,
    /// Redirect-resolved target URL, or the wikilink target as written
    pub target: String,
    pub text: String,
}

/// Counters collected while resolving
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionReport {
    pub documents: usize,
    pub documents_changed: usize,
    pub links_resolved: usize,
    /// Resolved links whose target redirected
    pub via_redirect: usize,
    pub via_folder_note: usize,
    pub via_title: usize,
    pub slugs_repaired: usize,
    pub unresolved: Vec<UnresolvedLink>,
}

impl ResolutionReport {
    /// Distinct unresolved internal URLs
    pub fn unresolved_urls(&self) -> Vec<String> {
        self.unresolved
            .iter()
            .filter(|link| link.target.contains("://"))
            .map(|link| link.target.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

enum Via {
    Direct,
    FolderNote,
    Title,
}

/// Rewrites internal links into relative wikilinks
#[derive(Debug, Clone)]
pub struct LinkResolver {
    scope: CrawlScope,
    index: PathIndex,
    tracker: RedirectTracker,
}

impl LinkResolver {
    pub fn new(scope: CrawlScope, index: PathIndex, tracker: RedirectTracker) -> Self {
        Self {
            scope,
            index,
            tracker,
        }
    }

    /// Rewrites the links of one document
    ///
    /// # Arguments
    ///
    /// * `text` - Markdown text of the document
    /// * `current_path` - Output path of the document, relative to the mirror root
    pub fn resolve(&self, text: &str, current_path: &str) -> String {
        let mut report = ResolutionReport::default();
        self.resolve_with_report(text, current_path, &mut report)
    }

    /// `resolve`, accumulating counters into `report`
    pub fn resolve_with_report(
        &self,
        text: &str,
        current_path: &str,
        report: &mut ResolutionReport,
    ) -> String {
        rewrite_links(text, |link| match link {
            LinkRef::Markdown { text, target } => {
                self.resolve_markdown(text, target, current_path, report)
            }
            LinkRef::Wiki { target, text } => self.resolve_wiki(target, text, current_path, report),
        })
    }

    /// Resolves every listed document in place
    ///
    /// Documents are only rewritten when a link changed. Missing documents
    /// are logged and skipped.
    pub fn resolve_documents(
        &self,
        sink: &dyn DocumentSink,
        paths: &[String],
    ) -> OutputResult<ResolutionReport> {
        let mut report = ResolutionReport::default();

        for path in paths {
            let text = match sink.read(path) {
                Ok(text) => text,
                Err(OutputError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                    warn!("Document {} is missing, skipping link resolution", path);
                    continue;
                }
                Err(e) => return Err(e),
            };

            report.documents += 1;
            let rewritten = self.resolve_with_report(&text, path, &mut report);
            if rewritten != text {
                sink.write(path, &rewritten)?;
                report.documents_changed += 1;
            }
        }

        info!(
            "Resolved {} links in {} documents ({} rewritten), {} unresolved",
            report.links_resolved,
            report.documents,
            report.documents_changed,
            report.unresolved.len()
        );
        Ok(report)
    }

    fn resolve_markdown(
        &self,
        text: &str,
        target: &str,
        current_path: &str,
        report: &mut ResolutionReport,
    ) -> Option<String> {
        let url = self.absolute_target(target, current_path)?;
        self.resolve_url(&url, text, current_path, report)
    }

    /// Parses a link target, resolving relative targets against the
    /// document's source URL; `None` for anything that is not an internal
    /// http(s) URL
    fn absolute_target(&self, target: &str, current_path: &str) -> Option<Url> {
        let target = target.trim();
        if target.is_empty() || target.starts_with('#') {
            return None;
        }

        let url = match Url::parse(target) {
            Ok(url) => url,
            Err(_) => {
                let base = self.index.url_for_path(current_path)?;
                Url::parse(base).ok()?.join(target).ok()?
            }
        };

        if url.scheme() != "http" && url.scheme() != "https" {
            return None;
        }
        if !self.scope.is_internal(&url) {
            return None;
        }
        Some(url)
    }

    fn resolve_url(
        &self,
        url: &Url,
        text: &str,
        current_path: &str,
        report: &mut ResolutionReport,
    ) -> Option<String> {
        let fragment = url.fragment().filter(|f| !f.is_empty()).map(|f| f.to_string());
        let normalized = normalize_url(url.as_str()).ok()?.to_string();
        let final_url = self.tracker.resolve_chain(&normalized);

        let Some((link_target, via)) = self.locate(&final_url, text, current_path) else {
            debug!("Unresolved link in {}: {}", current_path, final_url);
            report.unresolved.push(UnresolvedLink {
                document: current_path.to_string(),
                target: final_url,
                text: text.to_string(),
            });
            return None;
        };

        report.links_resolved += 1;
        if final_url != normalized {
            report.via_redirect += 1;
        }
        match via {
            Via::Direct => {}
            Via::FolderNote => report.via_folder_note += 1,
            Via::Title => report.via_title += 1,
        }

        Some(wikilink(&link_target, fragment.as_deref(), Some(text)))
    }

    fn locate(&self, url: &str, text: &str, current_path: &str) -> Option<(String, Via)> {
        if let Some(entry) = self.index.lookup(url) {
            return Some((relative_path(current_path, &entry.path), Via::Direct));
        }

        if let Some(note) = self.index.folder_note(url) {
            return Some((relative_path(current_path, note), Via::FolderNote));
        }

        let text = text.trim();
        if text.chars().count() > 3 {
            if let Some(path) = self.index.by_title(text) {
                return Some((self.short_reference(current_path, path), Via::Title));
            }
        }

        None
    }

    /// Bare file name when it identifies `path` unambiguously, else a relative path
    fn short_reference(&self, current_path: &str, path: &str) -> String {
        let bare = strip_extension(path);
        let stem = bare.rsplit('/').next().unwrap_or(bare);
        if self.index.by_stem(stem) == Some(path) {
            stem.to_string()
        } else {
            relative_path(current_path, path)
        }
    }

    fn resolve_wiki(
        &self,
        target: &str,
        text: Option<&str>,
        current_path: &str,
        report: &mut ResolutionReport,
    ) -> Option<String> {
        let (path_part, fragment) = match target.split_once('#') {
            Some((path, fragment)) => (path.trim(), Some(fragment)),
            None => (target.trim(), None),
        };

        // Provisional wikilinks that still carry an absolute URL
        if path_part.contains("://") {
            let url = self.absolute_target(target, current_path)?;
            return self.resolve_url(&url, text.unwrap_or(path_part), current_path, report);
        }

        if path_part.is_empty() || self.is_resolved_reference(current_path, path_part) {
            return None;
        }

        let slug = path_part.rsplit('/').next().unwrap_or(path_part);
        let title = slug_to_title(slug);
        let repaired = self
            .index
            .by_stem(slug)
            .or_else(|| self.index.by_stem(&clean_filename(&title)))
            .or_else(|| self.index.by_title(&title));

        match repaired {
            Some(path) => {
                report.slugs_repaired += 1;
                report.links_resolved += 1;
                Some(wikilink(
                    &relative_path(current_path, path),
                    fragment,
                    text,
                ))
            }
            None => {
                report.unresolved.push(UnresolvedLink {
                    document: current_path.to_string(),
                    target: target.to_string(),
                    text: text.unwrap_or("").to_string(),
                });
                None
            }
        }
    }

    /// True when `reference` already names a known document from `current_path`
    fn is_resolved_reference(&self, current_path: &str, reference: &str) -> bool {
        if join_relative(current_path, reference)
            .map_or(false, |path| self.index.contains_path(&path))
        {
            return true;
        }

        // Title fallbacks emit the bare file name
        !reference.contains('/')
            && self
                .index
                .by_stem(reference)
                .map_or(false, |path| strip_extension(path).rsplit('/').next() == Some(reference))
    }
}

/// Formats `[[target#fragment|label]]`, dropping a label equal to the target
fn wikilink(target: &str, fragment: Option<&str>, label: Option<&str>) -> String {
    let mut link = target.to_string();
    if let Some(fragment) = fragment.filter(|f| !f.is_empty()) {
        link.push('#');
        link.push_str(fragment);
    }

    let label = label
        .map(|l| {
            l.replace("\\]", "]")
                .replace('[', "(")
                .replace(']', ")")
                .replace('|', "-")
        })
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty() && *l != link);

    match label {
        Some(label) => format!("[[{}|{}]]", link, label),
        None => format!("[[{}]]", link),
    }
}
