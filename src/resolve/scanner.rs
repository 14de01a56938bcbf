//! Markdown link scanner
//!
//! Finds `[text](target)` links and `[[target|text]]` wikilinks outside of
//! frontmatter, fenced code blocks and inline code spans. Image links are
//! never reported.

use regex::{Captures, Regex};
use std::sync::LazyLock;

static LINK_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"\[\[([^\[\]|]+)(?:\|([^\[\]]*))?\]\]|(!?)\[((?:\\\]|[^\]])*)\]\(<?([^()\s<>]+)>?(?:\s+"[^"]*")?\)"#,
    )
    .expect("link pattern is valid")
});

/// A link found in Markdown text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkRef<'a> {
    /// `[text](target)`
    Markdown { text: &'a str, target: &'a str },

    /// `[[target]]` or `[[target|text]]`
    Wiki {
        target: &'a str,
        text: Option<&'a str>,
    },
}

/// Rewrites every link in `text` through `rewrite`
///
/// `rewrite` returns the replacement for a link, or `None` to keep the link
/// exactly as written. Everything that is not a link passes through
/// unchanged, so a rewrite that keeps every link returns `text` verbatim.
pub fn rewrite_links<F>(text: &str, mut rewrite: F) -> String
where
    F: FnMut(LinkRef<'_>) -> Option<String>,
{
    let mut out = String::with_capacity(text.len());
    let mut fence: Option<String> = None;
    let mut in_frontmatter = false;

    for (line_no, line) in text.split_inclusive('\n').enumerate() {
        let trimmed = line.trim();

        if line_no == 0 && trimmed == "---" {
            in_frontmatter = true;
            out.push_str(line);
            continue;
        }
        if in_frontmatter {
            if trimmed == "---" {
                in_frontmatter = false;
            }
            out.push_str(line);
            continue;
        }

        if let Some(marker) = &fence {
            if trimmed.starts_with(marker.as_str()) {
                fence = None;
            }
            out.push_str(line);
            continue;
        }
        if let Some(marker) = fence_marker(trimmed) {
            fence = Some(marker);
            out.push_str(line);
            continue;
        }

        rewrite_line(line, &mut rewrite, &mut out);
    }

    out
}

fn fence_marker(trimmed: &str) -> Option<String> {
    for ch in ['`', '~'] {
        let run = trimmed.chars().take_while(|c| *c == ch).count();
        if run >= 3 {
            return Some(std::iter::repeat(ch).take(run).collect());
        }
    }
    None
}

/// Rewrites links in one line, leaving inline code spans alone
fn rewrite_line<F>(line: &str, rewrite: &mut F, out: &mut String)
where
    F: FnMut(LinkRef<'_>) -> Option<String>,
{
    for (i, segment) in line.split('`').enumerate() {
        if i > 0 {
            out.push('`');
        }
        // Odd segments sit between backticks
        if i % 2 == 1 {
            out.push_str(segment);
            continue;
        }

        let replaced = LINK_PATTERN.replace_all(segment, |caps: &Captures<'_>| {
            let whole = caps.get(0).map(|m| m.as_str()).unwrap_or("");
            match link_from_captures(caps) {
                Some(link) => rewrite(link).unwrap_or_else(|| whole.to_string()),
                None => whole.to_string(),
            }
        });
        out.push_str(&replaced);
    }
}

fn link_from_captures<'a>(caps: &Captures<'a>) -> Option<LinkRef<'a>> {
    if let Some(target) = caps.get(1) {
        return Some(LinkRef::Wiki {
            target: target.as_str(),
            text: caps.get(2).map(|m| m.as_str()),
        });
    }

    if caps.get(3).map_or(false, |m| m.as_str() == "!") {
        return None;
    }
    Some(LinkRef::Markdown {
        text: caps.get(4)?.as_str(),
        target: caps.get(5)?.as_str(),
    })
}

/// Targets of every `[text](target)` link in `text`, in order
pub fn link_targets(text: &str) -> Vec<String> {
    let mut targets = Vec::new();
    rewrite_links(text, |link| {
        if let LinkRef::Markdown { target, .. } = link {
            targets.push(target.to_string());
        }
        None
    });
    targets
}
