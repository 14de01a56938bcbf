//! HTML content processing
//!
//! This module turns a fetched HTML page into:
//! - The page title (first `<h1>`, falling back to `<title>`)
//! - Links to follow (absolute, normalized, deduplicated)
//! - A Markdown rendering of the main content
//!
//! Links in the Markdown keep their absolute URLs, `[text](https://...)`.
//! Rewriting them into relative wikilinks is the link resolver's job once
//! every page has an output path.

use crate::url::{normalize_url, resolve_href};
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use url::Url;

/// Extracted information from an HTML page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessedPage {
    pub title: Option<String>,

    /// All crawlable links found on the page, in document order
    pub links: Vec<Url>,

    /// Markdown body without frontmatter
    pub markdown: String,
}

impl ProcessedPage {
    /// Full document text: YAML frontmatter followed by the body
    pub fn to_document(&self, source_url: &str) -> String {
        let mut doc = String::from("---\n");
        if let Some(title) = &self.title {
            doc.push_str(&format!("title: \"{}\"\n", yaml_escape(title)));
        }
        doc.push_str(&format!("url: \"{}\"\n", yaml_escape(source_url)));
        doc.push_str("---\n\n");

        if let Some(title) = &self.title {
            if !self.markdown.starts_with("# ") {
                doc.push_str(&format!("# {}\n\n", title));
            }
        }
        doc.push_str(self.markdown.trim_end());
        doc.push('\n');
        doc
    }
}

fn yaml_escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Converts fetched page bodies into documents
pub trait ContentProcessor: Send + Sync {
    fn process(&self, url: &Url, html: &str) -> ProcessedPage;
}

/// scraper-based HTML to Markdown processor
#[derive(Debug, Clone, Default)]
pub struct HtmlContentProcessor;

impl HtmlContentProcessor {
    pub fn new() -> Self {
        Self
    }
}

impl ContentProcessor for HtmlContentProcessor {
    fn process(&self, url: &Url, html: &str) -> ProcessedPage {
        let document = Html::parse_document(html);

        let title = extract_title(&document);
        let links = extract_links(&document, url);

        let mut markdown = String::new();
        if let Some(root) = content_root(&document) {
            render_blocks(root, url, &mut markdown);
        }

        ProcessedPage {
            title,
            links,
            markdown,
        }
    }
}

/// Extracts the page title: first non-empty `<h1>`, then `<title>`
fn extract_title(document: &Html) -> Option<String> {
    ["h1", "title"].iter().find_map(|tag| {
        let selector = Selector::parse(tag).ok()?;
        document
            .select(&selector)
            .map(|element| collapse_whitespace(&element.text().collect::<String>()))
            .find(|s| !s.is_empty())
    })
}

/// Extracts all crawlable links from the document
///
/// Skips `download` anchors, fragment-only and non-http(s) hrefs.
fn extract_links(document: &Html, base_url: &Url) -> Vec<Url> {
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    if let Ok(a_selector) = Selector::parse("a[href]") {
        for element in document.select(&a_selector) {
            if element.value().attr("download").is_some() {
                continue;
            }

            if let Some(href) = element.value().attr("href") {
                if let Some(absolute_url) = resolve_href(base_url, href) {
                    if seen.insert(absolute_url.to_string()) {
                        links.push(absolute_url);
                    }
                }
            }
        }
    }

    links
}

/// Picks the element holding the page's main content
fn content_root(document: &Html) -> Option<ElementRef<'_>> {
    ["main", "article", "[role=main]", "body"]
        .iter()
        .find_map(|sel| {
            let selector = Selector::parse(sel).ok()?;
            document.select(&selector).next()
        })
}

const SKIPPED: &[&str] = &[
    "script", "style", "nav", "header", "footer", "aside", "noscript", "svg", "form", "button",
    "template", "iframe",
];

const INLINE: &[&str] = &[
    "a", "abbr", "b", "br", "cite", "code", "em", "i", "img", "kbd", "mark", "q", "s", "small",
    "span", "strong", "sub", "sup", "time", "u", "var",
];

fn render_blocks(element: ElementRef<'_>, base: &Url, out: &mut String) {
    let mut pending = String::new();

    for child in element.children() {
        if let Some(child_el) = ElementRef::wrap(child) {
            let name = child_el.value().name();
            if SKIPPED.contains(&name) {
                continue;
            }
            if INLINE.contains(&name) {
                render_inline_element(child_el, base, &mut pending);
                continue;
            }

            flush_paragraph(&mut pending, out);
            render_block(child_el, name, base, out);
        } else if let Some(text) = child.value().as_text() {
            pending.push_str(text);
        }
    }

    flush_paragraph(&mut pending, out);
}

fn render_block(element: ElementRef<'_>, name: &str, base: &Url, out: &mut String) {
    match name {
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
            let level = name[1..].parse::<usize>().unwrap_or(1);
            let text = render_inline(element, base);
            if !text.is_empty() {
                push_block(out, &format!("{} {}", "#".repeat(level), text));
            }
        }
        "p" => {
            let text = render_inline(element, base);
            if !text.is_empty() {
                push_block(out, &text);
            }
        }
        "pre" => {
            let code: String = element.text().collect();
            let language = Selector::parse("code")
                .ok()
                .and_then(|selector| element.select(&selector).next())
                .and_then(|c| c.value().attr("class"))
                .and_then(|class| {
                    class
                        .split_whitespace()
                        .find_map(|c| c.strip_prefix("language-"))
                })
                .unwrap_or("");
            push_block(
                out,
                &format!("```{}\n{}\n```", language, code.trim_end_matches('\n')),
            );
        }
        "ul" | "ol" => {
            let ordered = name == "ol";
            let items: Vec<String> = element
                .children()
                .filter_map(ElementRef::wrap)
                .filter(|li| li.value().name() == "li")
                .enumerate()
                .map(|(i, li)| {
                    let marker = if ordered {
                        format!("{}.", i + 1)
                    } else {
                        "-".to_string()
                    };
                    format!("{} {}", marker, render_inline(li, base))
                })
                .collect();
            if !items.is_empty() {
                push_block(out, &items.join("\n"));
            }
        }
        "blockquote" => {
            let mut inner = String::new();
            render_blocks(element, base, &mut inner);
            let quoted: Vec<String> = inner
                .trim()
                .lines()
                .map(|line| format!("> {}", line).trim_end().to_string())
                .collect();
            if !quoted.is_empty() {
                push_block(out, &quoted.join("\n"));
            }
        }
        "table" => render_table(element, base, out),
        "hr" => push_block(out, "---"),
        _ => render_blocks(element, base, out),
    }
}

fn render_table(table: ElementRef<'_>, base: &Url, out: &mut String) {
    let Ok(row_selector) = Selector::parse("tr") else {
        return;
    };

    let rows: Vec<Vec<String>> = table
        .select(&row_selector)
        .map(|row| {
            row.children()
                .filter_map(ElementRef::wrap)
                .filter(|cell| matches!(cell.value().name(), "td" | "th"))
                .map(|cell| render_inline(cell, base).replace('|', "\\|"))
                .collect::<Vec<_>>()
        })
        .filter(|cells| !cells.is_empty())
        .collect();

    let Some(width) = rows.iter().map(|r| r.len()).max() else {
        return;
    };

    let mut lines = Vec::with_capacity(rows.len() + 1);
    for (i, row) in rows.iter().enumerate() {
        let mut cells = row.clone();
        cells.resize(width, String::new());
        lines.push(format!("| {} |", cells.join(" | ")));
        if i == 0 {
            lines.push(format!("|{}", " --- |".repeat(width)));
        }
    }
    push_block(out, &lines.join("\n"));
}

/// Renders an element's inline content as one line of Markdown
fn render_inline(element: ElementRef<'_>, base: &Url) -> String {
    let mut buf = String::new();
    render_inline_children(element, base, &mut buf);
    collapse_whitespace(&buf)
}

fn render_inline_children(element: ElementRef<'_>, base: &Url, buf: &mut String) {
    for child in element.children() {
        if let Some(child_el) = ElementRef::wrap(child) {
            if SKIPPED.contains(&child_el.value().name()) {
                continue;
            }
            render_inline_element(child_el, base, buf);
        } else if let Some(text) = child.value().as_text() {
            buf.push_str(text);
        }
    }
}

fn render_inline_element(element: ElementRef<'_>, base: &Url, buf: &mut String) {
    match element.value().name() {
        "a" => {
            let text = render_inline(element, base);
            match element.value().attr("href").and_then(|h| link_target(base, h)) {
                Some(target) if !text.is_empty() => {
                    buf.push_str(&format!("[{}]({})", text.replace(']', "\\]"), target))
                }
                _ => buf.push_str(&text),
            }
        }
        "code" | "kbd" => {
            let text: String = element.text().collect();
            let text = collapse_whitespace(&text);
            if !text.is_empty() {
                buf.push_str(&format!("`{}`", text));
            }
        }
        "strong" | "b" => wrap_inline(element, base, "**", buf),
        "em" | "i" => wrap_inline(element, base, "*", buf),
        "br" => buf.push(' '),
        "img" => {
            let alt = element.value().attr("alt").unwrap_or("");
            if let Some(src) = element
                .value()
                .attr("src")
                .and_then(|src| base.join(src).ok())
            {
                buf.push_str(&format!("![{}]({})", alt, src));
            }
        }
        _ => render_inline_children(element, base, buf),
    }
}

fn wrap_inline(element: ElementRef<'_>, base: &Url, marker: &str, buf: &mut String) {
    let text = render_inline(element, base);
    if !text.is_empty() {
        buf.push_str(&format!("{}{}{}", marker, text, marker));
    }
}

/// Absolute link target for an href, fragment preserved
///
/// In-page anchors and non-http(s) schemes are kept verbatim.
fn link_target(base: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with("javascript:") {
        return None;
    }
    if href.starts_with('#') {
        return Some(href.to_string());
    }

    let joined = base.join(href).ok()?;
    if joined.scheme() != "http" && joined.scheme() != "https" {
        return Some(href.to_string());
    }

    let fragment = joined.fragment().map(|f| f.to_string());
    let mut normalized = normalize_url(joined.as_str()).ok()?;
    if let Some(fragment) = fragment.filter(|f| !f.is_empty()) {
        normalized.set_fragment(Some(&fragment));
    }
    Some(normalized.to_string())
}

fn flush_paragraph(pending: &mut String, out: &mut String) {
    let text = collapse_whitespace(pending);
    if !text.is_empty() {
        push_block(out, &text);
    }
    pending.clear();
}

fn push_block(out: &mut String, block: &str) {
    if !out.is_empty() {
        out.push_str("\n\n");
    }
    out.push_str(block);
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_url() -> Url {
        Url::parse("https://docs.example.com/product/guide").unwrap()
    }

    fn process(html: &str) -> ProcessedPage {
        HtmlContentProcessor::new().process(&base_url(), html)
    }

    #[test]
    fn test_title_prefers_h1() {
        let page = process(
            "<html><head><title>Guide | Docs</title></head><body><h1> Getting  Started </h1></body></html>",
        );
        assert_eq!(page.title, Some("Getting Started".to_string()));
    }

    #[test]
    fn test_title_falls_back_to_title_tag() {
        let page = process("<html><head><title>  Test Page  </title></head><body></body></html>");
        assert_eq!(page.title, Some("Test Page".to_string()));
    }

    #[test]
    fn test_no_title() {
        let page = process("<html><head></head><body><p>x</p></body></html>");
        assert_eq!(page.title, None);
    }

    #[test]
    fn test_links_are_normalized_and_deduplicated() {
        let page = process(
            r#"<html><body>
                <a href="/product/a/">A</a>
                <a href="/product/a#top">A again</a>
                <a href="b?utm_source=x">B</a>
                <a href="mailto:x@example.com">Mail</a>
                <a href="/file.zip" download>Zip</a>
                <a href="https://other.com/x">Other</a>
            </body></html>"#,
        );
        let links: Vec<String> = page.links.iter().map(|u| u.to_string()).collect();
        assert_eq!(
            links,
            vec![
                "https://docs.example.com/product/a",
                "https://docs.example.com/product/b",
                "https://other.com/x",
            ]
        );
    }

    #[test]
    fn test_markdown_keeps_absolute_links_with_fragment() {
        let page = process(
            r#"<html><body><main><p>See <a href="setup/#install">the setup</a> first.</p></main></body></html>"#,
        );
        assert_eq!(
            page.markdown,
            "See [the setup](https://docs.example.com/product/setup#install) first."
        );
    }

    #[test]
    fn test_markdown_structure() {
        let page = process(
            r#"<html><body>
                <nav><a href="/x">Nav</a></nav>
                <main>
                    <h1>Title</h1>
                    <p>Intro <strong>bold</strong> text.</p>
                    <h2>Steps</h2>
                    <ol><li>One</li><li>Two</li></ol>
                    <pre><code class="language-rust">fn main() {}
</code></pre>
                </main>
            </body></html>"#,
        );
        assert_eq!(
            page.markdown,
            "# Title\n\nIntro **bold** text.\n\n## Steps\n\n1. One\n2. Two\n\n```rust\nfn main() {}\n```"
        );
    }

    #[test]
    fn test_table() {
        let page = process(
            "<html><body><table><tr><th>Key</th><th>Value</th></tr><tr><td>a</td><td>1</td></tr></table></body></html>",
        );
        assert_eq!(page.markdown, "| Key | Value |\n| --- | --- |\n| a | 1 |");
    }

    #[test]
    fn test_document_frontmatter() {
        let page = ProcessedPage {
            title: Some("Say \"hi\"".to_string()),
            links: Vec::new(),
            markdown: "Body".to_string(),
        };
        let doc = page.to_document("https://docs.example.com/product/hi");
        assert_eq!(
            doc,
            "---\ntitle: \"Say \\\"hi\\\"\"\nurl: \"https://docs.example.com/product/hi\"\n---\n\n# Say \"hi\"\n\nBody\n"
        );
    }
}
