//! Output-path planning
//!
//! A page at `<root>/getting-started/install-the-cli` with title
//! "Installing the CLI" lands at `Getting Started/Installing the CLI.md`:
//! directories come from the URL segments below the crawl root, the file name
//! from the page title. The state store adds `_N` suffixes on collisions.

use crate::url::CrawlScope;
use url::Url;

/// Longest file or directory name emitted, in characters
pub const MAX_NAME_CHARS: usize = 100;

/// Reserved stem for folder notes and the table of contents
pub const INDEX_STEM: &str = "index";

const SMALL_WORDS: &[&str] = &[
    "a", "an", "and", "as", "at", "by", "for", "from", "in", "is", "of", "on", "or", "the", "to",
    "with",
];

/// Turns a URL slug into a display title
///
/// Words split on `-` and `_`; every word is capitalized except the small
/// words in the middle of the title.
///
/// # Examples
///
/// ```
/// use docmirror::output::slug_to_title;
///
/// assert_eq!(slug_to_title("getting-started-with-the-cli"), "Getting Started with the Cli");
/// ```
pub fn slug_to_title(slug: &str) -> String {
    let slug = strip_page_extension(slug);
    slug.split(['-', '_'])
        .filter(|w| !w.is_empty())
        .enumerate()
        .map(|(i, word)| {
            let lower = word.to_lowercase();
            if i > 0 && SMALL_WORDS.contains(&lower.as_str()) {
                lower
            } else {
                capitalize(&lower)
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn strip_page_extension(segment: &str) -> &str {
    for ext in [".html", ".htm", ".php", ".aspx"] {
        if let Some(stripped) = segment.strip_suffix(ext) {
            return stripped;
        }
    }
    segment
}

/// Makes `name` safe as a single path component
///
/// Drops characters that are invalid on common filesystems or that break
/// wikilink syntax, maps path separators to `-`, collapses whitespace and
/// truncates to `MAX_NAME_CHARS`.
pub fn clean_filename(name: &str) -> String {
    let mapped: String = name
        .chars()
        .filter(|c| !matches!(c, '<' | '>' | ':' | '"' | '|' | '?' | '*' | '#' | '[' | ']' | '^'))
        .filter(|c| !c.is_control())
        .map(|c| if c == '/' || c == '\\' { '-' } else { c })
        .collect();

    let collapsed = mapped.split_whitespace().collect::<Vec<_>>().join(" ");
    let truncated: String = collapsed.chars().take(MAX_NAME_CHARS).collect();
    let trimmed = truncated.trim_matches(|c: char| c == '.' || c.is_whitespace());

    if trimmed.is_empty() {
        "Untitled".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Directory components for a URL, one per segment above the page itself
pub fn directory_components(segments: &[String]) -> Vec<String> {
    match segments.split_last() {
        Some((_, dirs)) => dirs
            .iter()
            .map(|s| clean_filename(&slug_to_title(s)))
            .collect(),
        None => Vec::new(),
    }
}

/// Directory a category URL's children are written into
pub fn folder_for(scope: &CrawlScope, url: &Url) -> Option<String> {
    let segments = scope.relative_segments(url)?;
    if segments.is_empty() {
        return None;
    }
    Some(
        segments
            .iter()
            .map(|s| clean_filename(&slug_to_title(s)))
            .collect::<Vec<_>>()
            .join("/"),
    )
}

/// Plans the desired output path for a page
///
/// The result is a `/`-separated path relative to the mirror root ending in
/// `.md`. It is a wish, not a reservation: uniqueness is enforced by the state
/// store when the path is reserved.
pub fn plan_output_path(scope: &CrawlScope, url: &Url, title: Option<&str>) -> String {
    let segments = scope.relative_segments(url).unwrap_or_else(|| {
        url.path_segments()
            .map(|s| s.filter(|p| !p.is_empty()).map(|p| p.to_string()).collect())
            .unwrap_or_default()
    });

    let stem = title
        .map(clean_filename)
        .filter(|t| t != "Untitled")
        .or_else(|| segments.last().map(|s| clean_filename(&slug_to_title(s))))
        .unwrap_or_else(|| "Home".to_string());

    let stem = if stem.eq_ignore_ascii_case(INDEX_STEM) {
        format!("{} Page", stem)
    } else {
        stem
    };

    let mut parts = directory_components(&segments);
    parts.push(format!("{}.md", stem));
    parts.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope() -> CrawlScope {
        CrawlScope::new("https://docs.example.com/product", &[]).unwrap()
    }

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_slug_to_title() {
        assert_eq!(slug_to_title("getting-started"), "Getting Started");
        assert_eq!(slug_to_title("the-guide-to_the-api"), "The Guide to the Api");
        assert_eq!(slug_to_title("install.html"), "Install");
        assert_eq!(slug_to_title(""), "");
    }

    #[test]
    fn test_clean_filename() {
        assert_eq!(clean_filename("What is X?"), "What is X");
        assert_eq!(clean_filename("A/B \\ C"), "A-B - C");
        assert_eq!(clean_filename("  [Beta]  Feature: one|two "), "Beta Feature onetwo");
        assert_eq!(clean_filename("..."), "Untitled");

        let long = "x".repeat(150);
        assert_eq!(clean_filename(&long).chars().count(), MAX_NAME_CHARS);
    }

    #[test]
    fn test_plan_uses_title_and_url_directories() {
        let path = plan_output_path(
            &scope(),
            &url("https://docs.example.com/product/getting-started/install-cli"),
            Some("Installing the CLI"),
        );
        assert_eq!(path, "Getting Started/Installing the CLI.md");
    }

    #[test]
    fn test_plan_without_title_uses_slug() {
        let path = plan_output_path(
            &scope(),
            &url("https://docs.example.com/product/admin/user-roles"),
            None,
        );
        assert_eq!(path, "Admin/User Roles.md");
    }

    #[test]
    fn test_plan_root_page() {
        let path = plan_output_path(&scope(), &url("https://docs.example.com/product"), None);
        assert_eq!(path, "Home.md");

        let titled = plan_output_path(
            &scope(),
            &url("https://docs.example.com/product"),
            Some("Product Docs"),
        );
        assert_eq!(titled, "Product Docs.md");
    }

    #[test]
    fn test_plan_avoids_index_stem() {
        let path = plan_output_path(
            &scope(),
            &url("https://docs.example.com/product/guide/index"),
            Some("Index"),
        );
        assert_eq!(path, "Guide/Index Page.md");
    }

    #[test]
    fn test_folder_for() {
        assert_eq!(
            folder_for(&scope(), &url("https://docs.example.com/product/admin/user-roles")),
            Some("Admin/User Roles".to_string())
        );
        assert_eq!(folder_for(&scope(), &url("https://docs.example.com/product")), None);
    }
}
