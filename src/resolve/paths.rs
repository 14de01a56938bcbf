//! Relative path arithmetic over `/`-separated output paths
//!
//! Wikilink targets never carry the `.md` extension, so every function here
//! compares and emits paths without it.

/// Document extension of every output file
pub const DOC_EXTENSION: &str = ".md";

/// Drops a trailing `.md`
pub fn strip_extension(path: &str) -> &str {
    path.strip_suffix(DOC_EXTENSION).unwrap_or(path)
}

fn split_dir(path: &str) -> (Vec<&str>, &str) {
    let path = strip_extension(path);
    let mut parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
    let name = parts.pop().unwrap_or("");
    (parts, name)
}

/// Shortest relative reference from the document `from_file` to `to_file`
///
/// Same-directory targets yield the bare file name; every directory to climb
/// adds one `../`.
///
/// # Examples
///
/// ```
/// use docmirror::resolve::relative_path;
///
/// assert_eq!(relative_path("Guide/Intro.md", "Guide/Setup.md"), "Setup");
/// assert_eq!(relative_path("Guide/Intro.md", "Admin/Roles.md"), "../Admin/Roles");
/// assert_eq!(relative_path("Home.md", "Guide/Intro.md"), "Guide/Intro");
/// ```
pub fn relative_path(from_file: &str, to_file: &str) -> String {
    let (from_dir, _) = split_dir(from_file);
    let (to_dir, name) = split_dir(to_file);

    let common = from_dir
        .iter()
        .zip(to_dir.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut parts: Vec<&str> = Vec::new();
    parts.extend(std::iter::repeat("..").take(from_dir.len() - common));
    parts.extend(to_dir[common..].iter().copied());
    parts.push(name);
    parts.join("/")
}

/// Applies a relative reference found in `from_file`
///
/// Returns the referenced path without extension, or `None` when the
/// reference climbs above the mirror root.
pub fn join_relative(from_file: &str, reference: &str) -> Option<String> {
    let (mut parts, _) = split_dir(from_file);
    let reference = strip_extension(reference);

    for segment in reference.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            other => parts.push(other),
        }
    }

    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}
