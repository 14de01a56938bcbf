//! Document persistence
//!
//! Every document lands through a temp file in the destination directory
//! followed by a rename, so readers never observe a half-written file and an
//! interrupted run never leaves a truncated document behind.

use crate::output::{OutputError, OutputResult};
use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};

/// Stores documents under relative output paths
pub trait DocumentSink: Send + Sync {
    /// Writes `content` to `relative_path`, replacing any previous document
    fn write(&self, relative_path: &str, content: &str) -> OutputResult<()>;

    /// Reads the document at `relative_path`
    fn read(&self, relative_path: &str) -> OutputResult<String>;
}

/// Filesystem sink rooted at the mirror's output directory
#[derive(Debug, Clone)]
pub struct FsDocumentSink {
    root: PathBuf,
}

impl FsDocumentSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps a relative output path onto the root, rejecting escapes
    ///
    /// Absolute paths and any `..` component are refused.
    pub fn resolve(&self, relative_path: &str) -> OutputResult<PathBuf> {
        let relative = Path::new(relative_path);
        if relative_path.is_empty() {
            return Err(OutputError::InvalidPath(relative_path.to_string()));
        }

        for component in relative.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                _ => return Err(OutputError::InvalidPath(relative_path.to_string())),
            }
        }

        Ok(self.root.join(relative))
    }
}

impl DocumentSink for FsDocumentSink {
    fn write(&self, relative_path: &str, content: &str) -> OutputResult<()> {
        let target = self.resolve(relative_path)?;
        let parent = target
            .parent()
            .ok_or_else(|| OutputError::InvalidPath(relative_path.to_string()))?;
        fs::create_dir_all(parent)?;

        let file_name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| OutputError::InvalidPath(relative_path.to_string()))?;
        let temp = parent.join(format!(".{}.tmp", file_name));

        {
            let mut file = fs::File::create(&temp)?;
            file.write_all(content.as_bytes())?;
            file.sync_all()?;
        }

        if let Err(e) = fs::rename(&temp, &target) {
            let _ = fs::remove_file(&temp);
            return Err(e.into());
        }

        tracing::debug!("Wrote {}", target.display());
        Ok(())
    }

    fn read(&self, relative_path: &str) -> OutputResult<String> {
        let target = self.resolve(relative_path)?;
        Ok(fs::read_to_string(target)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_creates_directories() {
        let dir = TempDir::new().unwrap();
        let sink = FsDocumentSink::new(dir.path());

        sink.write("Guide/Getting Started.md", "# Hello\n").unwrap();

        let written = fs::read_to_string(dir.path().join("Guide/Getting Started.md")).unwrap();
        assert_eq!(written, "# Hello\n");
        assert_eq!(sink.read("Guide/Getting Started.md").unwrap(), "# Hello\n");
    }

    #[test]
    fn test_write_replaces_and_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let sink = FsDocumentSink::new(dir.path());

        sink.write("a.md", "one").unwrap();
        sink.write("a.md", "two").unwrap();

        assert_eq!(sink.read("a.md").unwrap(), "two");
        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_rejects_traversal() {
        let dir = TempDir::new().unwrap();
        let sink = FsDocumentSink::new(dir.path());

        assert!(matches!(
            sink.write("../escape.md", "x"),
            Err(OutputError::InvalidPath(_))
        ));
        assert!(matches!(
            sink.write("Guide/../../escape.md", "x"),
            Err(OutputError::InvalidPath(_))
        ));
        assert!(matches!(
            sink.write("/etc/passwd", "x"),
            Err(OutputError::InvalidPath(_))
        ));
        assert!(matches!(sink.write("", "x"), Err(OutputError::InvalidPath(_))));
    }
}
