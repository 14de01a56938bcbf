//! Output module for the mirrored document tree
//!
//! This module handles:
//! - Planning output paths from URLs and page titles
//! - Writing documents atomically under the mirror root
//! - Generating folder notes and the root table of contents
//! - Redirect stubs for redirected URLs
//! - Statistics and the Markdown run report

mod index;
mod paths;
mod report;
pub mod stats;
mod stubs;
mod writer;

pub use index::{
    parent_dir, plan_folder_notes, render_table_of_contents, FolderNote, TOC_PATH,
};
pub use paths::{
    clean_filename, folder_for, plan_output_path, slug_to_title, INDEX_STEM, MAX_NAME_CHARS,
};
pub use report::RunReport;
pub use stats::{load_statistics, print_statistics, CrawlStatistics};
pub use stubs::RedirectStub;
pub use writer::{DocumentSink, FsDocumentSink};

use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Refusing to write outside the mirror root: {0:?}")]
    InvalidPath(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;
