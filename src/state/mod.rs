//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `PageStatus`: the lifecycle of a single page record and its legal transitions
//! - `Session`: run-wide metadata (crawl root, start time, counters) passed by handle

mod page_status;
mod session;

// Re-export main types
pub use page_status::PageStatus;
pub use session::{keys as session_keys, Session, SessionSnapshot};
