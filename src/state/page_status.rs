/// Page status definitions for tracking crawl progress
///
/// This module defines every status a page record can hold and the legal
/// transitions between them.
use std::fmt;

/// Represents the current status of a page in the crawl process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageStatus {
    // ===== Active States =====
    /// Page has been discovered and is waiting to be fetched
    Discovered,

    /// A worker holds this page and is fetching it
    InProgress,

    // ===== Terminal States =====
    /// Page was fetched and its document written
    Completed,

    /// Page fetch failed; retryable until its attempt budget is spent
    Failed,

    /// Page answered with a redirect; its content lives at another URL
    Redirected,
}

impl PageStatus {
    /// Returns true if this is an active state (page may still be fetched)
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Discovered | Self::InProgress)
    }

    /// Returns true if this is a terminal state
    ///
    /// `Failed` counts as terminal here; whether a failed page gets another
    /// attempt is decided by its attempt count and permanence, not its status.
    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }

    /// Returns true if a page may move from `self` to `next`
    ///
    /// Transitions only move forward through
    /// Discovered -> InProgress -> {Completed, Failed}, with two exceptions:
    /// Failed -> InProgress (a retry) and any -> Redirected.
    pub fn can_transition_to(&self, next: PageStatus) -> bool {
        use PageStatus::*;
        match (self, next) {
            (_, Redirected) => true,
            (Discovered, InProgress) => true,
            (InProgress, Completed) | (InProgress, Failed) => true,
            // Interrupted work is handed back to the queue on restart.
            (InProgress, Discovered) => true,
            (Failed, InProgress) => true,
            _ => false,
        }
    }

    /// Converts the status to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Discovered => "discovered",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Redirected => "redirected",
        }
    }

    /// Parses a status from its database string representation
    ///
    /// Returns None if the string doesn't match any known status.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "discovered" => Some(Self::Discovered),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "redirected" => Some(Self::Redirected),
            _ => None,
        }
    }

    /// Returns all possible page statuses
    pub fn all() -> [Self; 5] {
        [
            Self::Discovered,
            Self::InProgress,
            Self::Completed,
            Self::Failed,
            Self::Redirected,
        ]
    }
}

impl fmt::Display for PageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_active() {
        assert!(PageStatus::Discovered.is_active());
        assert!(PageStatus::InProgress.is_active());

        assert!(!PageStatus::Completed.is_active());
        assert!(!PageStatus::Failed.is_active());
        assert!(!PageStatus::Redirected.is_active());
    }

    #[test]
    fn test_forward_transitions() {
        assert!(PageStatus::Discovered.can_transition_to(PageStatus::InProgress));
        assert!(PageStatus::InProgress.can_transition_to(PageStatus::Completed));
        assert!(PageStatus::InProgress.can_transition_to(PageStatus::Failed));
    }

    #[test]
    fn test_retry_is_the_only_way_back() {
        assert!(PageStatus::Failed.can_transition_to(PageStatus::InProgress));
        assert!(!PageStatus::Failed.can_transition_to(PageStatus::Discovered));
        assert!(!PageStatus::Completed.can_transition_to(PageStatus::InProgress));
        assert!(!PageStatus::Completed.can_transition_to(PageStatus::Failed));
        assert!(!PageStatus::Discovered.can_transition_to(PageStatus::Completed));
    }

    #[test]
    fn test_anything_may_redirect() {
        for status in PageStatus::all() {
            assert!(status.can_transition_to(PageStatus::Redirected));
        }
    }

    #[test]
    fn test_redirected_is_final() {
        assert!(!PageStatus::Redirected.can_transition_to(PageStatus::InProgress));
        assert!(!PageStatus::Redirected.can_transition_to(PageStatus::Completed));
    }

    #[test]
    fn test_roundtrip_db_string() {
        for status in PageStatus::all() {
            let db_str = status.to_db_string();
            assert_eq!(Some(status), PageStatus::from_db_string(db_str));
        }
        assert_eq!(PageStatus::from_db_string("processed"), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", PageStatus::InProgress), "in_progress");
    }
}
