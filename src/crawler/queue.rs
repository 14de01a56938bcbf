//! Shared work queue for the crawl workers
//!
//! The queue tracks how many items are in flight so that "empty" can be told
//! apart from "empty for now": the crawl is only drained when nothing is queued
//! and no worker is still processing a page that might discover more links.

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

/// Upper bound on how long an idle worker sleeps before re-checking the queue
pub const IDLE_POLL: Duration = Duration::from_millis(100);

/// A URL waiting to be fetched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    /// Normalized URL
    pub url: String,

    /// Distance from the nearest seed
    pub depth: u32,

    /// Retry items are held back until their backoff expires
    pub not_before: Option<Instant>,
}

impl WorkItem {
    pub fn new(url: impl Into<String>, depth: u32) -> Self {
        Self {
            url: url.into(),
            depth,
            not_before: None,
        }
    }

    pub fn delayed(url: impl Into<String>, depth: u32, delay: Duration) -> Self {
        Self {
            url: url.into(),
            depth,
            not_before: Some(Instant::now() + delay),
        }
    }

    fn is_due(&self, now: Instant) -> bool {
        self.not_before.map_or(true, |at| at <= now)
    }
}

/// Result of asking the queue for work
#[derive(Debug, PartialEq, Eq)]
pub enum Dequeue {
    /// Process this item, then call `finish`
    Item(WorkItem),

    /// Nothing is ready yet; check again after this long at the latest
    Wait(Duration),

    /// Nothing queued and nothing in flight
    Drained,

    /// The page limit has been reached
    LimitReached,
}

#[derive(Debug, Default)]
struct QueueState {
    items: VecDeque<WorkItem>,
    queued: HashSet<String>,
    in_flight: usize,
}

/// FIFO of pending work shared by all workers
#[derive(Debug, Default)]
pub struct WorkQueue {
    state: Mutex<QueueState>,
    notify: Notify,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an item unless the same URL is already queued
    ///
    /// # Returns
    ///
    /// `true` if the item was added
    pub fn push(&self, item: WorkItem) -> bool {
        let added = match self.state.lock() {
            Ok(mut state) => {
                if state.queued.insert(item.url.clone()) {
                    state.items.push_back(item);
                    true
                } else {
                    false
                }
            }
            Err(_) => false,
        };

        if added {
            self.notify.notify_waiters();
        }
        added
    }

    /// Takes the first due item
    ///
    /// # Arguments
    ///
    /// * `page_limit` - Maximum completed pages for this run, if any
    /// * `completed` - Pages completed so far in this run
    pub fn pop(&self, page_limit: Option<u64>, completed: u64) -> Dequeue {
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(_) => return Dequeue::Drained,
        };

        if let Some(limit) = page_limit {
            if completed >= limit {
                return Dequeue::LimitReached;
            }
            // In-flight pages may still complete and fill the budget
            if completed + state.in_flight as u64 >= limit {
                return Dequeue::Wait(IDLE_POLL);
            }
        }

        if state.items.is_empty() {
            return if state.in_flight == 0 {
                Dequeue::Drained
            } else {
                Dequeue::Wait(IDLE_POLL)
            };
        }

        let now = Instant::now();
        match state.items.iter().position(|item| item.is_due(now)) {
            Some(index) => {
                let Some(item) = state.items.remove(index) else {
                    return Dequeue::Wait(IDLE_POLL);
                };
                state.queued.remove(&item.url);
                state.in_flight += 1;
                Dequeue::Item(item)
            }
            None => {
                let next_due = state
                    .items
                    .iter()
                    .filter_map(|item| item.not_before)
                    .min()
                    .map(|at| at.saturating_duration_since(now))
                    .unwrap_or(IDLE_POLL);
                Dequeue::Wait(next_due)
            }
        }
    }

    /// Marks an item returned by `pop` as done
    pub fn finish(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.in_flight = state.in_flight.saturating_sub(1);
        }
        self.notify.notify_waiters();
    }

    /// Waits until the queue changes or `timeout` elapses
    pub async fn wait(&self, timeout: Duration) {
        let _ = tokio::time::timeout(timeout.min(IDLE_POLL), self.notify.notified()).await;
    }

    pub fn len(&self) -> usize {
        self.state.lock().map(|s| s.items.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn in_flight(&self) -> usize {
        self.state.lock().map(|s| s.in_flight).unwrap_or(0)
    }
}
