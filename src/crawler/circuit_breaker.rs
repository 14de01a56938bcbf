//! Consecutive-failure circuit breaker

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Trips after `threshold` consecutive failed fetch outcomes
///
/// Any success resets the counter. Once tripped the breaker stays tripped for
/// the rest of the run.
#[derive(Debug)]
pub struct CircuitBreaker {
    threshold: u32,
    consecutive: AtomicU32,
    tripped: AtomicBool,
}

impl CircuitBreaker {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            consecutive: AtomicU32::new(0),
            tripped: AtomicBool::new(false),
        }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn record_success(&self) {
        self.consecutive.store(0, Ordering::SeqCst);
    }

    /// Counts a failure
    ///
    /// # Returns
    ///
    /// `true` exactly once: for the failure that trips the breaker
    pub fn record_failure(&self) -> bool {
        let count = self.consecutive.fetch_add(1, Ordering::SeqCst) + 1;
        if count >= self.threshold {
            return !self.tripped.swap(true, Ordering::SeqCst);
        }
        false
    }

    pub fn is_tripped(&self) -> bool {
        self.tripped.load(Ordering::SeqCst)
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive.load(Ordering::SeqCst)
    }
}
