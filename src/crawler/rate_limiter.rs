//! Request admission control
//!
//! A token bucket with a burst capacity of one: the first request goes out
//! immediately, every later request waits until one refill interval has
//! passed since the previous dispatch. Waiters are served in arrival order.

use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Why `acquire` returned without a token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AcquireError {
    #[error("shutdown requested while waiting for a request slot")]
    Cancelled,

    #[error("timed out waiting for a request slot")]
    TimedOut,
}

/// Capacity-1 token bucket shared by all workers
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    /// Earliest instant the next token is available
    next_slot: Mutex<Instant>,
}

impl RateLimiter {
    /// Creates a limiter that refills one token every `interval`
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_slot: Mutex::new(Instant::now()),
        }
    }

    /// Waits for a token
    ///
    /// Returns early with `Cancelled` when `cancel` fires and with `TimedOut`
    /// after `timeout`. In both cases no token is consumed.
    pub async fn acquire(
        &self,
        cancel: &CancellationToken,
        timeout: Duration,
    ) -> Result<(), AcquireError> {
        let deadline = Instant::now() + timeout;

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AcquireError::Cancelled),
            _ = sleep_until(deadline) => Err(AcquireError::TimedOut),
            _ = self.take_slot() => Ok(()),
        }
    }

    async fn take_slot(&self) {
        // tokio's Mutex queues lockers fairly, which gives FIFO admission
        let mut next_slot = self.next_slot.lock().await;
        let ready_at = *next_slot;
        if ready_at > Instant::now() {
            sleep_until(ready_at).await;
        }
        *next_slot = Instant::now().max(ready_at) + self.interval;
    }
}
