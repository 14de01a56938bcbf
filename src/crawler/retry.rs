//! Retry backoff for transient fetch failures

use rand::Rng;
use std::time::Duration;

/// Exponential delay before retry number `attempt` (1-based), without jitter
///
/// `initial * 2^(attempt - 1)`, capped at `max`.
pub fn base_backoff(attempt: u32, initial: Duration, max: Duration) -> Duration {
    let exponent = attempt.saturating_sub(1).min(31);
    initial
        .checked_mul(1u32 << exponent)
        .unwrap_or(max)
        .min(max)
}

/// `base_backoff` scaled by a random factor in `[0.5, 1.5)`
///
/// Jitter keeps workers that failed together from retrying together.
pub fn backoff_delay(attempt: u32, initial: Duration, max: Duration) -> Duration {
    let factor: f64 = rand::rng().random_range(0.5..1.5);
    base_backoff(attempt, initial, max).mul_f64(factor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_backoff_doubles() {
        let initial = Duration::from_secs(2);
        let max = Duration::from_secs(60);
        assert_eq!(base_backoff(1, initial, max), Duration::from_secs(2));
        assert_eq!(base_backoff(2, initial, max), Duration::from_secs(4));
        assert_eq!(base_backoff(3, initial, max), Duration::from_secs(8));
    }

    #[test]
    fn test_base_backoff_capped() {
        let initial = Duration::from_secs(2);
        let max = Duration::from_secs(60);
        assert_eq!(base_backoff(6, initial, max), max);
        assert_eq!(base_backoff(40, initial, max), max);
    }

    #[test]
    fn test_jitter_bounds() {
        let initial = Duration::from_secs(4);
        let max = Duration::from_secs(60);
        for _ in 0..100 {
            let delay = backoff_delay(1, initial, max);
            assert!(delay >= Duration::from_secs(2));
            assert!(delay < Duration::from_secs(6));
        }
    }
}
