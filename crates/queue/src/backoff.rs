//! Retry budget and exponential backoff.
//!
//! A task gets `1 + max_retry` attempts. After the `n`-th failed attempt it
//! becomes claimable again after `2^n` seconds; once `max_retry` retries
//! have been spent it is dead-lettered.

use std::time::Duration;

/// Largest exponent applied, keeping delays finite for large budgets.
pub const MAX_BACKOFF_EXPONENT: u32 = 16;

/// Delay before the next attempt after `failed_attempts` failures.
pub fn retry_delay(failed_attempts: u32) -> Duration {
    Duration::from_secs(1u64 << failed_attempts.min(MAX_BACKOFF_EXPONENT))
}

/// What the broker does with a task whose attempt just failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOutcome {
    /// Claimable again after `delay`; `retried` failed attempts so far.
    Retry { delay: Duration, retried: u32 },
    /// Retry budget spent.
    Dead,
}

/// Decide the fate of a task that had `retried` failed attempts before the
/// one that just failed.
pub fn on_failure(retried: u32, max_retry: u32) -> FailOutcome {
    if retried >= max_retry {
        return FailOutcome::Dead;
    }
    let retried = retried + 1;
    FailOutcome::Retry {
        delay: retry_delay(retried),
        retried,
    }
}
