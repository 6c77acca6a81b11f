//! Bounded retry with a per-attempt timeout.
//!
//! Used around the analysis gateway call. Each attempt gets its own abort boundary:
//! when the timeout fires the attempt's future is dropped, so no request outlives its
//! attempt.

use crate::errors::{CheckoutError, Result};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay before every retry
    Fixed(Duration),
    /// `step * n` before retry `n` (1-based)
    Linear {
        /// Increment per retry
        step: Duration,
    },
}

impl Backoff {
    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        match self {
            Backoff::Fixed(delay) => *delay,
            Backoff::Linear { step } => step.saturating_mul(attempt),
        }
    }
}

/// How many times to try, how long each try may take, and how long to wait between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,

    /// Time budget for a single attempt
    pub attempt_timeout: Duration,

    /// Wait between attempts
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    /// Two attempts of up to 30 seconds each, two seconds apart. The analysis service
    /// can take a long time on large contracts.
    fn default() -> Self {
        Self {
            max_attempts: 2,
            attempt_timeout: Duration::from_secs(30),
            backoff: Backoff::Fixed(Duration::from_secs(2)),
        }
    }
}

impl RetryPolicy {
    /// Short-timeout preset for deployments that fall back to synthetic results.
    pub fn fast() -> Self {
        Self {
            max_attempts: 2,
            attempt_timeout: Duration::from_secs(10),
            backoff: Backoff::Fixed(Duration::from_secs(1)),
        }
    }

    /// Sets the number of attempts. Zero is treated as one.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Sets the per-attempt timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Sets the backoff between attempts.
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }
}

/// Runs `op` until it succeeds, fails with a non-retryable error, or runs out of
/// attempts.
///
/// `op` receives the 1-based attempt number. A timed-out attempt fails with
/// [`CheckoutError::TimeoutExceeded`]. After the final attempt the last error is
/// returned unchanged.
///
/// # Examples
///
/// ```
/// use guarded_checkout::retry::{with_retry, RetryPolicy};
///
/// # async fn example() -> guarded_checkout::Result<()> {
/// let policy = RetryPolicy::default();
/// let answer = with_retry(&policy, |_attempt| async { Ok(42) }).await?;
/// assert_eq!(answer, 42);
/// # Ok(())
/// # }
/// ```
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        debug!(attempt, max_attempts, "calling");

        let outcome = match tokio::time::timeout(policy.attempt_timeout, op(attempt)).await {
            Ok(result) => result,
            Err(_) => Err(CheckoutError::TimeoutExceeded(policy.attempt_timeout)),
        };

        let err = match outcome {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if !err.is_retryable() || attempt >= max_attempts {
            warn!(attempt, error = %err, "giving up");
            return Err(err);
        }

        let delay = policy.backoff.delay(attempt);
        warn!(attempt, error = %err, ?delay, "attempt failed, retrying");
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
