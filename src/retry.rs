//! Fixed-count, fixed-delay retry policy for transient failures.
//!
//! The transport retries only failures the [classifier](crate::classify)
//! marks as transient. The wait between attempts is constant: no jitter, no
//! exponential growth.

use std::time::Duration;

/// How many times, and how far apart, a transient failure is retried.
///
/// The policy is fixed when the transport is built and never changes.
///
/// # Examples
///
/// ```
/// use metaclient::RetryPolicy;
/// use std::time::Duration;
///
/// // Three retries, one second apart
/// let policy = RetryPolicy::new(3, Duration::from_secs(1));
/// assert_eq!(policy.delay_for_attempt(1), Some(Duration::from_secs(1)));
/// assert_eq!(policy.delay_for_attempt(4), None);
///
/// // Never retry
/// let none = RetryPolicy::none();
/// assert_eq!(none.delay_for_attempt(1), None);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: usize,
    delay: Duration,
}

impl RetryPolicy {
    /// Number of retries used when none is configured.
    pub const DEFAULT_MAX_ATTEMPTS: usize = 3;

    /// Wait between retries used when none is configured.
    pub const DEFAULT_DELAY: Duration = Duration::from_secs(3);

    /// Creates a policy that retries up to `max_attempts` times, waiting
    /// `delay` before each retry.
    pub const fn new(max_attempts: usize, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// A policy that never retries.
    pub const fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// The maximum number of retries after the first attempt.
    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// The wait before each retry.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Returns the delay before the given retry, or `None` once retries are
    /// exhausted.
    ///
    /// # Arguments
    ///
    /// * `attempt` - The retry number (1-indexed, so 1 = first retry)
    pub fn delay_for_attempt(&self, attempt: usize) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_attempts {
            None
        } else {
            Some(self.delay)
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_ATTEMPTS, Self::DEFAULT_DELAY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_delays() {
        let policy = RetryPolicy::new(3, Duration::from_secs(1));

        assert_eq!(policy.delay_for_attempt(1), Some(Duration::from_secs(1)));
        assert_eq!(policy.delay_for_attempt(2), Some(Duration::from_secs(1)));
        assert_eq!(policy.delay_for_attempt(3), Some(Duration::from_secs(1)));
        assert_eq!(policy.delay_for_attempt(4), None);
    }

    #[test]
    fn test_no_retry() {
        let policy = RetryPolicy::none();
        assert_eq!(policy.max_attempts(), 0);
        assert_eq!(policy.delay_for_attempt(1), None);
    }

    #[test]
    fn test_attempt_zero_is_not_a_retry() {
        assert_eq!(RetryPolicy::default().delay_for_attempt(0), None);
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.delay(), Duration::from_secs(3));
    }
}
