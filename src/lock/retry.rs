//! Bounded retry policy for callers that opt into blocking acquisition.

use std::time::Duration;

/// How often and how patiently a contended lock is retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one (at least 1)
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub base_delay: Duration,
    /// Upper bound on any single delay
    pub max_delay: Duration,
    /// Double the delay after each failed attempt
    pub exponential: bool,
}

impl RetryPolicy {
    /// Fixed delay between attempts
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: delay,
            max_delay: delay,
            exponential: false,
        }
    }

    /// A single attempt, no waiting
    pub fn fail_fast() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Double the delay after every failure, capped at `max_delay`
    pub fn with_exponential_backoff(mut self, max_delay: Duration) -> Self {
        self.exponential = true;
        self.max_delay = max_delay.max(self.base_delay);
        self
    }

    /// Delay to wait after the failed attempt number `attempt` (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        if !self.exponential {
            return self.base_delay;
        }
        let shift = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << shift)
            .min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(20, Duration::from_millis(50))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_delay() {
        let policy = RetryPolicy::new(3, Duration::from_millis(50));
        assert_eq!(policy.delay_after(1), Duration::from_millis(50));
        assert_eq!(policy.delay_after(3), Duration::from_millis(50));
    }

    #[test]
    fn test_exponential_delay_is_capped() {
        let policy = RetryPolicy::new(10, Duration::from_millis(10))
            .with_exponential_backoff(Duration::from_millis(70));

        assert_eq!(policy.delay_after(1), Duration::from_millis(10));
        assert_eq!(policy.delay_after(2), Duration::from_millis(20));
        assert_eq!(policy.delay_after(3), Duration::from_millis(40));
        assert_eq!(policy.delay_after(4), Duration::from_millis(70));
        assert_eq!(policy.delay_after(30), Duration::from_millis(70));
    }

    #[test]
    fn test_at_least_one_attempt() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
        assert_eq!(RetryPolicy::fail_fast().max_attempts, 1);
    }
}
