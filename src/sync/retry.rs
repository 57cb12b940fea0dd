//! Capped exponential backoff.
//!
//! Retry decisions are a pure function of the policy, the number of
//! consecutive failures so far and the classified error.

use std::time::Duration;

use crate::transport::SyncError;

/// Backoff settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Consecutive failures tolerated; reaching it gives up
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// `base · 2^(attempt-1)`, capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let factor = 1u32 << exponent;
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Arm a retry timer; `attempt` is the new consecutive failure count
    Retry { attempt: u32, delay: Duration },
    /// Stop retrying; `attempt` is the final consecutive failure count
    GiveUp { attempt: u32 },
}

/// Decide whether to retry after `error`, given `failures` consecutive
/// failures before this one.
pub fn decide(policy: &RetryPolicy, failures: u32, error: &SyncError) -> RetryDecision {
    let attempt = failures.saturating_add(1);
    if !error.is_retryable() || attempt >= policy.max_retries {
        return RetryDecision::GiveUp { attempt };
    }
    let mut delay = policy.delay_for(attempt);
    if let Some(requested) = error.retry_after() {
        delay = delay.max(requested);
    }
    RetryDecision::Retry { attempt, delay }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(3),
        }
    }

    #[test]
    fn test_delay_doubles_until_capped() {
        let policy = policy();
        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(2), Duration::from_secs(1));
        assert_eq!(policy.delay_for(3), Duration::from_secs(2));
        assert_eq!(policy.delay_for(4), Duration::from_secs(3));
        assert_eq!(policy.delay_for(40), Duration::from_secs(3));
    }

    #[test]
    fn test_non_retryable_gives_up_immediately() {
        let decision = decide(&policy(), 0, &SyncError::Validation("bad".into()));
        assert_eq!(decision, RetryDecision::GiveUp { attempt: 1 });
    }

    #[test]
    fn test_budget_exhaustion() {
        let policy = policy();
        assert!(matches!(decide(&policy, 3, &SyncError::Timeout), RetryDecision::Retry { attempt: 4, .. }));
        assert_eq!(decide(&policy, 4, &SyncError::Timeout), RetryDecision::GiveUp { attempt: 5 });
    }

    #[test]
    fn test_retry_after_raises_delay() {
        let error = SyncError::RateLimited { retry_after_secs: 10 };
        assert_eq!(
            decide(&policy(), 0, &error),
            RetryDecision::Retry {
                attempt: 1,
                delay: Duration::from_secs(10)
            }
        );
    }
}
