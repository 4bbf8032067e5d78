use super::classify::FailureClassification;
use super::policy::RetryPolicy;
use std::time::Duration;

/// Bounded exponential backoff driven by the classifier's verdict.
#[derive(Debug, Clone)]
pub struct RetryController {
    policy: RetryPolicy,
}

impl RetryController {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn max_attempts(&self) -> u32 {
        self.policy.max_attempts
    }

    /// Returns `true` when another automatic attempt should be scheduled.
    ///
    /// `retries_so_far` is the number of retries already made for the
    /// current failure streak.
    pub fn should_retry(&self, classification: &FailureClassification, retries_so_far: u32) -> bool {
        classification.retryable && retries_so_far < self.policy.max_attempts
    }

    /// Computes the backoff for a 1-based retry attempt: `base * 2^(attempt - 1)`.
    pub fn backoff_ms(&self, attempt: u32) -> u64 {
        let base = self.policy.base_delay_ms.max(1);
        let cap = self.policy.max_delay_ms.max(base);
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        base.saturating_mul(factor).min(cap)
    }

    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_ms(attempt))
    }
}
