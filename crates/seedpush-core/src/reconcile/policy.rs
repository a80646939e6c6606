use std::time::Duration;

/// Decision returned by the retry policy after a failed delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Stop trying; the job is evicted without a notice.
    GiveUp,
    /// Try again once this much time has passed (zero = next tick).
    RetryAfter(Duration),
}

/// Retry policy for completion notices.
///
/// The default never gives up and never backs off: a failed notice is retried
/// on every reconciliation tick for as long as the daemon reports the job.
/// `bounded` caps the attempts and spaces them with exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first); `None` = unlimited.
    pub max_attempts: Option<u32>,
    /// Base delay for backoff.
    pub base_delay: Duration,
    /// Upper bound on backoff delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: None,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }
}

impl RetryPolicy {
    pub fn bounded(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: Some(max_attempts.max(1)),
            base_delay,
            max_delay,
        }
    }

    /// Decide what to do after `failures` failed attempts (1-based).
    pub fn decide(&self, failures: u32) -> RetryDecision {
        if self.max_attempts.is_some_and(|max| failures >= max) {
            return RetryDecision::GiveUp;
        }
        // base * 2^(failures-1), capped.
        let exp = 1u32 << failures.saturating_sub(1).min(16);
        let delay = self.base_delay.saturating_mul(exp).min(self.max_delay);
        RetryDecision::RetryAfter(delay)
    }
}
