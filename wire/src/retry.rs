//! Shared retry predicate for transient network/database failures.
//!
//! A `RetryBudget` is stateful: the first call to `should_retry` always
//! returns `true` (the initial attempt is never a retry), and each
//! subsequent call consumes one credit, sleeping for a linear backoff
//! before reporting whether another attempt is warranted.

use std::time::Duration;

fn is_transient(message: &str) -> bool {
    let lowered = message.to_ascii_lowercase();
    lowered.contains("connection refused")
        || lowered.contains("connection reset")
        || lowered.contains("broken pipe")
        || lowered.contains("timed out")
}

#[derive(Debug, Clone)]
pub struct RetryBudget {
    max_attempts: u32,
    backoff: Duration,
    attempts: u32,
}

impl RetryBudget {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts,
            backoff,
            attempts: 0,
        }
    }

    /// Call once per attempt, after an attempt has failed with `error_message`.
    /// Sleeps for `attempt_index * backoff` before returning `true`.
    pub async fn should_retry(&mut self, error_message: &str) -> bool {
        self.should_retry_given(is_transient(error_message)).await
    }

    /// Same bookkeeping as `should_retry`, but the retryability verdict is
    /// supplied by the caller instead of derived from the error's `Display`
    /// text — for callers with a structured error code to classify on.
    pub async fn should_retry_given(&mut self, retryable: bool) -> bool {
        if self.attempts == 0 {
            self.attempts += 1;
            return true;
        }
        if self.attempts >= self.max_attempts || !retryable {
            return false;
        }
        let delay = self.backoff * self.attempts;
        tokio::time::sleep(delay).await;
        self.attempts += 1;
        true
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_call_always_retries() {
        let mut budget = RetryBudget::new(3, Duration::from_millis(1));
        assert!(budget.should_retry("anything").await);
    }

    #[tokio::test]
    async fn stops_after_max_attempts() {
        let mut budget = RetryBudget::new(2, Duration::from_millis(1));
        assert!(budget.should_retry("connection refused").await);
        assert!(budget.should_retry("connection refused").await);
        assert!(!budget.should_retry("connection refused").await);
    }

    #[tokio::test]
    async fn stops_on_non_transient_error() {
        let mut budget = RetryBudget::new(5, Duration::from_millis(1));
        assert!(budget.should_retry("anything").await);
        assert!(!budget.should_retry("permission denied").await);
    }
}
