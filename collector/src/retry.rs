//! # Retry
//!
//! Bounded exponential backoff for storage calls that fail on a flaky connection.
use std::fmt::Display;
use std::future::Future;
use std::time;

use tracing::warn;

/// Error messages that point at a broken connection rather than a bad request.
const TRANSIENT_ERRORS: &[&str] = &[
    "broken pipe",
    "bad connection",
    "connection timed out",
    "connection reset",
    "timed out",
];

/// Whether an error message describes a failure worth retrying.
pub fn is_transient(message: &str) -> bool {
    let message = message.to_lowercase();
    TRANSIENT_ERRORS
        .iter()
        .any(|pattern| message.contains(pattern))
}

#[derive(Clone, Debug)]
/// A retry policy to determine retry parameters for a storage call.
pub struct RetryPolicy {
    /// Coefficient to multiply initial_interval with for every past attempt.
    pub backoff_coefficient: u32,
    /// The backoff interval for the first retry.
    pub initial_interval: time::Duration,
    /// The maximum possible backoff between retries.
    pub maximum_interval: Option<time::Duration>,
    /// How many times a transient failure is retried before giving up.
    pub max_retries: u32,
}

impl RetryPolicy {
    /// Initialize a `RetryPolicyBuilder`.
    pub fn build(backoff_coefficient: u32, initial_interval: time::Duration) -> RetryPolicyBuilder {
        RetryPolicyBuilder::new(backoff_coefficient, initial_interval)
    }

    /// Determine interval for retrying at a given attempt number, starting at 1.
    pub fn retry_interval(&self, attempt: u32) -> time::Duration {
        let candidate_interval = self
            .initial_interval
            .saturating_mul(self.backoff_coefficient.saturating_pow(attempt.saturating_sub(1)));

        match self.maximum_interval {
            Some(max_interval) => std::cmp::min(candidate_interval, max_interval),
            None => candidate_interval,
        }
    }

    /// Run `operation` until it succeeds, fails with a non-transient error,
    /// or `max_retries` retries have been spent.
    pub async fn run<T, E, F, Fut>(&self, what: &str, mut operation: F) -> Result<T, E>
    where
        E: Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < self.max_retries && is_transient(&err.to_string()) => {
                    attempt += 1;
                    let interval = self.retry_interval(attempt);
                    warn!(
                        attempt,
                        "{} failed with a transient error, retrying in {:?}: {}",
                        what,
                        interval,
                        err
                    );
                    tokio::time::sleep(interval).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Builder pattern struct to provide a `RetryPolicy`.
pub struct RetryPolicyBuilder {
    pub backoff_coefficient: u32,
    pub initial_interval: time::Duration,
    pub maximum_interval: Option<time::Duration>,
    pub max_retries: u32,
}

impl Default for RetryPolicyBuilder {
    fn default() -> Self {
        Self {
            backoff_coefficient: 2,
            initial_interval: time::Duration::from_millis(100),
            maximum_interval: Some(time::Duration::from_secs(5)),
            max_retries: 10,
        }
    }
}

impl RetryPolicyBuilder {
    pub fn new(backoff_coefficient: u32, initial_interval: time::Duration) -> Self {
        Self {
            backoff_coefficient,
            initial_interval,
            ..RetryPolicyBuilder::default()
        }
    }

    pub fn maximum_interval(mut self, interval: time::Duration) -> RetryPolicyBuilder {
        self.maximum_interval = Some(interval);
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> RetryPolicyBuilder {
        self.max_retries = max_retries;
        self
    }

    /// Provide a `RetryPolicy` according to build parameters provided thus far.
    pub fn provide(&self) -> RetryPolicy {
        RetryPolicy {
            backoff_coefficient: self.backoff_coefficient,
            initial_interval: self.initial_interval,
            maximum_interval: self.maximum_interval,
            max_retries: self.max_retries,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[test]
    fn test_retry_interval_never_exceeds_maximum() {
        let retry_policy = RetryPolicy::build(2, time::Duration::from_secs(2))
            .maximum_interval(time::Duration::from_secs(4))
            .provide();

        assert_eq!(retry_policy.retry_interval(1), time::Duration::from_secs(2));
        assert_eq!(retry_policy.retry_interval(2), time::Duration::from_secs(4));
        assert_eq!(retry_policy.retry_interval(3), time::Duration::from_secs(4));
        assert_eq!(retry_policy.retry_interval(40), time::Duration::from_secs(4));
    }

    #[test]
    fn test_retry_interval_increases_with_coefficient() {
        let retry_policy = RetryPolicy::build(2, time::Duration::from_secs(2))
            .maximum_interval(time::Duration::from_secs(60))
            .provide();

        assert_eq!(retry_policy.retry_interval(1), time::Duration::from_secs(2));
        assert_eq!(retry_policy.retry_interval(2), time::Duration::from_secs(4));
        assert_eq!(retry_policy.retry_interval(3), time::Duration::from_secs(8));
    }

    #[test]
    fn test_transient_errors() {
        assert!(is_transient("write tcp: Broken pipe"));
        assert!(is_transient("driver: bad connection"));
        assert!(is_transient("dial tcp 10.0.0.1:8123: connection timed out"));
        assert!(is_transient("Connection reset by peer"));
        assert!(!is_transient("Code: 60. Table default.logs does not exist"));
    }

    #[tokio::test]
    async fn test_run_retries_transient_errors_only() {
        let policy = RetryPolicy::build(1, time::Duration::from_millis(1))
            .max_retries(3)
            .provide();

        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), String> = policy
            .run("insert", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("broken pipe".to_owned())
            })
            .await;
        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 4);

        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), String> = policy
            .run("insert", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("syntax error".to_owned())
            })
            .await;
        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<u32, String> = policy
            .run("insert", move || async move {
                let previous = calls.fetch_add(1, Ordering::SeqCst);
                if previous == 0 {
                    Err("connection reset".to_owned())
                } else {
                    Ok(previous)
                }
            })
            .await;
        assert_eq!(result, Ok(1));
    }
}
