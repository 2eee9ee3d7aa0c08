//! Bounded retry with exponential backoff
//!
//! Components classify their errors as transient or fatal; the combinator
//! retries only transient failures, with jittered exponential delays and a
//! hard attempt cap. Fatal errors propagate on the first occurrence.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// How an error should be treated by the retry loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    /// Worth retrying after a delay (rate limit, quota, flaky network)
    Transient,
    /// Retrying cannot help (bad request, auth failure, parse failure)
    Fatal,
}

/// Implemented by error types the combinator can classify
pub trait Retryable {
    fn retry_class(&self) -> RetryClass;

    fn is_transient(&self) -> bool {
        self.retry_class() == RetryClass::Transient
    }
}

/// Exponential backoff parameters
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Multiplier applied per attempt
    pub factor: f64,
    /// Upper bound on any single delay
    pub max_delay: Duration,
    /// Total attempts, including the first
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            factor: 2.0,
            max_delay: Duration::from_secs(30),
            max_attempts: 4,
        }
    }
}

impl BackoffPolicy {
    /// Delay before the retry following `attempt` (0-indexed), with ±50% jitter
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.as_millis() as f64 * self.factor.powi(attempt as i32);
        let capped = exp.min(self.max_delay.as_millis() as f64);
        let jittered = capped * rand::thread_rng().gen_range(0.5..1.5);
        Duration::from_millis(jittered.min(self.max_delay.as_millis() as f64) as u64)
    }
}

/// Run `op` until it succeeds, fails fatally, or exhausts the attempt cap
///
/// Returns the last error when attempts run out. `what` labels the operation
/// in retry logs.
pub async fn retry<T, E, F, Fut>(policy: &BackoffPolicy, what: &str, mut op: F) -> Result<T, E>
where
    E: Retryable + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt + 1 < policy.max_attempts => {
                let delay = policy.delay_for(attempt);
                warn!(
                    "{} failed (attempt {}/{}): {}; retrying in {:?}",
                    what,
                    attempt + 1,
                    policy.max_attempts,
                    err,
                    delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    enum TestError {
        Flaky,
        Broken,
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Self::Flaky => write!(f, "flaky"),
                Self::Broken => write!(f, "broken"),
            }
        }
    }

    impl Retryable for TestError {
        fn retry_class(&self) -> RetryClass {
            match self {
                Self::Flaky => RetryClass::Transient,
                Self::Broken => RetryClass::Fatal,
            }
        }
    }

    fn quick_policy() -> BackoffPolicy {
        BackoffPolicy {
            base_delay: Duration::from_millis(1),
            factor: 2.0,
            max_delay: Duration::from_millis(8),
            max_attempts: 3,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_are_retried() {
        let calls = AtomicU32::new(0);
        let calls = &calls;
        let result: Result<u32, TestError> = retry(&quick_policy(), "op", move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(TestError::Flaky)
            } else {
                Ok(42)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_cap_returns_last_error() {
        let calls = AtomicU32::new(0);
        let calls = &calls;
        let result: Result<u32, TestError> = retry(&quick_policy(), "op", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(TestError::Flaky)
        })
        .await;

        assert!(matches!(result, Err(TestError::Flaky)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_errors_short_circuit() {
        let calls = AtomicU32::new(0);
        let calls = &calls;
        let result: Result<u32, TestError> = retry(&quick_policy(), "op", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(TestError::Broken)
        })
        .await;

        assert!(matches!(result, Err(TestError::Broken)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_delay_is_capped() {
        let policy = BackoffPolicy {
            base_delay: Duration::from_secs(10),
            factor: 10.0,
            max_delay: Duration::from_secs(30),
            max_attempts: 10,
        };
        for attempt in 0..8 {
            assert!(policy.delay_for(attempt) <= Duration::from_secs(30));
        }
    }
}
