//! Sliding-window rate limiting for outbound search calls
//!
//! Bounds the whole pipeline to N grants per rolling window. Waiters queue
//! FIFO on the underlying semaphore, so no caller can starve; each grant's
//! permit is returned exactly one window later, which keeps any rolling
//! window of the configured duration at or under the quota.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;

/// Non-blocking acquisition found no free slot
#[derive(Debug, Error, PartialEq, Eq)]
#[error("rate limit exhausted: no call slot available")]
pub struct Exhausted;

/// Sliding-window rate limiter shared by all concurrent searchers
pub struct RateLimiter {
    permits: Arc<Semaphore>,
    window: Duration,
    quota: usize,
}

impl RateLimiter {
    /// Create a limiter allowing `quota` grants per `window`
    pub fn new(quota: usize, window: Duration) -> Self {
        let quota = quota.max(1);
        Self {
            permits: Arc::new(Semaphore::new(quota)),
            window,
            quota,
        }
    }

    /// Configured quota per window
    pub fn quota(&self) -> usize {
        self.quota
    }

    /// Configured window duration
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Wait until a call slot is free, then claim it
    ///
    /// Suspends the caller; waiters are granted in FIFO order.
    pub async fn acquire(&self) {
        let permit = self
            .permits
            .acquire()
            .await
            .expect("limiter semaphore is never closed");
        permit.forget();
        self.schedule_release();
    }

    /// Claim a slot only if one is free right now
    pub fn try_acquire(&self) -> Result<(), Exhausted> {
        match self.permits.try_acquire() {
            Ok(permit) => {
                permit.forget();
                self.schedule_release();
                Ok(())
            }
            Err(_) => Err(Exhausted),
        }
    }

    /// Slots currently free
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    // The slot opens again one full window after the grant.
    fn schedule_release(&self) {
        let permits = Arc::clone(&self.permits);
        let window = self.window;
        tokio::spawn(async move {
            tokio::time::sleep(window).await;
            permits.add_permits(1);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_quota_grants_immediately() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        limiter.acquire().await;
        limiter.acquire().await;
        limiter.acquire().await;
        assert_eq!(limiter.available(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_try_acquire_exhausted_without_waiting() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        assert!(limiter.try_acquire().is_ok());
        assert_eq!(limiter.try_acquire(), Err(Exhausted));

        // Just past the window the slot is free again.
        tokio::time::sleep(Duration::from_secs(61)).await;
        tokio::task::yield_now().await;
        assert!(limiter.try_acquire().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_window_exceeds_quota_under_concurrency() {
        let quota = 3usize;
        let window = Duration::from_secs(60);
        let limiter = Arc::new(RateLimiter::new(quota, window));
        let grants: Arc<Mutex<Vec<Instant>>> = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let limiter = Arc::clone(&limiter);
            let grants = Arc::clone(&grants);
            handles.push(tokio::spawn(async move {
                limiter.acquire().await;
                grants.lock().unwrap().push(Instant::now());
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let mut times = grants.lock().unwrap().clone();
        times.sort();
        assert_eq!(times.len(), 10);
        // Grant k and grant k+quota must be at least one window apart,
        // otherwise some rolling window saw more than `quota` grants.
        for pair in times.windows(quota + 1) {
            assert!(pair[quota].duration_since(pair[0]) >= window);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiter_resumes_when_window_slides() {
        let limiter = Arc::new(RateLimiter::new(1, Duration::from_secs(60)));
        limiter.acquire().await;

        let waiter = {
            let limiter = Arc::clone(&limiter);
            tokio::spawn(async move {
                let started = Instant::now();
                limiter.acquire().await;
                started.elapsed()
            })
        };

        let waited = waiter.await.unwrap();
        assert!(waited >= Duration::from_secs(60));
    }
}
