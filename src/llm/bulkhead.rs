//! Bulkhead for completion calls.
//!
//! Limits the number of completion calls in flight across the process. Uses a
//! tokio [`Semaphore`], whose waiters are queued FIFO, so callers beyond the
//! limit suspend without polling and every queued caller is eventually
//! admitted.

use crate::{Error, Result};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Semaphore;

/// Default number of concurrent completion calls.
pub const DEFAULT_MAX_CONCURRENT: usize = 10;

/// Admits at most N futures at a time.
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
    in_flight: Arc<AtomicUsize>,
}

impl ConcurrencyLimiter {
    /// Creates a limiter admitting `max_concurrent` futures (minimum 1).
    #[must_use]
    pub fn new(max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Returns the configured limit.
    #[must_use]
    pub const fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Returns the number of free slots.
    #[must_use]
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Returns the number of futures currently holding a slot.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Runs `task` once a slot is free and releases the slot when it completes.
    ///
    /// The slot is also released if the returned future is dropped early.
    ///
    /// # Errors
    ///
    /// Returns the task's own error, or [`Error::OperationFailed`] if the
    /// limiter has been closed.
    pub async fn run<T, F>(&self, task: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let waiting = self.semaphore.available_permits() == 0;
        if waiting {
            tracing::debug!(
                max_concurrent = self.max_concurrent,
                "All completion slots busy, waiting"
            );
        }

        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|e| Error::operation("limiter_acquire", e))?;
        let _slot = SlotGuard::enter(&self.in_flight);

        task.await
    }

    /// Closes the limiter; queued and future callers fail.
    pub fn close(&self) {
        self.semaphore.close();
    }
}

impl Default for ConcurrencyLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONCURRENT)
    }
}

/// Tracks one occupied slot for metrics and introspection.
struct SlotGuard<'a> {
    in_flight: &'a AtomicUsize,
}

impl<'a> SlotGuard<'a> {
    fn enter(in_flight: &'a AtomicUsize) -> Self {
        let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::gauge!("ai_limiter_in_flight").set(now as f64);
        Self { in_flight }
    }
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        let now = self.in_flight.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        metrics::gauge!("ai_limiter_in_flight").set(now as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_limiter_defaults() {
        let limiter = ConcurrencyLimiter::default();
        assert_eq!(limiter.max_concurrent(), DEFAULT_MAX_CONCURRENT);
        assert_eq!(limiter.available_permits(), DEFAULT_MAX_CONCURRENT);
        assert_eq!(limiter.in_flight(), 0);
    }

    #[test]
    fn test_zero_limit_is_clamped() {
        let limiter = ConcurrencyLimiter::new(0);
        assert_eq!(limiter.max_concurrent(), 1);
    }

    #[tokio::test]
    async fn test_run_returns_task_result() {
        let limiter = ConcurrencyLimiter::new(2);
        let value = limiter.run(async { Ok::<_, Error>(41 + 1) }).await;
        assert_eq!(value.unwrap(), 42);

        let failed = limiter
            .run(async { Err::<u32, _>(Error::operation("complete", "boom")) })
            .await;
        assert!(failed.is_err());
        assert_eq!(limiter.available_permits(), 2);
    }

    #[tokio::test]
    async fn test_slot_held_while_running() {
        let limiter = ConcurrencyLimiter::new(1);
        let observer = limiter.clone();

        let value = limiter
            .run(async move {
                assert_eq!(observer.in_flight(), 1);
                assert_eq!(observer.available_permits(), 0);
                Ok::<_, Error>(())
            })
            .await;
        assert!(value.is_ok());
        assert_eq!(limiter.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_excess_callers_wait_for_a_slot() {
        let limiter = ConcurrencyLimiter::new(1);

        let first = {
            let limiter = limiter.clone();
            tokio::spawn(async move {
                limiter
                    .run(async {
                        tokio::time::sleep(Duration::from_secs(1)).await;
                        Ok::<_, Error>(1)
                    })
                    .await
            })
        };
        tokio::task::yield_now().await;
        assert_eq!(limiter.available_permits(), 0);

        let start = tokio::time::Instant::now();
        let second = limiter.run(async { Ok::<_, Error>(2) }).await;
        assert_eq!(second.unwrap(), 2);
        assert!(start.elapsed() >= Duration::from_millis(900));
        assert_eq!(first.await.unwrap().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_closed_limiter_rejects() {
        let limiter = ConcurrencyLimiter::new(1);
        limiter.close();
        let result = limiter.run(async { Ok::<_, Error>(()) }).await;
        assert!(matches!(result, Err(Error::OperationFailed { .. })));
    }
}
