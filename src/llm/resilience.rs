//! Resilient execution of completion calls.
//!
//! # Retry Strategy
//!
//! Every call gets a bounded number of attempts with exponential backoff:
//! - Attempts: 3
//! - Base delay: 1 second
//! - Delays: 1s, 2s (no wait after the final attempt)
//!
//! The retry loop runs inside one [`ConcurrencyLimiter`] slot, so a caller
//! holds its slot for its whole retry sequence. Cache hits never touch the
//! limiter.
//!
//! The executor is deliberately unaware of models: degrading to a fallback
//! model after exhaustion is the skill pipelines' decision.

use super::{CacheKey, Completion, ConcurrencyLimiter, ResponseCache};
use crate::config::OrchestratorConfig;
use crate::{Error, Result};
use std::future::Future;
use std::time::{Duration, Instant};

/// Retry and deadline settings for one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first (minimum 1).
    pub attempts: u32,
    /// Base delay for exponential backoff.
    pub base_delay: Duration,
    /// Deadline for a single attempt (`None` = unbounded).
    pub attempt_timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_millis(1000),
            attempt_timeout: Some(Duration::from_secs(60)),
        }
    }
}

impl RetryPolicy {
    /// Builds a policy from orchestrator configuration.
    #[must_use]
    pub const fn from_config(config: &OrchestratorConfig) -> Self {
        Self {
            attempts: if config.retry_attempts == 0 {
                1
            } else {
                config.retry_attempts
            },
            base_delay: Duration::from_millis(config.retry_delay_ms),
            attempt_timeout: if config.attempt_timeout_ms == 0 {
                None
            } else {
                Some(Duration::from_millis(config.attempt_timeout_ms))
            },
        }
    }

    /// Calculates the wait after a failed attempt.
    ///
    /// Formula: `base_delay * 2^(attempt - 1)`, with `attempt` 1-based.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        self.base_delay
            .saturating_mul(1 << (attempt - 1).min(10))
    }
}

/// Cache + bulkhead + retry around a unit of work.
///
/// One instance is constructed at startup and shared (behind an `Arc`) by all
/// pipelines, so they share one cache and one concurrency budget.
pub struct RequestExecutor<V> {
    cache: ResponseCache<V>,
    limiter: ConcurrencyLimiter,
    retry: RetryPolicy,
}

/// The executor used by the skill pipelines, caching raw completions.
pub type Orchestrator = RequestExecutor<Completion>;

impl<V: Clone> RequestExecutor<V> {
    /// Creates an executor from configuration.
    #[must_use]
    pub fn new(config: &OrchestratorConfig) -> Self {
        Self::from_parts(
            ResponseCache::new(
                config.cache_capacity,
                Duration::from_secs(config.cache_ttl_secs),
            ),
            ConcurrencyLimiter::new(config.max_concurrent),
            RetryPolicy::from_config(config),
        )
    }

    /// Creates an executor from prebuilt components.
    #[must_use]
    pub const fn from_parts(
        cache: ResponseCache<V>,
        limiter: ConcurrencyLimiter,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            cache,
            limiter,
            retry,
        }
    }

    /// Returns the response cache.
    #[must_use]
    pub const fn cache(&self) -> &ResponseCache<V> {
        &self.cache
    }

    /// Returns the concurrency limiter.
    #[must_use]
    pub const fn limiter(&self) -> &ConcurrencyLimiter {
        &self.limiter
    }

    /// Returns the retry policy.
    #[must_use]
    pub const fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Executes `task` with caching, bounded concurrency and retries.
    ///
    /// 1. A cached value for `cache_key` is returned immediately.
    /// 2. Otherwise a limiter slot is acquired and `task` is attempted up to
    ///    [`RetryPolicy::attempts`] times with exponential backoff between
    ///    attempts.
    /// 3. A successful value is cached under `cache_key` before returning.
    ///
    /// `task` is invoked once per attempt and must produce a fresh future each
    /// time.
    ///
    /// # Errors
    ///
    /// Returns the last attempt's error once all attempts have failed.
    pub async fn execute<F, Fut>(&self, cache_key: Option<&CacheKey>, task: F) -> Result<V>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        if let Some(key) = cache_key {
            if let Some(cached) = self.cache.get(key) {
                tracing::debug!(cache_key = %key, "Serving completion from cache");
                return Ok(cached);
            }
        }

        let value = self
            .limiter
            .run(self.attempt_with_retry(cache_key, task))
            .await?;

        if let Some(key) = cache_key {
            self.cache.set(key, value.clone());
        }
        Ok(value)
    }

    async fn attempt_with_retry<F, Fut>(
        &self,
        cache_key: Option<&CacheKey>,
        mut task: F,
    ) -> Result<V>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        let max_attempts = self.retry.attempts.max(1);
        let key = cache_key.map_or("", CacheKey::as_str);
        let mut attempt = 1;

        loop {
            let start = Instant::now();
            let outcome = self.attempt_once(&mut task).await;
            let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

            match outcome {
                Ok(value) => {
                    tracing::info!(
                        cache_key = key,
                        attempt,
                        max_attempts,
                        elapsed_ms,
                        "Completion attempt succeeded"
                    );
                    record_attempt("success", elapsed_ms);
                    return Ok(value);
                },
                Err(err) if attempt < max_attempts => {
                    let delay = self.retry.delay_for_attempt(attempt);
                    tracing::warn!(
                        cache_key = key,
                        attempt,
                        max_attempts,
                        elapsed_ms,
                        retry_in_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "Completion attempt failed, retrying"
                    );
                    record_attempt("error", elapsed_ms);
                    metrics::counter!("ai_retries_total").increment(1);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                },
                Err(err) => {
                    tracing::error!(
                        cache_key = key,
                        attempt,
                        max_attempts,
                        elapsed_ms,
                        error = %err,
                        "Completion failed after all attempts"
                    );
                    record_attempt("exhausted", elapsed_ms);
                    return Err(err);
                },
            }
        }
    }

    async fn attempt_once<F, Fut>(&self, task: &mut F) -> Result<V>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        match self.retry.attempt_timeout {
            Some(deadline) => tokio::time::timeout(deadline, task())
                .await
                .unwrap_or_else(|_| {
                    Err(Error::operation(
                        "completion_attempt",
                        format!("timed out after {}ms", deadline.as_millis()),
                    ))
                }),
            None => task().await,
        }
    }
}

fn record_attempt(status: &'static str, elapsed_ms: f64) {
    metrics::counter!("ai_requests_total", "status" => status).increment(1);
    metrics::histogram!("ai_request_duration_ms", "status" => status).record(elapsed_ms);
}
