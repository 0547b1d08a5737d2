//! Request executor integration tests.
//!
//! Exercises the cache, limiter and retry layers together through the public
//! API, on a real clock:
//! - Concurrency bound under load
//! - Cache hits, expiry and key isolation
//! - Retry then success, retry exhaustion

// Integration tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used)]

use mailsage::llm::{CacheKey, ConcurrencyLimiter, RequestExecutor, ResponseCache, RetryPolicy};
use mailsage::{Error, OrchestratorConfig};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::task::JoinSet;

// ============================================================================
// Test Helpers
// ============================================================================

/// Fast retries so real-clock tests stay quick.
const FAST_RETRY: RetryPolicy = RetryPolicy {
    attempts: 3,
    base_delay: Duration::from_millis(5),
    attempt_timeout: None,
};

fn executor(max_concurrent: usize, ttl: Duration) -> RequestExecutor<String> {
    RequestExecutor::from_parts(
        ResponseCache::new(100, ttl),
        ConcurrencyLimiter::new(max_concurrent),
        FAST_RETRY,
    )
}

/// Tracks current and peak concurrency of running tasks.
#[derive(Default)]
struct InFlight {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl InFlight {
    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_in_flight_never_exceeds_limit() {
    const LIMIT: usize = 3;
    const CALLERS: usize = 12;

    let executor = Arc::new(executor(LIMIT, Duration::from_secs(60)));
    let tracker = Arc::new(InFlight::default());
    let mut set = JoinSet::new();

    for i in 0..CALLERS {
        let executor = Arc::clone(&executor);
        let tracker = Arc::clone(&tracker);
        set.spawn(async move {
            executor
                .execute(None, || {
                    let tracker = Arc::clone(&tracker);
                    async move {
                        tracker.enter();
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        tracker.exit();
                        Ok(format!("done {i}"))
                    }
                })
                .await
        });
    }

    let mut completed = 0;
    while let Some(joined) = set.join_next().await {
        assert!(joined.unwrap().is_ok());
        completed += 1;
    }

    assert_eq!(completed, CALLERS);
    assert!(tracker.peak.load(Ordering::SeqCst) <= LIMIT);
    assert_eq!(tracker.peak.load(Ordering::SeqCst), LIMIT);
    assert_eq!(executor.limiter().in_flight(), 0);
    assert_eq!(executor.limiter().available_permits(), LIMIT);
}

#[tokio::test]
async fn test_slot_is_held_across_retries() {
    let executor = Arc::new(executor(1, Duration::from_secs(60)));
    let tracker = Arc::new(InFlight::default());
    let calls = Arc::new(AtomicUsize::new(0));

    let mut set = JoinSet::new();
    for _ in 0..2 {
        let executor = Arc::clone(&executor);
        let tracker = Arc::clone(&tracker);
        let calls = Arc::clone(&calls);
        set.spawn(async move {
            let mut attempt = 0;
            executor
                .execute(None, || {
                    attempt += 1;
                    let failing = attempt == 1;
                    let tracker = Arc::clone(&tracker);
                    let calls = Arc::clone(&calls);
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tracker.enter();
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        tracker.exit();
                        if failing {
                            Err(Error::operation("complete", "flaky"))
                        } else {
                            Ok("ok".to_string())
                        }
                    }
                })
                .await
        });
    }

    while let Some(joined) = set.join_next().await {
        assert_eq!(joined.unwrap().unwrap(), "ok");
    }
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert_eq!(tracker.peak.load(Ordering::SeqCst), 1);
}

// ============================================================================
// Caching
// ============================================================================

#[tokio::test]
async fn test_repeat_request_is_served_from_cache() {
    let executor = executor(2, Duration::from_secs(60));
    let key = CacheKey::new("summary", &["thread-1"], &("opts", 1));
    let calls = AtomicUsize::new(0);

    for _ in 0..3 {
        let value = executor
            .execute(Some(&key), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok("fresh".to_string()) }
            })
            .await
            .unwrap();
        assert_eq!(value, "fresh");
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(executor.cache().len(), 1);
}

#[tokio::test]
async fn test_expired_entry_is_recomputed() {
    let executor = executor(2, Duration::from_millis(40));
    let key = CacheKey::from_raw("reply:m1:abc");
    let calls = AtomicUsize::new(0);

    assert_eq!(numbered(&executor, &key, &calls).await, "value 1");
    assert_eq!(numbered(&executor, &key, &calls).await, "value 1");
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_eq!(numbered(&executor, &key, &calls).await, "value 2");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

/// Executes a task that returns the running call count.
async fn numbered(
    executor: &RequestExecutor<String>,
    key: &CacheKey,
    calls: &AtomicUsize,
) -> String {
    executor
        .execute(Some(key), || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move { Ok(format!("value {n}")) }
        })
        .await
        .unwrap()
}

#[tokio::test]
async fn test_distinct_options_do_not_share_entries() {
    let executor = executor(2, Duration::from_secs(60));
    let short = CacheKey::new("reply", &["m1"], &("short", "gpt-4o"));
    let long = CacheKey::new("reply", &["m1"], &("long", "gpt-4o"));
    assert_ne!(short, long);

    let a = executor
        .execute(Some(&short), || async { Ok("short reply".to_string()) })
        .await
        .unwrap();
    let b = executor
        .execute(Some(&long), || async { Ok("long reply".to_string()) })
        .await
        .unwrap();

    assert_eq!(a, "short reply");
    assert_eq!(b, "long reply");
    assert_eq!(executor.cache().len(), 2);
}

// ============================================================================
// Retry
// ============================================================================

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let executor = executor(1, Duration::from_secs(60));
    let calls = AtomicUsize::new(0);

    let value = executor
        .execute(None, || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 3 {
                    Err(Error::operation("complete", format!("503 on call {n}")))
                } else {
                    Ok("recovered".to_string())
                }
            }
        })
        .await
        .unwrap();

    assert_eq!(value, "recovered");
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_exhaustion_surfaces_last_error_and_caches_nothing() {
    let executor = executor(1, Duration::from_secs(60));
    let key = CacheKey::from_raw("sentiment:m9:def");
    let calls = AtomicUsize::new(0);

    let err = executor
        .execute(Some(&key), || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move { Err::<String, _>(Error::operation("complete", format!("down {n}"))) }
        })
        .await
        .unwrap_err();

    assert!(err.to_string().contains("down 3"));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert!(executor.cache().is_empty());
    assert_eq!(executor.limiter().in_flight(), 0);
}

#[tokio::test]
async fn test_executor_from_config_applies_settings() {
    let config = OrchestratorConfig::default()
        .with_max_concurrent(4)
        .with_cache_capacity(7)
        .with_retry_attempts(5);
    let executor: RequestExecutor<String> = RequestExecutor::new(&config);

    assert_eq!(executor.limiter().max_concurrent(), 4);
    assert_eq!(executor.cache().capacity(), 7);
    assert_eq!(executor.retry_policy().attempts, 5);
}
