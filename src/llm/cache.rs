//! Completion response cache.
//!
//! An in-memory LRU cache with TTL-based expiration. Expiry is checked lazily
//! on read; there is no background sweep.

use lru::LruCache;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Number of hex characters of the options digest kept in a key.
const DIGEST_HEX_LEN: usize = 16;

/// Deterministic identity of a logical request.
///
/// Format: `{skill}:{id,id,...}:{digest}` where the digest is a truncated
/// SHA-256 of the JSON serialization of the options record. Backslashes and
/// commas inside an id are escaped, so `["a,b"]` and `["a", "b"]` differ. Struct fields
/// serialize in declaration order, so equal options always give equal keys
/// and any changed option (including the model) gives a different one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derives a key from a skill name, subject ids and an options record.
    pub fn new<O: Serialize + ?Sized>(skill: &str, subject_ids: &[&str], options: &O) -> Self {
        let serialized = serde_json::to_string(options).unwrap_or_default();
        let digest = hex::encode(Sha256::digest(serialized.as_bytes()));
        let ids: Vec<String> = subject_ids.iter().map(|id| escape_id(id)).collect();
        Self(format!("{skill}:{}:{}", ids.join(","), &digest[..DIGEST_HEX_LEN]))
    }

    /// Wraps an already-formed key.
    pub fn from_raw(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn escape_id(id: &str) -> String {
    id.replace('\\', "\\\\").replace(',', "\\,")
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Entry in the response cache.
#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
}

/// Bounded, expiring cache of completion responses.
///
/// # How it works
///
/// 1. `set` inserts or overwrites, evicting the least recently used entry
///    when the cache is full
/// 2. `get` returns a clone of the value if present and younger than the TTL,
///    refreshing its recency
/// 3. An expired entry found by `get` is removed and reported as a miss
///
/// # Lock Poisoning
///
/// A poisoned lock is recovered rather than propagated; the cache holds no
/// invariant that a panicking writer could break half-way.
pub struct ResponseCache<V> {
    cache: Mutex<LruCache<String, CacheEntry<V>>>,
    ttl: Duration,
}

impl<V: Clone> ResponseCache<V> {
    /// Creates a cache holding at most `capacity` entries for `ttl` each.
    ///
    /// A capacity of zero is treated as one.
    #[must_use]
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Mutex::new(LruCache::new(cap)),
            ttl,
        }
    }

    /// Returns the cached value for `key` if present and not expired.
    pub fn get(&self, key: &CacheKey) -> Option<V> {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);

        let (value, expired) = match cache.get(key.as_str()) {
            Some(entry) => (
                Some(entry.value.clone()),
                entry.inserted_at.elapsed() > self.ttl,
            ),
            None => (None, false),
        };

        if expired {
            cache.pop(key.as_str());
            metrics::gauge!("ai_cache_size").set(cache.len() as f64);
            metrics::counter!("ai_cache_requests_total", "result" => "expired").increment(1);
            tracing::debug!(cache_key = %key, "Cache entry expired");
            return None;
        }

        let result = if value.is_some() { "hit" } else { "miss" };
        metrics::counter!("ai_cache_requests_total", "result" => result).increment(1);
        value
    }

    /// Stores `value` under `key`, evicting the least recently used entry if full.
    pub fn set(&self, key: &CacheKey, value: V) {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        let evicted = cache.push(
            key.as_str().to_string(),
            CacheEntry {
                value,
                inserted_at: Instant::now(),
            },
        );

        if let Some((evicted_key, _)) = evicted.filter(|(k, _)| k != key.as_str()) {
            tracing::debug!(evicted = %evicted_key, "Evicted least recently used cache entry");
        }
        metrics::gauge!("ai_cache_size").set(cache.len() as f64);
    }

    /// Removes every entry.
    pub fn clear(&self) {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache.clear();
        metrics::gauge!("ai_cache_size").set(0.0);
    }

    /// Returns the number of stored entries, including expired ones not yet read.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns true if the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the configured capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cap()
            .get()
    }

    /// Returns the configured TTL.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }
}
