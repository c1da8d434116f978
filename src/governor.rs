//! Request Governance
//!
//! Wraps calls to the external generation function with a fixed-window rate
//! limiter and a content-addressed result cache. The generator itself is
//! caller-supplied and opaque; the governor only decides whether a call may
//! go out and remembers what came back.
//!
//! ## Invariants
//!
//! - A cache hit never consumes quota and never calls the generator
//! - A failed generation consumes quota but never populates the cache
//!   (the upstream provider bills failed attempts too)
//! - The state lock is never held across the generation await
//!
//! The cache is unbounded by design: the reference behavior never evicts,
//! and entries live until process restart. Callers with long-lived processes
//! should clear it explicitly via [`RequestGovernor::clear_cache`].

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::constants::governor as governor_constants;
use crate::types::error::{GenerationError, GovernError};
use crate::types::{QuoteError, Result};

// =============================================================================
// Configuration
// =============================================================================

/// Fixed-window rate limiter configuration
#[derive(Debug, Clone)]
pub struct GovernorConfig {
    /// Window duration
    pub window: Duration,
    /// Maximum generation calls per window
    pub max_per_window: u32,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(governor_constants::DEFAULT_WINDOW_SECS),
            max_per_window: governor_constants::DEFAULT_MAX_PER_WINDOW,
        }
    }
}

impl GovernorConfig {
    pub fn new(window: Duration, max_per_window: u32) -> Self {
        Self {
            window,
            max_per_window,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.window.is_zero() {
            return Err(QuoteError::Config(
                "governor window must be non-zero".to_string(),
            ));
        }
        if self.max_per_window == 0 {
            return Err(QuoteError::Config(format!(
                "max_per_window must be at least 1, got {}",
                self.max_per_window
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Internal State
// =============================================================================

/// One cached generation result. Payloads are owned strings, so every read
/// hands the caller an independent copy.
#[derive(Debug, Clone)]
struct CacheEntry {
    payload: String,
    created_at: Instant,
}

/// Unified mutable state - window and cache behind one lock so that
/// check-then-increment and check-then-insert stay atomic.
#[derive(Debug)]
struct GovernorInner {
    window_start: Instant,
    count: u32,
    cache: HashMap<String, CacheEntry>,
    cache_hits: u64,
    cache_misses: u64,
    blocked: u64,
}

impl GovernorInner {
    fn new(now: Instant) -> Self {
        Self {
            window_start: now,
            count: 0,
            cache: HashMap::new(),
            cache_hits: 0,
            cache_misses: 0,
            blocked: 0,
        }
    }

    /// Window reset as a pure function of elapsed time.
    fn roll_window(&mut self, now: Instant, window: Duration) {
        if now.duration_since(self.window_start) >= window {
            self.window_start = now;
            self.count = 0;
        }
    }
}

/// Point-in-time snapshot of governance counters
#[derive(Debug, Clone, Default)]
pub struct GovernorStats {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub blocked: u64,
    pub cache_entries: usize,
    pub calls_in_window: u32,
}

// =============================================================================
// Request Governor
// =============================================================================

/// Fixed-window rate limiter plus content-addressed cache around an external
/// generation function.
pub struct RequestGovernor {
    config: GovernorConfig,
    inner: Mutex<GovernorInner>,
}

impl RequestGovernor {
    /// Create a governor with the given configuration.
    pub fn new(config: GovernorConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(GovernorInner::new(Instant::now())),
        }
    }

    /// Create with default window and quota.
    pub fn with_defaults() -> Self {
        Self::new(GovernorConfig::default())
    }

    /// Build the normalized cache key for a request: context tag, truncated
    /// lowercased input text, and the requested item count, hashed together.
    pub fn cache_key(context: &str, input: &str, requested_items: u32) -> String {
        let normalized: String = input
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase()
            .chars()
            .take(governor_constants::CACHE_KEY_INPUT_CHARS)
            .collect();
        let mut hasher = Sha256::new();
        hasher.update(context.as_bytes());
        hasher.update(b"|");
        hasher.update(normalized.as_bytes());
        hasher.update(b"|");
        hasher.update(requested_items.to_le_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Call the generation function under cache and quota governance.
    ///
    /// Returns the cached payload when `key` is known. Otherwise consumes one
    /// unit of window quota (or fails with `RateLimited`), awaits `generate`
    /// outside the state lock, and caches a successful result under `key`.
    pub async fn call_with_governance<F, Fut>(
        &self,
        key: &str,
        generate: F,
    ) -> std::result::Result<String, GovernError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<String, GenerationError>>,
    {
        // Phase 1: cache and quota check under the lock.
        {
            let mut inner = self.lock_inner();
            if let Some(entry) = inner.cache.get(key) {
                let payload = entry.payload.clone();
                inner.cache_hits += 1;
                debug!(key, "generation cache hit");
                return Ok(payload);
            }
            inner.cache_misses += 1;

            let now = Instant::now();
            inner.roll_window(now, self.config.window);
            if inner.count >= self.config.max_per_window {
                inner.blocked += 1;
                let elapsed = now.duration_since(inner.window_start);
                let retry_after = self.config.window.saturating_sub(elapsed);
                warn!(?retry_after, "generation call blocked by rate window");
                return Err(GovernError::RateLimited { retry_after });
            }
            // Quota is spent here whether or not the call succeeds; the
            // upstream provider bills failed attempts the same way.
            inner.count += 1;
        }

        // Phase 2: the long-latency call, with no lock held.
        let payload = generate().await?;

        // Phase 3: populate the cache.
        {
            let mut inner = self.lock_inner();
            inner.cache.insert(
                key.to_string(),
                CacheEntry {
                    payload: payload.clone(),
                    created_at: Instant::now(),
                },
            );
        }
        Ok(payload)
    }

    /// Remove every cached entry. The rate window is untouched.
    pub fn clear_cache(&self) {
        self.lock_inner().cache.clear();
    }

    /// Age of the cached entry for `key`, if present.
    pub fn cache_entry_age(&self, key: &str) -> Option<Duration> {
        self.lock_inner()
            .cache
            .get(key)
            .map(|entry| entry.created_at.elapsed())
    }

    /// Snapshot of governance counters.
    pub fn stats(&self) -> GovernorStats {
        let inner = self.lock_inner();
        GovernorStats {
            cache_hits: inner.cache_hits,
            cache_misses: inner.cache_misses,
            blocked: inner.blocked,
            cache_entries: inner.cache.len(),
            calls_in_window: inner.count,
        }
    }

    /// Lock the unified state, recovering from a poisoned lock.
    ///
    /// State here is counters and owned strings; a panic mid-update cannot
    /// leave them structurally broken, so the poisoned value is safe to take.
    fn lock_inner(&self) -> std::sync::MutexGuard<'_, GovernorInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn config(window_ms: u64, max: u32) -> GovernorConfig {
        GovernorConfig::new(Duration::from_millis(window_ms), max)
    }

    #[test]
    fn test_config_validation() {
        assert!(GovernorConfig::default().validate().is_ok());
        assert!(config(0, 5).validate().is_err());
        assert!(config(1000, 0).validate().is_err());
    }

    #[test]
    fn test_cache_key_normalization() {
        let a = RequestGovernor::cache_key("tasks", "Paint   the Fence", 3);
        let b = RequestGovernor::cache_key("tasks", "paint the fence", 3);
        assert_eq!(a, b);

        let different_count = RequestGovernor::cache_key("tasks", "paint the fence", 4);
        assert_ne!(a, different_count);

        let different_context = RequestGovernor::cache_key("narrative", "paint the fence", 3);
        assert_ne!(a, different_context);
    }

    #[tokio::test]
    async fn test_cache_round_trip_skips_generate() {
        let governor = RequestGovernor::new(config(60_000, 10));
        let calls = AtomicU32::new(0);

        let first = governor
            .call_with_governance("k1", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok("payload".to_string()) }
            })
            .await
            .unwrap();

        let mut mutated = first.clone();
        mutated.push_str(" mutated");

        let second = governor
            .call_with_governance("k1", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok("other".to_string()) }
            })
            .await
            .unwrap();

        assert_eq!(first, "payload");
        assert_eq!(second, "payload");
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let stats = governor.stats();
        assert_eq!(stats.cache_hits, 1);
        assert_eq!(stats.cache_misses, 1);
        assert_eq!(stats.cache_entries, 1);
    }

    #[tokio::test]
    async fn test_cache_hit_does_not_consume_quota() {
        let governor = RequestGovernor::new(config(60_000, 1));
        governor
            .call_with_governance("k1", || async { Ok("x".to_string()) })
            .await
            .unwrap();

        // Quota is exhausted, but the cached key still answers.
        for _ in 0..5 {
            let result = governor
                .call_with_governance("k1", || async { Ok("y".to_string()) })
                .await
                .unwrap();
            assert_eq!(result, "x");
        }
        assert_eq!(governor.stats().calls_in_window, 1);
    }

    #[tokio::test]
    async fn test_rate_limit_blocks_excess_calls() {
        let max = 3u32;
        let governor = RequestGovernor::new(config(60_000, max));

        for i in 0..max {
            governor
                .call_with_governance(&format!("k{i}"), || async { Ok("x".to_string()) })
                .await
                .unwrap();
        }

        let blocked = governor
            .call_with_governance("k-extra", || async { Ok("x".to_string()) })
            .await;
        assert!(matches!(blocked, Err(GovernError::RateLimited { .. })));
        assert_eq!(governor.stats().blocked, 1);
    }

    #[tokio::test]
    async fn test_window_reset_allows_new_calls() {
        let governor = RequestGovernor::new(config(50, 1));
        governor
            .call_with_governance("a", || async { Ok("x".to_string()) })
            .await
            .unwrap();

        let blocked = governor
            .call_with_governance("b", || async { Ok("x".to_string()) })
            .await;
        assert!(blocked.is_err());

        tokio::time::sleep(Duration::from_millis(60)).await;

        let allowed = governor
            .call_with_governance("c", || async { Ok("x".to_string()) })
            .await;
        assert!(allowed.is_ok());
    }

    #[tokio::test]
    async fn test_failed_generate_not_cached_but_consumes_quota() {
        let governor = RequestGovernor::new(config(60_000, 2));

        let failed = governor
            .call_with_governance("k1", || async {
                Err(GenerationError::new("upstream down"))
            })
            .await;
        assert!(matches!(failed, Err(GovernError::Generation(_))));
        assert_eq!(governor.stats().cache_entries, 0);
        assert_eq!(governor.stats().calls_in_window, 1);

        // Same key retries with a fresh call since nothing was cached.
        let ok = governor
            .call_with_governance("k1", || async { Ok("recovered".to_string()) })
            .await
            .unwrap();
        assert_eq!(ok, "recovered");
        assert_eq!(governor.stats().calls_in_window, 2);
    }

    #[tokio::test]
    async fn test_clear_cache() {
        let governor = RequestGovernor::new(config(60_000, 10));
        governor
            .call_with_governance("k1", || async { Ok("x".to_string()) })
            .await
            .unwrap();
        assert!(governor.cache_entry_age("k1").is_some());

        governor.clear_cache();
        assert!(governor.cache_entry_age("k1").is_none());
        assert_eq!(governor.stats().cache_entries, 0);
    }
}
