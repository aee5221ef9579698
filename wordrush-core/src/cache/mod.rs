//! Rate-limited read cache.
//!
//! Sits in front of every ledger read: serves live entries from memory,
//! collapses concurrent requests for the same key into one fetch, and delays
//! (never drops) new fetches so the upstream request budget is respected.

pub mod throttle;

pub use throttle::RateWindow;

use crate::error::{GameError, Result};
use crate::ledger::LedgerError;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Configuration for the request cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// TTL for operations without an override.
    pub default_ttl: Duration,
    /// Maximum physical fetches per `window`.
    pub max_requests_per_window: usize,
    pub window: Duration,
    /// Minimum spacing between two physical fetches.
    pub min_request_interval: Duration,
    /// Per-operation TTLs, keyed by contract function name.
    pub ttl_overrides: HashMap<String, Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        let ttl_overrides = [
            ("has-active-game", 5),
            ("get-active-game", 5),
            ("get-player-stats", 30),
            ("get-bounty", 15),
            ("get-total-words", 300),
            ("get-user", 60),
        ]
        .into_iter()
        .map(|(op, secs)| (op.to_string(), Duration::from_secs(secs)))
        .collect();

        Self {
            default_ttl: Duration::from_secs(10),
            max_requests_per_window: 50,
            window: Duration::from_secs(60),
            min_request_interval: Duration::from_millis(1200),
            ttl_overrides,
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rate_limit(mut self, max_requests: usize, window: Duration) -> Self {
        self.max_requests_per_window = max_requests;
        self.window = window;
        self
    }

    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.min_request_interval = interval;
        self
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn with_ttl(mut self, operation: &str, ttl: Duration) -> Self {
        self.ttl_overrides.insert(operation.to_string(), ttl);
        self
    }

    pub fn ttl_for(&self, operation: &str) -> Duration {
        self.ttl_overrides
            .get(operation)
            .copied()
            .unwrap_or(self.default_ttl)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_requests_per_window == 0 {
            return Err(GameError::config("Request limit must be greater than 0"));
        }

        if self.window.is_zero() {
            return Err(GameError::config("Rate window must be greater than 0"));
        }

        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub key: String,
    pub value: V,
    pub stored_at: Instant,
    pub expires_at: Instant,
}

impl<V> CacheEntry<V> {
    pub fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Cache statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub pending_requests: usize,
    pub requests_in_window: usize,
    pub max_requests_per_window: usize,
}

type FetchResult<V> = std::result::Result<V, LedgerError>;
type InFlight<V> = Shared<BoxFuture<'static, FetchResult<V>>>;

struct PendingRequest<V> {
    ticket: u64,
    in_flight: InFlight<V>,
}

struct CacheState<V> {
    entries: HashMap<String, CacheEntry<V>>,
    pending: HashMap<String, PendingRequest<V>>,
}

struct CacheInner<V> {
    state: Mutex<CacheState<V>>,
    throttle: RateWindow,
    config: CacheConfig,
    next_ticket: AtomicU64,
}

/// TTL cache with request deduplication and throttling.
///
/// Cloning is cheap and every clone shares the same tables, so one instance
/// can be handed to every component that reads from the ledger.
pub struct RequestCache<V> {
    inner: Arc<CacheInner<V>>,
}

impl<V> Clone for RequestCache<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> RequestCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(config: CacheConfig) -> Self {
        let throttle = RateWindow::new(
            config.max_requests_per_window,
            config.window,
            config.min_request_interval,
        );

        Self {
            inner: Arc::new(CacheInner {
                state: Mutex::new(CacheState {
                    entries: HashMap::new(),
                    pending: HashMap::new(),
                }),
                throttle,
                config,
                next_ticket: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    pub fn ttl_for(&self, operation: &str) -> Duration {
        self.inner.config.ttl_for(operation)
    }

    /// Return the cached value for `key`, joining an in-flight fetch if one
    /// exists, or fetch it once the throttle admits a new request.
    pub async fn get_cached<F, Fut>(&self, key: &str, fetch: F, ttl: Duration) -> FetchResult<V>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = FetchResult<V>> + Send + 'static,
    {
        let in_flight = {
            let mut state = self.inner.state.lock();

            if let Some(entry) = state.entries.get(key) {
                if entry.is_live(Instant::now()) {
                    tracing::debug!("[Cache HIT] {}", key);
                    return Ok(entry.value.clone());
                }
            }

            match state.pending.get(key) {
                Some(pending) => {
                    tracing::debug!("[Request DEDUPE] {}", key);
                    pending.in_flight.clone()
                }
                None => {
                    let ticket = self.inner.next_ticket.fetch_add(1, Ordering::Relaxed);
                    let in_flight = Self::spawn_fetch(
                        Arc::clone(&self.inner),
                        key.to_string(),
                        ticket,
                        fetch,
                        ttl,
                    );
                    state.pending.insert(
                        key.to_string(),
                        PendingRequest {
                            ticket,
                            in_flight: in_flight.clone(),
                        },
                    );
                    in_flight
                }
            }
        };

        in_flight.await
    }

    fn spawn_fetch<F, Fut>(
        inner: Arc<CacheInner<V>>,
        key: String,
        ticket: u64,
        fetch: F,
        ttl: Duration,
    ) -> InFlight<V>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = FetchResult<V>> + Send + 'static,
    {
        // Runs on its own task so the fetch settles, and releases its pending
        // slot, even when every waiter is dropped first.
        let task = tokio::spawn(async move {
            let guard = PendingGuard {
                inner: Arc::clone(&inner),
                key: key.clone(),
                ticket,
            };

            inner.throttle.admit().await;

            tracing::debug!("[Cache MISS] Fetching: {}", key);
            let result = fetch().await;
            let result = inner.complete(&key, ticket, result, ttl);

            drop(guard);
            result
        });

        async move {
            task.await
                .unwrap_or_else(|e| Err(LedgerError::network(format!("Fetch task failed: {}", e))))
        }
        .boxed()
        .shared()
    }

    /// Remove one entry. An in-flight fetch for the key is detached: its
    /// waiters still get the result but it is not stored.
    pub fn invalidate(&self, key: &str) {
        let mut state = self.inner.state.lock();
        state.entries.remove(key);
        state.pending.remove(key);
        tracing::debug!("[Cache] Invalidated: {}", key);
    }

    /// Remove every entry whose key contains `pattern`. Returns the number of
    /// stored entries removed.
    pub fn invalidate_pattern(&self, pattern: &str) -> usize {
        let mut state = self.inner.state.lock();
        let before = state.entries.len();
        state.entries.retain(|key, _| !key.contains(pattern));
        state.pending.retain(|key, _| !key.contains(pattern));
        let removed = before - state.entries.len();

        if removed > 0 {
            tracing::debug!("[Cache] Invalidated {} entries matching {}", removed, pattern);
        }
        removed
    }

    /// Drop expired entries. Stale entries are otherwise kept around as a
    /// fallback for rate-limited fetches.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut state = self.inner.state.lock();
        let before = state.entries.len();
        state.entries.retain(|_, entry| entry.is_live(now));
        before - state.entries.len()
    }

    pub async fn clear_all(&self) {
        {
            let mut state = self.inner.state.lock();
            state.entries.clear();
            state.pending.clear();
        }
        self.inner.throttle.reset().await;
        tracing::info!("[Cache] Cleared all cache");
    }

    pub async fn stats(&self) -> CacheStats {
        let (entries, pending_requests) = {
            let state = self.inner.state.lock();
            (state.entries.len(), state.pending.len())
        };

        CacheStats {
            entries,
            pending_requests,
            requests_in_window: self.inner.throttle.requests_in_window().await,
            max_requests_per_window: self.inner.throttle.max_requests(),
        }
    }
}

impl<V: Clone> CacheInner<V> {
    fn complete(
        &self,
        key: &str,
        ticket: u64,
        result: FetchResult<V>,
        ttl: Duration,
    ) -> FetchResult<V> {
        let mut state = self.state.lock();
        let registered = state
            .pending
            .get(key)
            .is_some_and(|pending| pending.ticket == ticket);
        if registered {
            state.pending.remove(key);
        }

        match result {
            Ok(value) => {
                if registered {
                    let now = Instant::now();
                    state.entries.insert(
                        key.to_string(),
                        CacheEntry {
                            key: key.to_string(),
                            value: value.clone(),
                            stored_at: now,
                            expires_at: now + ttl,
                        },
                    );
                }
                Ok(value)
            }
            Err(err) if err.is_rate_limited() => match state.entries.get(key) {
                Some(stale) => {
                    tracing::warn!("[Rate Limit] Serving stale value for {}", key);
                    Ok(stale.value.clone())
                }
                None => Err(err),
            },
            Err(err) => Err(err),
        }
    }
}

/// Clears the pending slot however the fetch task ends.
struct PendingGuard<V> {
    inner: Arc<CacheInner<V>>,
    key: String,
    ticket: u64,
}

impl<V> Drop for PendingGuard<V> {
    fn drop(&mut self) {
        let mut state = self.inner.state.lock();
        if state
            .pending
            .get(&self.key)
            .is_some_and(|pending| pending.ticket == self.ticket)
        {
            state.pending.remove(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn unthrottled() -> CacheConfig {
        CacheConfig::new()
            .with_min_interval(Duration::ZERO)
            .with_default_ttl(Duration::from_secs(5))
    }

    fn counting_fetch(
        counter: Arc<AtomicUsize>,
        value: u32,
    ) -> impl FnOnce() -> BoxFuture<'static, FetchResult<u32>> {
        move || {
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(500)).await;
                Ok(value)
            }
            .boxed()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_hit_skips_fetch() {
        let cache = RequestCache::new(unthrottled());
        let counter = Arc::new(AtomicUsize::new(0));
        let ttl = Duration::from_secs(5);

        let first = cache
            .get_cached("k", counting_fetch(counter.clone(), 7), ttl)
            .await
            .unwrap();
        let second = cache
            .get_cached("k", counting_fetch(counter.clone(), 8), ttl)
            .await
            .unwrap();

        assert_eq!(first, 7);
        assert_eq!(second, 7);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_requests_share_one_fetch() {
        let cache = RequestCache::new(unthrottled());
        let counter = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = cache.clone();
                let counter = counter.clone();
                tokio::spawn(async move {
                    cache
                        .get_cached("has-active-game", counting_fetch(counter, i), Duration::from_secs(5))
                        .await
                })
            })
            .collect();

        let mut values = Vec::new();
        for handle in handles {
            values.push(handle.await.unwrap().unwrap());
        }

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(values.iter().all(|v| *v == values[0]));
        assert_eq!(cache.stats().await.pending_requests, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_exactly_at_expires_at() {
        let cache = RequestCache::new(unthrottled());
        let counter = Arc::new(AtomicUsize::new(0));
        let ttl = Duration::from_secs(5);

        cache
            .get_cached("k", counting_fetch(counter.clone(), 1), ttl)
            .await
            .unwrap();

        tokio::time::advance(ttl - Duration::from_millis(1)).await;
        let value = cache
            .get_cached("k", counting_fetch(counter.clone(), 2), ttl)
            .await
            .unwrap();
        assert_eq!(value, 1);
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_millis(1)).await;
        let value = cache
            .get_cached("k", counting_fetch(counter.clone(), 2), ttl)
            .await
            .unwrap();
        assert_eq!(value, 2);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_fetch_serves_stale_value() {
        let cache = RequestCache::new(unthrottled());
        let ttl = Duration::from_secs(5);

        cache
            .get_cached("k", || async { Ok(42u32) }, ttl)
            .await
            .unwrap();
        tokio::time::advance(ttl * 2).await;

        let value = cache
            .get_cached(
                "k",
                || async { Err(LedgerError::network("HTTP 429 Too Many Requests")) },
                ttl,
            )
            .await;
        assert_eq!(value, Ok(42));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_fetch_without_stale_value_fails() {
        let cache: RequestCache<u32> = RequestCache::new(unthrottled());

        let value = cache
            .get_cached(
                "k",
                || async { Err(LedgerError::RateLimited("rate limit".to_string())) },
                Duration::from_secs(5),
            )
            .await;
        assert!(matches!(value, Err(LedgerError::RateLimited(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_errors_propagate_and_clear_pending() {
        let cache = RequestCache::new(unthrottled());
        let ttl = Duration::from_secs(5);

        cache.get_cached("k", || async { Ok(1u32) }, ttl).await.unwrap();
        tokio::time::advance(ttl).await;

        let value = cache
            .get_cached("k", || async { Err(LedgerError::network("connection reset")) }, ttl)
            .await;
        assert_eq!(value, Err(LedgerError::network("connection reset")));
        assert_eq!(cache.stats().await.pending_requests, 0);

        let value = cache.get_cached("k", || async { Ok(3u32) }, ttl).await;
        assert_eq!(value, Ok(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_count_never_exceeds_window_limit() {
        let config = CacheConfig::new()
            .with_rate_limit(5, Duration::from_secs(60))
            .with_min_interval(Duration::ZERO);
        let cache = RequestCache::new(config);
        let fetched_at = Arc::new(Mutex::new(Vec::new()));

        let handles: Vec<_> = (0..12u32)
            .map(|i| {
                let cache = cache.clone();
                let fetched_at = fetched_at.clone();
                tokio::spawn(async move {
                    let key = format!("key-{}", i);
                    cache
                        .get_cached(
                            &key,
                            move || async move {
                                fetched_at.lock().push(Instant::now());
                                Ok(i)
                            },
                            Duration::from_secs(5),
                        )
                        .await
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let times = fetched_at.lock().clone();
        assert_eq!(times.len(), 12);
        for start in &times {
            let in_window = times
                .iter()
                .filter(|t| **t >= *start && t.duration_since(*start) < Duration::from_secs(60))
                .count();
            assert!(in_window <= 5, "{} fetches within one window", in_window);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_pattern_forces_refetch() {
        let cache = RequestCache::new(unthrottled());
        let counter = Arc::new(AtomicUsize::new(0));
        let ttl = Duration::from_secs(60);

        cache
            .get_cached("get-active-game:ST1PLAYER", counting_fetch(counter.clone(), 1), ttl)
            .await
            .unwrap();
        cache
            .get_cached("get-total-words:", counting_fetch(counter.clone(), 9), ttl)
            .await
            .unwrap();

        assert_eq!(cache.invalidate_pattern("ST1PLAYER"), 1);
        assert_eq!(cache.stats().await.entries, 1);

        let value = cache
            .get_cached("get-active-game:ST1PLAYER", counting_fetch(counter.clone(), 2), ttl)
            .await
            .unwrap();
        assert_eq!(value, 2);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidated_in_flight_result_is_not_stored() {
        let cache = RequestCache::new(unthrottled());
        let counter = Arc::new(AtomicUsize::new(0));
        let ttl = Duration::from_secs(60);

        let reader = {
            let cache = cache.clone();
            let counter = counter.clone();
            tokio::spawn(async move { cache.get_cached("k", counting_fetch(counter, 1), ttl).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        cache.invalidate("k");

        assert_eq!(reader.await.unwrap(), Ok(1));
        assert_eq!(cache.stats().await.entries, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let cache = RequestCache::new(unthrottled());
        cache
            .get_cached("short", || async { Ok(1u32) }, Duration::from_secs(1))
            .await
            .unwrap();
        cache
            .get_cached("long", || async { Ok(2u32) }, Duration::from_secs(100))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.stats().await.entries, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_reader_does_not_stall_other_keys() {
        let cache = RequestCache::new(CacheConfig::new());
        let counter = Arc::new(AtomicUsize::new(0));
        let ttl = Duration::from_secs(60);

        cache
            .get_cached("first", counting_fetch(counter.clone(), 1), ttl)
            .await
            .unwrap();

        // Still inside the minimum spacing, so this reader waits on the throttle.
        let abandoned = {
            let cache = cache.clone();
            let counter = counter.clone();
            tokio::spawn(async move {
                cache
                    .get_cached("abandoned", counting_fetch(counter, 2), ttl)
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        abandoned.abort();

        let other = tokio::time::timeout(
            Duration::from_secs(600),
            cache.get_cached("other", counting_fetch(counter.clone(), 3), ttl),
        )
        .await;
        assert_eq!(other, Ok(Ok(3)));

        // The abandoned fetch still completed and was cached.
        let stats = cache.stats().await;
        assert_eq!(stats.pending_requests, 0);
        assert_eq!(stats.entries, 3);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_ttl_lookup_falls_back_to_default() {
        let config = CacheConfig::default();
        assert_eq!(config.ttl_for("has-active-game"), Duration::from_secs(5));
        assert_eq!(config.ttl_for("get-total-words"), Duration::from_secs(300));
        assert_eq!(config.ttl_for("get-word-at-index"), Duration::from_secs(10));
    }
}
