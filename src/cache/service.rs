//! Get-or-produce over the shared entry store.
//!
//! Every production runs as its own spawned task and is registered in an
//! in-flight map keyed by cache key. Callers that arrive while a production
//! is registered attach to it instead of starting another, so any key has at
//! most one running production whether it was started by a miss, an expired
//! entry, a forced refresh, or a stale read. Because the work is detached from
//! the caller, dropping a waiting caller never cancels the production the
//! other waiters depend on.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::future::{BoxFuture, FutureExt, Shared};
use metrics::{counter, histogram};
use regex::Regex;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::config::CacheConfig;
use super::policy::{FetchPolicy, Validation};
use super::store::{CacheEntry, EntryStore, Freshness, PurgeReport};

const METRIC_CACHE_HIT: &str = "folio_cache_hit_total";
const METRIC_CACHE_STALE: &str = "folio_cache_stale_total";
const METRIC_CACHE_MISS: &str = "folio_cache_miss_total";
const METRIC_CACHE_SELF_HEAL: &str = "folio_cache_self_heal_total";
const METRIC_CACHE_VALIDATION_FAILURE: &str = "folio_cache_validation_failure_total";
const METRIC_CACHE_PRODUCE_MS: &str = "folio_cache_produce_ms";

/// Failures raised by the cache itself rather than by a producer.
#[derive(Debug, Clone, Error)]
pub enum CacheFailure {
    #[error("value for `{key}` failed validation: {reason}")]
    Validation { key: String, reason: String },
    #[error("production for `{key}` did not complete: {message}")]
    Aborted { key: String, message: String },
}

struct Flight<V, E> {
    id: u64,
    result: Shared<BoxFuture<'static, Result<V, E>>>,
}

impl<V, E> Clone for Flight<V, E> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            result: self.result.clone(),
        }
    }
}

type InFlight<V, E> = DashMap<String, Flight<V, E>>;

/// Process-wide cache handle. Cloning shares the same store and in-flight map.
pub struct CacheService<V, E> {
    config: CacheConfig,
    store: Arc<EntryStore<V>>,
    inflight: Arc<InFlight<V, E>>,
    next_flight: Arc<AtomicU64>,
}

impl<V, E> Clone for CacheService<V, E> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            store: Arc::clone(&self.store),
            inflight: Arc::clone(&self.inflight),
            next_flight: Arc::clone(&self.next_flight),
        }
    }
}

impl<V, E> CacheService<V, E>
where
    V: Clone + Send + Sync + 'static,
    E: Clone + Display + From<CacheFailure> + Send + Sync + 'static,
{
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            config: config.clone(),
            store: Arc::new(EntryStore::new(config)),
            inflight: Arc::new(DashMap::new()),
            next_flight: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Direct access to the entry store.
    pub fn store(&self) -> &EntryStore<V> {
        &self.store
    }

    /// Default policy derived from the configured windows.
    pub fn policy(&self) -> FetchPolicy<V> {
        FetchPolicy::from_config(&self.config)
    }

    /// Return the cached value for `key` or produce it.
    ///
    /// Fresh entries are returned as is. Stale entries are returned as is while
    /// a background production replaces them. Missing, expired, invalid, or
    /// force-refreshed keys wait for a production, shared with any other
    /// caller asking for the same key. Must be called within a Tokio runtime.
    pub async fn get_or_produce<F, Fut>(
        &self,
        key: &str,
        policy: FetchPolicy<V>,
        produce: F,
    ) -> Result<V, E>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        if !policy.force_fresh {
            if let Some(entry) = self.store.get(key) {
                match policy.validate(&entry.value) {
                    Validation::Invalid(reason) => {
                        counter!(METRIC_CACHE_VALIDATION_FAILURE).increment(1);
                        warn!(key, reason = %reason, "evicting cached value that failed validation");
                        self.store.delete(key);
                    }
                    Validation::Valid => match entry.freshness() {
                        Freshness::Fresh => {
                            counter!(METRIC_CACHE_HIT).increment(1);
                            debug!(key, "cache hit");
                            return Ok(entry.value);
                        }
                        Freshness::Stale => {
                            counter!(METRIC_CACHE_STALE).increment(1);
                            debug!(key, "serving stale value while revalidating");
                            self.start_or_join(key, policy, produce);
                            return Ok(entry.value);
                        }
                        Freshness::Expired => debug!(key, "cached value expired"),
                    },
                }
            }
        }

        counter!(METRIC_CACHE_MISS).increment(1);
        self.start_or_join(key, policy, produce).result.await
    }

    /// Whether a production for `key` is currently running.
    pub fn is_in_flight(&self, key: &str) -> bool {
        self.inflight.contains_key(key)
    }

    /// Wait for the running production of `key`, if any, and return its result.
    pub async fn settle(&self, key: &str) -> Option<Result<V, E>> {
        let pending = self.inflight.get(key).map(|flight| flight.result.clone());
        match pending {
            Some(result) => Some(result.await),
            None => None,
        }
    }

    pub fn delete(&self, key: &str) -> bool {
        self.store.delete(key)
    }

    pub fn purge_matching(&self, pattern: &Regex) -> PurgeReport {
        self.store.purge_matching(pattern)
    }

    fn start_or_join<F, Fut>(&self, key: &str, policy: FetchPolicy<V>, produce: F) -> Flight<V, E>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        let id = self.next_flight.fetch_add(1, Ordering::Relaxed);
        let (task_tx, task_rx) = oneshot::channel::<JoinHandle<Result<V, E>>>();

        // The shard lock must be released before spawning: a task dropped at
        // spawn drops its guard, which removes the entry from this same shard.
        let flight = match self.inflight.entry(key.to_string()) {
            Entry::Occupied(existing) => {
                debug!(key, "joining in-flight production");
                return existing.get().clone();
            }
            Entry::Vacant(vacant) => {
                let aborted_key = key.to_string();
                let result = async move {
                    let outcome = match task_rx.await {
                        Ok(task) => task.await.map_err(|err| err.to_string()),
                        Err(_) => Err("production was never started".to_string()),
                    };
                    outcome.unwrap_or_else(|message| {
                        Err(E::from(CacheFailure::Aborted {
                            key: aborted_key,
                            message,
                        }))
                    })
                }
                .boxed()
                .shared();

                let flight = Flight { id, result };
                vacant.insert(flight.clone());
                flight
            }
        };

        let production = Production {
            key: key.to_string(),
            policy,
            store: Arc::clone(&self.store),
            guard: FlightGuard {
                key: key.to_string(),
                id,
                inflight: Arc::clone(&self.inflight),
            },
        };
        let _ = task_tx.send(tokio::spawn(production.run(produce)));
        flight
    }
}

/// Unregisters a production from the in-flight map when its task ends,
/// including by panic.
struct FlightGuard<V, E> {
    key: String,
    id: u64,
    inflight: Arc<InFlight<V, E>>,
}

impl<V, E> Drop for FlightGuard<V, E> {
    fn drop(&mut self) {
        self.inflight
            .remove_if(&self.key, |_, flight| flight.id == self.id);
    }
}

struct Production<V, E> {
    key: String,
    policy: FetchPolicy<V>,
    store: Arc<EntryStore<V>>,
    guard: FlightGuard<V, E>,
}

impl<V, E> Production<V, E>
where
    V: Clone + Send + Sync + 'static,
    E: Display + From<CacheFailure> + Send + 'static,
{
    async fn run<F, Fut>(self, produce: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let Self {
            key,
            policy,
            store,
            guard: _guard,
        } = self;

        let started_at = Instant::now();
        let outcome = produce().await;
        let elapsed_ms = started_at.elapsed().as_secs_f64() * 1000.0;
        histogram!(METRIC_CACHE_PRODUCE_MS).record(elapsed_ms);

        let value = match outcome {
            Ok(value) => value,
            Err(error) => {
                warn!(key = %key, error = %error, elapsed_ms, "production failed");
                return Err(error);
            }
        };

        if let Validation::Invalid(reason) = policy.validate(&value) {
            counter!(METRIC_CACHE_VALIDATION_FAILURE).increment(1);
            warn!(key = %key, reason = %reason, "produced value failed validation");
            return Err(E::from(CacheFailure::Validation { key, reason }));
        }

        if policy.should_retain(&value) {
            store.set(
                key.clone(),
                CacheEntry::new(value.clone(), policy.ttl, policy.swr),
            );
            info!(key = %key, elapsed_ms, "stored fresh value");
        } else {
            counter!(METRIC_CACHE_SELF_HEAL).increment(1);
            let evicted = store.delete(&key);
            info!(key = %key, evicted, elapsed_ms, "empty result left uncached");
        }

        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use futures::future::join_all;

    use super::*;

    #[derive(Debug, Clone, Error)]
    enum TestError {
        #[error("upstream unavailable")]
        Upstream,
        #[error(transparent)]
        Cache(#[from] CacheFailure),
    }

    type Service = CacheService<u32, TestError>;

    const TTL: Duration = Duration::from_secs(10);
    const SWR: Duration = Duration::from_secs(100);

    fn service() -> Service {
        CacheService::new(&CacheConfig {
            capacity: 16,
            ttl: TTL,
            stale_while_revalidate: SWR,
        })
    }

    fn counting(
        calls: &Arc<AtomicUsize>,
        value: u32,
    ) -> impl FnOnce() -> BoxFuture<'static, Result<u32, TestError>> + Send + 'static {
        let calls = Arc::clone(calls);
        move || {
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                Ok::<u32, TestError>(value)
            }
            .boxed()
        }
    }

    fn even_only(value: &u32) -> Validation {
        if value % 2 == 0 {
            Validation::Valid
        } else {
            Validation::invalid("value is odd")
        }
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_misses_share_one_production() {
        let cache = service();
        let calls = Arc::new(AtomicUsize::new(0));

        let callers = (0..8).map(|_| cache.get_or_produce("k", cache.policy(), counting(&calls, 42)));
        let results = join_all(callers).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        for result in results {
            assert_eq!(result.expect("shared value"), 42);
        }
        assert!(!cache.is_in_flight("k"));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_failures_share_one_error_and_cache_nothing() {
        let cache = service();
        let calls = Arc::new(AtomicUsize::new(0));

        let callers = (0..4).map(|_| {
            let calls = Arc::clone(&calls);
            cache.get_or_produce("k", cache.policy(), move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                Err::<u32, _>(TestError::Upstream)
            })
        });
        let results = join_all(callers).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|r| matches!(r, Err(TestError::Upstream))));
        assert!(cache.store().peek("k").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_values_skip_production() {
        let cache = service();
        let calls = Arc::new(AtomicUsize::new(0));

        cache
            .get_or_produce("k", cache.policy(), counting(&calls, 1))
            .await
            .expect("first value");
        tokio::time::advance(TTL - Duration::from_secs(1)).await;

        let value = cache
            .get_or_produce("k", cache.policy(), counting(&calls, 2))
            .await
            .expect("cached value");

        assert_eq!(value, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_values_are_served_while_one_refresh_runs() {
        let cache = service();
        let calls = Arc::new(AtomicUsize::new(0));

        cache
            .get_or_produce("k", cache.policy(), counting(&calls, 1))
            .await
            .expect("first value");
        tokio::time::advance(TTL + Duration::from_secs(5)).await;

        let first = cache
            .get_or_produce("k", cache.policy(), counting(&calls, 2))
            .await
            .expect("stale value");
        let second = cache
            .get_or_produce("k", cache.policy(), counting(&calls, 3))
            .await
            .expect("stale value");
        assert_eq!((first, second), (1, 1));
        assert!(cache.is_in_flight("k"));

        let refreshed = cache.settle("k").await.expect("refresh in flight");
        assert_eq!(refreshed.expect("refresh value"), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let after = cache
            .get_or_produce("k", cache.policy(), counting(&calls, 4))
            .await
            .expect("refreshed value");
        assert_eq!(after, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_refresh_keeps_stale_value() {
        let cache = service();
        let calls = Arc::new(AtomicUsize::new(0));

        cache
            .get_or_produce("k", cache.policy(), counting(&calls, 1))
            .await
            .expect("first value");
        tokio::time::advance(TTL).await;

        let stale = cache
            .get_or_produce("k", cache.policy(), || async { Err::<u32, _>(TestError::Upstream) })
            .await
            .expect("stale value");
        assert_eq!(stale, 1);
        assert!(matches!(cache.settle("k").await, Some(Err(TestError::Upstream))));
        assert_eq!(cache.store().peek("k").map(|e| e.value), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn expired_values_are_recomputed_synchronously() {
        let cache = service();
        let calls = Arc::new(AtomicUsize::new(0));

        cache
            .get_or_produce("k", cache.policy(), counting(&calls, 1))
            .await
            .expect("first value");
        tokio::time::advance(TTL + SWR).await;

        let value = cache
            .get_or_produce("k", cache.policy(), counting(&calls, 2))
            .await
            .expect("recomputed value");
        assert_eq!(value, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn force_fresh_bypasses_fresh_entries() {
        let cache = service();
        let calls = Arc::new(AtomicUsize::new(0));

        cache
            .get_or_produce("k", cache.policy(), counting(&calls, 1))
            .await
            .expect("first value");
        let value = cache
            .get_or_produce("k", cache.policy().force_fresh(true), counting(&calls, 2))
            .await
            .expect("forced value");

        assert_eq!(value, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.store().peek("k").map(|e| e.value), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_production_is_reported_and_not_stored() {
        let cache = service();
        let calls = Arc::new(AtomicUsize::new(0));
        let policy = cache.policy().validate_with(even_only);

        let error = cache
            .get_or_produce("k", policy, counting(&calls, 3))
            .await
            .expect_err("odd value is invalid");
        assert!(matches!(
            error,
            TestError::Cache(CacheFailure::Validation { ref key, .. }) if key == "k"
        ));
        assert!(cache.store().peek("k").is_none());

        let value = cache
            .get_or_produce("k", policy, counting(&calls, 4))
            .await
            .expect("later attempt is not poisoned");
        assert_eq!(value, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_cached_values_are_evicted_and_recomputed() {
        let cache = service();
        let calls = Arc::new(AtomicUsize::new(0));
        cache.store().set("k", CacheEntry::new(7, TTL, SWR));

        let value = cache
            .get_or_produce("k", cache.policy().validate_with(even_only), counting(&calls, 8))
            .await
            .expect("recomputed value");

        assert_eq!(value, 8);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unretained_values_evict_existing_entry() {
        let cache = service();
        let calls = Arc::new(AtomicUsize::new(0));
        cache.store().set("k", CacheEntry::new(5, TTL, SWR));

        let value = cache
            .get_or_produce(
                "k",
                cache.policy().force_fresh(true).retain_when(|v| *v != 0),
                counting(&calls, 0),
            )
            .await
            .expect("empty value is returned");

        assert_eq!(value, 0);
        assert!(cache.store().peek("k").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_caller_does_not_cancel_production() {
        let cache = service();
        let calls = Arc::new(AtomicUsize::new(0));

        let waiter = {
            let cache = cache.clone();
            let calls = Arc::clone(&calls);
            tokio::spawn(async move {
                cache
                    .get_or_produce("k", cache.policy(), move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_secs(1)).await;
                        Ok::<u32, TestError>(9)
                    })
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(cache.is_in_flight("k"));
        waiter.abort();

        let settled = cache.settle("k").await.expect("production still running");
        assert_eq!(settled.expect("value"), 9);
        assert_eq!(cache.store().peek("k").map(|e| e.value), Some(9));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_producer_surfaces_aborted_and_unblocks_key() {
        let cache = service();

        let error = cache
            .get_or_produce("k", cache.policy(), || async {
                let explode = true;
                if explode {
                    panic!("producer blew up");
                }
                Ok::<u32, TestError>(0)
            })
            .await
            .expect_err("panic is reported");
        assert!(matches!(error, TestError::Cache(CacheFailure::Aborted { .. })));
        assert!(!cache.is_in_flight("k"));

        let calls = Arc::new(AtomicUsize::new(0));
        let value = cache
            .get_or_produce("k", cache.policy(), counting(&calls, 6))
            .await
            .expect("key usable after panic");
        assert_eq!(value, 6);
    }

    #[test]
    fn production_dropped_at_spawn_releases_key() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .expect("runtime");
        let handle = runtime.handle().clone();
        runtime.shutdown_background();
        let _context = handle.enter();

        let cache = service();
        let calls = Arc::new(AtomicUsize::new(0));
        let error = futures::executor::block_on(cache.get_or_produce(
            "k",
            cache.policy(),
            counting(&calls, 1),
        ))
        .expect_err("closed runtime cannot run the production");

        assert!(matches!(error, TestError::Cache(CacheFailure::Aborted { .. })));
        assert!(!cache.is_in_flight("k"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
