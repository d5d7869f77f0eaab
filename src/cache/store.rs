//! Keyed entry storage.
//!
//! A bounded map from cache key to a timestamped value. Capacity overflow
//! evicts the least-recently-used key. No I/O happens here.

use std::sync::RwLock;
use std::time::Duration;

use lru::LruCache;
use metrics::counter;
use regex::Regex;
use serde::Serialize;
use tokio::time::Instant;
use tracing::debug;

use super::config::CacheConfig;
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::store";
const METRIC_CACHE_EVICT: &str = "folio_cache_evict_total";

/// Where an entry sits on its freshness timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Inside `ttl`: serve as is.
    Fresh,
    /// Past `ttl` but inside `ttl + swr`: serve, refresh in the background.
    Stale,
    /// Past `ttl + swr`: recompute before answering.
    Expired,
}

/// A stored value with the policy it was produced under.
///
/// Entries are never mutated; a refresh replaces the entry wholesale.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub created_at: Instant,
    pub ttl: Duration,
    pub swr: Duration,
}

impl<V> CacheEntry<V> {
    pub fn new(value: V, ttl: Duration, swr: Duration) -> Self {
        Self::created_at(value, Instant::now(), ttl, swr)
    }

    pub fn created_at(value: V, created_at: Instant, ttl: Duration, swr: Duration) -> Self {
        Self {
            value,
            created_at,
            ttl,
            swr,
        }
    }

    pub fn freshness(&self) -> Freshness {
        self.freshness_at(Instant::now())
    }

    pub fn freshness_at(&self, now: Instant) -> Freshness {
        let age = now.saturating_duration_since(self.created_at);
        if age < self.ttl {
            return Freshness::Fresh;
        }
        match self.ttl.checked_add(self.swr) {
            Some(servable) if age >= servable => Freshness::Expired,
            _ => Freshness::Stale,
        }
    }
}

/// Result of an administrative pattern purge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurgeReport {
    pub deleted_count: usize,
    pub matched_keys: Vec<String>,
}

/// Bounded, LRU-evicting key → entry map, safe for shared use.
pub struct EntryStore<V> {
    entries: RwLock<LruCache<String, CacheEntry<V>>>,
}

impl<V: Clone> EntryStore<V> {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(config.capacity_non_zero())),
        }
    }

    /// Look up an entry, marking it most recently used.
    pub fn get(&self, key: &str) -> Option<CacheEntry<V>> {
        rw_write(&self.entries, SOURCE, "get").get(key).cloned()
    }

    /// Look up an entry without touching recency.
    pub fn peek(&self, key: &str) -> Option<CacheEntry<V>> {
        rw_read(&self.entries, SOURCE, "peek").peek(key).cloned()
    }

    /// Insert or replace an entry. Returns the key evicted to make room, if any.
    pub fn set(&self, key: impl Into<String>, entry: CacheEntry<V>) -> Option<String> {
        let key = key.into();
        let evicted = rw_write(&self.entries, SOURCE, "set")
            .push(key.clone(), entry)
            .map(|(evicted_key, _)| evicted_key)
            .filter(|evicted_key| *evicted_key != key);

        if let Some(evicted_key) = evicted.as_deref() {
            counter!(METRIC_CACHE_EVICT).increment(1);
            debug!(key = %key, evicted = evicted_key, "evicted least recently used entry");
        }
        evicted
    }

    /// Remove an entry. Returns whether it existed.
    pub fn delete(&self, key: &str) -> bool {
        rw_write(&self.entries, SOURCE, "delete").pop(key).is_some()
    }

    pub fn contains(&self, key: &str) -> bool {
        rw_read(&self.entries, SOURCE, "contains").contains(key)
    }

    /// Snapshot of all keys, most recently used first.
    pub fn keys(&self) -> Vec<String> {
        rw_read(&self.entries, SOURCE, "keys")
            .iter()
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Delete every key the pattern matches.
    pub fn purge_matching(&self, pattern: &Regex) -> PurgeReport {
        let mut entries = rw_write(&self.entries, SOURCE, "purge_matching");
        let matched_keys: Vec<String> = entries
            .iter()
            .filter(|(key, _)| pattern.is_match(key))
            .map(|(key, _)| key.clone())
            .collect();

        let deleted_count = matched_keys
            .iter()
            .filter(|key| entries.pop(key.as_str()).is_some())
            .count();

        PurgeReport {
            deleted_count,
            matched_keys,
        }
    }

    pub fn clear(&self) {
        rw_write(&self.entries, SOURCE, "clear").clear();
    }

    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
