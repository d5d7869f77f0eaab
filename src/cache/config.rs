//! Cache configuration.
//!
//! Controls entry-store capacity and the default freshness windows via
//! `folio.toml`:
//!
//! ```toml
//! [cache]
//! capacity = 1000
//! ttl_seconds = 1209600
//! stale_while_revalidate_seconds = 3153600000
//! ```

use std::num::NonZeroUsize;
use std::time::Duration;

const DEFAULT_CAPACITY: usize = 1000;
const DEFAULT_TTL_SECS: u64 = 60 * 60 * 24 * 14;
const DEFAULT_STALE_WHILE_REVALIDATE_SECS: u64 = 60 * 60 * 24 * 365 * 100;

/// Resolved cache configuration.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of distinct keys held before LRU eviction.
    pub capacity: usize,
    /// How long a produced value is served without recomputation.
    pub ttl: Duration,
    /// How long past `ttl` a value is still served while a refresh runs.
    pub stale_while_revalidate: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            ttl: Duration::from_secs(DEFAULT_TTL_SECS),
            stale_while_revalidate: Duration::from_secs(DEFAULT_STALE_WHILE_REVALIDATE_SECS),
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            capacity: settings.capacity.get(),
            ttl: settings.ttl,
            stale_while_revalidate: settings.stale_while_revalidate,
        }
    }
}

impl CacheConfig {
    /// Returns the capacity as NonZeroUsize, clamping to 1 if zero.
    pub fn capacity_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.capacity).unwrap_or(NonZeroUsize::MIN)
    }
}
