//! Per-call cache policy.

use std::fmt;
use std::time::Duration;

use super::config::CacheConfig;

/// Outcome of a shape check on a cached or freshly produced value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    Valid,
    Invalid(String),
}

impl Validation {
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::Invalid(reason.into())
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }
}

pub type Validator<V> = fn(&V) -> Validation;
pub type Retention<V> = fn(&V) -> bool;

/// How a single `get_or_produce` call treats the cache.
pub struct FetchPolicy<V> {
    pub ttl: Duration,
    pub swr: Duration,
    /// Skip the lookup and always produce.
    pub force_fresh: bool,
    validate: Option<Validator<V>>,
    retain: Option<Retention<V>>,
}

impl<V> FetchPolicy<V> {
    pub fn new(ttl: Duration, swr: Duration) -> Self {
        Self {
            ttl,
            swr,
            force_fresh: false,
            validate: None,
            retain: None,
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.ttl, config.stale_while_revalidate)
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn force_fresh(mut self, force_fresh: bool) -> Self {
        self.force_fresh = force_fresh;
        self
    }

    /// Reject values of the wrong shape, whether read from the store or produced.
    pub fn validate_with(mut self, validate: Validator<V>) -> Self {
        self.validate = Some(validate);
        self
    }

    /// Values for which `retain` returns false are handed to the caller but
    /// never stored, and evict whatever entry the key held before.
    pub fn retain_when(mut self, retain: Retention<V>) -> Self {
        self.retain = Some(retain);
        self
    }

    pub fn validate(&self, value: &V) -> Validation {
        self.validate.map_or(Validation::Valid, |validate| validate(value))
    }

    pub fn should_retain(&self, value: &V) -> bool {
        self.retain.is_none_or(|retain| retain(value))
    }
}

impl<V> Clone for FetchPolicy<V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<V> Copy for FetchPolicy<V> {}

impl<V> fmt::Debug for FetchPolicy<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchPolicy")
            .field("ttl", &self.ttl)
            .field("swr", &self.swr)
            .field("force_fresh", &self.force_fresh)
            .field("validates", &self.validate.is_some())
            .field("retains_selectively", &self.retain.is_some())
            .finish()
    }
}
