use std::time::Duration;

use crate::cache::FetchPolicy;

/// Per-request knobs accepted by the page and download lookups.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchOptions {
    /// Bypass cached values and produce fresh ones.
    pub force_fresh: bool,
    /// Override the configured time-to-live for values produced by this call.
    pub ttl: Option<Duration>,
}

impl FetchOptions {
    pub fn fresh() -> Self {
        Self {
            force_fresh: true,
            ttl: None,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub(crate) fn apply<V>(&self, policy: FetchPolicy<V>) -> FetchPolicy<V> {
        let policy = policy.force_fresh(self.force_fresh);
        match self.ttl {
            Some(ttl) => policy.with_ttl(ttl),
            None => policy,
        }
    }
}
