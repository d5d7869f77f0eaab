//! Administrative cache operations.

use regex::Regex;
use tracing::info;

use crate::application::error::ContentError;
use crate::application::ContentCache;
use crate::cache::PurgeReport;

/// Pattern matching every downloaded docs file set; purging it makes the
/// next page request re-fetch sources from the repository.
pub const REFRESH_DOCS_PATTERN: &str = "docs:.*:downloaded";

#[derive(Clone)]
pub struct CacheAdmin {
    cache: ContentCache,
}

impl CacheAdmin {
    pub fn new(cache: ContentCache) -> Self {
        Self { cache }
    }

    /// Delete every cache key matching the regular expression `pattern`.
    pub fn purge_by_pattern(&self, pattern: &str) -> Result<PurgeReport, ContentError> {
        let regex = Regex::new(pattern).map_err(|err| ContentError::InvalidPattern {
            pattern: pattern.to_string(),
            message: err.to_string(),
        })?;
        let report = self.cache.purge_matching(&regex);
        info!(
            pattern,
            deleted = report.deleted_count,
            "purged cache entries by pattern"
        );
        Ok(report)
    }

    /// Current keys, most recently used first, optionally filtered.
    pub fn keys(&self, pattern: Option<&str>) -> Result<Vec<String>, ContentError> {
        let keys = self.cache.store().keys();
        let Some(pattern) = pattern else {
            return Ok(keys);
        };
        let regex = Regex::new(pattern).map_err(|err| ContentError::InvalidPattern {
            pattern: pattern.to_string(),
            message: err.to_string(),
        })?;
        Ok(keys.into_iter().filter(|key| regex.is_match(key)).collect())
    }
}
