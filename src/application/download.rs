//! Cached raw file sets, keyed by `{contentDir}:{slug}:downloaded`.

use std::sync::Arc;

use tracing::{debug, instrument};

use crate::application::error::ContentError;
use crate::application::options::FetchOptions;
use crate::application::source::ContentSource;
use crate::application::ContentCache;
use crate::cache::{CacheValue, ContentKey, Validation};
use crate::domain::content::DownloadResult;

/// Fetches a page's source files through the shared cache.
#[derive(Clone)]
pub struct DownloadLayer {
    cache: ContentCache,
    source: Arc<dyn ContentSource>,
}

impl DownloadLayer {
    pub fn new(cache: ContentCache, source: Arc<dyn ContentSource>) -> Self {
        Self { cache, source }
    }

    /// Return the file set for `{content_dir}/{slug}`.
    ///
    /// An empty file set is returned to the caller but never left in the
    /// store, so content added upstream shows up on the next call.
    #[instrument(skip(self, options), fields(force_fresh = options.force_fresh))]
    pub async fn get(
        &self,
        content_dir: &str,
        slug: &str,
        options: &FetchOptions,
    ) -> Result<Arc<DownloadResult>, ContentError> {
        let key = ContentKey::downloaded(content_dir, slug).to_string();
        let policy = options
            .apply(self.cache.policy())
            .validate_with(validate_download)
            .retain_when(CacheValue::has_content);

        let source = Arc::clone(&self.source);
        let path = format!("{content_dir}/{slug}");
        let value = self
            .cache
            .get_or_produce(&key, policy, move || async move {
                source.download_tree(&path).await.map(CacheValue::from)
            })
            .await?;

        let download = value.into_download().ok_or_else(|| ContentError::Validation {
            key: key.clone(),
            reason: "expected a downloaded file set".to_string(),
        })?;

        if download.is_empty() {
            debug!(key = %key, "download returned no files");
        }
        Ok(download)
    }
}

pub(crate) fn validate_download(value: &CacheValue) -> Validation {
    match value {
        CacheValue::Download(_) => Validation::Valid,
        other => Validation::invalid(format!(
            "expected a downloaded file set, found a {} value",
            other.kind()
        )),
    }
}
