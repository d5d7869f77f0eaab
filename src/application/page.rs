//! Page resolution: download, then compile, behind one cached lookup.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, instrument};

use crate::application::compile::{CompileLayer, validate_compiled};
use crate::application::download::DownloadLayer;
use crate::application::error::ContentError;
use crate::application::options::FetchOptions;
use crate::application::source::ContentSource;
use crate::application::ContentCache;
use crate::cache::{CacheValue, ContentKey, FetchPolicy};
use crate::domain::page::CompiledPage;

const SOURCE: &str = "application::page::PageResolver";

/// How long a resolved page is served without a refresh.
pub const PAGE_TTL: Duration = Duration::from_secs(60 * 60 * 24 * 14);
/// How long past [`PAGE_TTL`] a resolved page is served while it refreshes.
pub const PAGE_STALE_WHILE_REVALIDATE: Duration = Duration::from_secs(60 * 60 * 24 * 365 * 100);

/// Resolves `(contentDir, slug)` into a compiled page.
///
/// Page entries use their own windows regardless of the cache defaults the
/// download and compile layers follow. After the first compile a page is only
/// recomputed synchronously when forced, purged, or evicted for capacity.
/// Refreshes otherwise happen in the background.
#[derive(Clone)]
pub struct PageResolver {
    cache: ContentCache,
    downloads: DownloadLayer,
    compiles: CompileLayer,
    source: Arc<dyn ContentSource>,
}

impl PageResolver {
    pub fn new(
        cache: ContentCache,
        downloads: DownloadLayer,
        compiles: CompileLayer,
        source: Arc<dyn ContentSource>,
    ) -> Self {
        Self {
            cache,
            downloads,
            compiles,
            source,
        }
    }

    /// Return the page, `Ok(None)` when it does not exist, or an error when
    /// the source or compiler failed.
    #[instrument(skip(self, options), fields(force_fresh = options.force_fresh))]
    pub async fn get_page(
        &self,
        content_dir: &str,
        slug: &str,
        options: &FetchOptions,
    ) -> Result<Option<Arc<CompiledPage>>, ContentError> {
        let key = ContentKey::page(content_dir, slug).to_string();
        let policy = options
            .apply(FetchPolicy::new(PAGE_TTL, PAGE_STALE_WHILE_REVALIDATE))
            .validate_with(validate_compiled)
            .retain_when(CacheValue::has_content);

        let downloads = self.downloads.clone();
        let compiles = self.compiles.clone();
        let dir = content_dir.to_string();
        let page_slug = slug.to_string();
        let inner_options = *options;
        let value = self
            .cache
            .get_or_produce(&key, policy, move || async move {
                let download = downloads.get(&dir, &page_slug, &inner_options).await?;
                let page = compiles
                    .get(&dir, &page_slug, download, &inner_options)
                    .await
                    .inspect_err(|err| {
                        error!(
                            source = SOURCE,
                            content_dir = %dir,
                            slug = %page_slug,
                            error = %err,
                            "failed to get a fresh value for page"
                        );
                    })?;
                Ok::<_, ContentError>(CacheValue::Page(page))
            })
            .await?;

        value.into_page().ok_or_else(|| ContentError::Validation {
            key,
            reason: "expected a compiled page".to_string(),
        })
    }

    /// Slugs of the entries under a content directory, in listing order.
    #[instrument(skip(self))]
    pub async fn list_slugs(&self, content_dir: &str) -> Result<Vec<String>, ContentError> {
        let entries = self.source.list_directory(content_dir).await?;
        Ok(entries
            .iter()
            .filter_map(|entry| entry.slug().map(str::to_string))
            .collect())
    }
}
