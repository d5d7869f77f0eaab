//! Cached compiled pages, keyed by `{contentDir}:{slug}:compiled`.

use std::sync::Arc;

use tracing::{debug, instrument};

use crate::application::error::ContentError;
use crate::application::options::FetchOptions;
use crate::application::source::PageCompiler;
use crate::application::ContentCache;
use crate::cache::{CacheValue, ContentKey, Validation};
use crate::domain::content::DownloadResult;
use crate::domain::page::CompiledPage;

/// Compiles downloaded file sets into pages through the shared cache.
#[derive(Clone)]
pub struct CompileLayer {
    cache: ContentCache,
    compiler: Arc<dyn PageCompiler>,
    edit_base_url: Arc<str>,
}

impl CompileLayer {
    pub fn new(
        cache: ContentCache,
        compiler: Arc<dyn PageCompiler>,
        edit_base_url: impl Into<String>,
    ) -> Self {
        let edit_base_url: String = edit_base_url.into();
        Self {
            cache,
            compiler,
            edit_base_url: Arc::from(edit_base_url.trim_end_matches('/')),
        }
    }

    /// Return the compiled page for `download`, or `None` when the files do
    /// not form a page. `None` is never cached and clears any earlier entry.
    #[instrument(skip(self, download, options), fields(force_fresh = options.force_fresh))]
    pub async fn get(
        &self,
        content_dir: &str,
        slug: &str,
        download: Arc<DownloadResult>,
        options: &FetchOptions,
    ) -> Result<Option<Arc<CompiledPage>>, ContentError> {
        let key = ContentKey::compiled(content_dir, slug).to_string();
        let policy = options
            .apply(self.cache.policy())
            .validate_with(validate_compiled)
            .retain_when(CacheValue::has_content);

        let compiler = Arc::clone(&self.compiler);
        let edit_link = edit_link(
            &self.edit_base_url,
            content_dir,
            slug,
            &download.entry_filename,
        );
        let page_slug = slug.to_string();
        let value = self
            .cache
            .get_or_produce(&key, policy, move || async move {
                let compiled = compiler.compile(&page_slug, &download.files).await?;
                let page = compiled
                    .map(|compiled| CompiledPage::from_compiled(compiled, page_slug, edit_link));
                Ok::<_, ContentError>(CacheValue::from(page))
            })
            .await?;

        let page = value.into_page().ok_or_else(|| ContentError::Validation {
            key: key.clone(),
            reason: "expected a compiled page".to_string(),
        })?;

        if page.is_none() {
            debug!(key = %key, "compiler produced no page");
        }
        Ok(page)
    }
}

/// Link to the page's entry file in the repository's web editor.
pub fn edit_link(edit_base_url: &str, content_dir: &str, slug: &str, entry_filename: &str) -> String {
    format!(
        "{}/{content_dir}/{slug}/{entry_filename}",
        edit_base_url.trim_end_matches('/')
    )
}

pub(crate) fn validate_compiled(value: &CacheValue) -> Validation {
    match value {
        CacheValue::Page(_) => Validation::Valid,
        other => Validation::invalid(format!(
            "expected a compiled page or an explicit miss, found a {} value",
            other.kind()
        )),
    }
}
