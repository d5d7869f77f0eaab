//! Content pipeline services.
//!
//! Every layer shares one [`ContentCache`]; keys are namespaced per layer so
//! an administrative purge can target one stage of the pipeline.

use std::sync::Arc;

use crate::cache::{CacheConfig, CacheService, CacheValue};

pub mod admin;
pub mod compile;
pub mod download;
pub mod error;
pub mod options;
pub mod page;
pub mod search;
pub mod source;

use admin::CacheAdmin;
use compile::CompileLayer;
use download::DownloadLayer;
use error::ContentError;
use page::PageResolver;
use search::SearchIndexScanner;
use source::{ContentSource, PageCompiler};

/// Process-wide cache shared by the download, compile, and page layers.
pub type ContentCache = CacheService<CacheValue, ContentError>;

/// Directory scanned by [`SearchIndexScanner`].
pub const SEARCH_CONTENT_DIR: &str = "docs";

/// The wired-up pipeline, built once at startup.
#[derive(Clone)]
pub struct ContentServices {
    pub cache: ContentCache,
    pub downloads: DownloadLayer,
    pub pages: PageResolver,
    pub search: SearchIndexScanner,
    pub admin: CacheAdmin,
}

impl ContentServices {
    pub fn new(
        config: &CacheConfig,
        source: Arc<dyn ContentSource>,
        compiler: Arc<dyn PageCompiler>,
        edit_base_url: impl Into<String>,
    ) -> Self {
        Self::with_cache(ContentCache::new(config), source, compiler, edit_base_url)
    }

    pub fn with_cache(
        cache: ContentCache,
        source: Arc<dyn ContentSource>,
        compiler: Arc<dyn PageCompiler>,
        edit_base_url: impl Into<String>,
    ) -> Self {
        let downloads = DownloadLayer::new(cache.clone(), Arc::clone(&source));
        let compiles = CompileLayer::new(cache.clone(), compiler, edit_base_url);
        let pages = PageResolver::new(
            cache.clone(),
            downloads.clone(),
            compiles,
            Arc::clone(&source),
        );
        let search = SearchIndexScanner::new(downloads.clone(), source, SEARCH_CONTENT_DIR);
        let admin = CacheAdmin::new(cache.clone());

        Self {
            cache,
            downloads,
            pages,
            search,
            admin,
        }
    }
}
