//! Values held in the shared content cache.

use std::sync::Arc;

use crate::domain::content::DownloadResult;
use crate::domain::page::CompiledPage;

/// Tagged union of everything the content layers store under one key space.
///
/// `Page(None)` is a legitimate production result ("no such page") but is
/// never retained in the store.
#[derive(Debug, Clone)]
pub enum CacheValue {
    Download(Arc<DownloadResult>),
    Page(Option<Arc<CompiledPage>>),
}

impl CacheValue {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Download(_) => "download",
            Self::Page(_) => "page",
        }
    }

    pub fn into_download(self) -> Option<Arc<DownloadResult>> {
        match self {
            Self::Download(download) => Some(download),
            Self::Page(_) => None,
        }
    }

    pub fn into_page(self) -> Option<Option<Arc<CompiledPage>>> {
        match self {
            Self::Page(page) => Some(page),
            Self::Download(_) => None,
        }
    }

    /// Whether the value carries content worth keeping.
    pub fn has_content(&self) -> bool {
        match self {
            Self::Download(download) => !download.is_empty(),
            Self::Page(page) => page.is_some(),
        }
    }
}

impl From<DownloadResult> for CacheValue {
    fn from(download: DownloadResult) -> Self {
        Self::Download(Arc::new(download))
    }
}

impl From<Option<CompiledPage>> for CacheValue {
    fn from(page: Option<CompiledPage>) -> Self {
        Self::Page(page.map(Arc::new))
    }
}
