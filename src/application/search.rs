//! Plain-text search over downloaded page sources.

use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, instrument, warn};

use crate::application::download::DownloadLayer;
use crate::application::error::ContentError;
use crate::application::options::FetchOptions;
use crate::application::source::ContentSource;
use crate::domain::content::SourceFile;

/// Scans every page of one content directory for a search term.
///
/// Downloads go through the same cache as page resolution, so a search
/// warms the download layer and reuses whatever pages already fetched.
#[derive(Clone)]
pub struct SearchIndexScanner {
    downloads: DownloadLayer,
    source: Arc<dyn ContentSource>,
    content_dir: String,
}

impl SearchIndexScanner {
    pub fn new(
        downloads: DownloadLayer,
        source: Arc<dyn ContentSource>,
        content_dir: impl Into<String>,
    ) -> Self {
        Self {
            downloads,
            source,
            content_dir: content_dir.into(),
        }
    }

    /// Files whose content contains `term`, ignoring case.
    ///
    /// Results are grouped per directory in listing order. Pages that fail
    /// to download are skipped; a failed listing fails the search.
    #[instrument(skip(self), fields(content_dir = %self.content_dir))]
    pub async fn find(&self, term: &str) -> Result<Vec<SourceFile>, ContentError> {
        if term.is_empty() {
            return Err(ContentError::EmptySearchTerm);
        }

        let entries = self.source.list_directory(&self.content_dir).await?;
        let options = FetchOptions::default();
        let downloads = entries.iter().map(|entry| async move {
            let slug = entry.slug()?;
            match self.downloads.get(&self.content_dir, slug, &options).await {
                Ok(download) => Some(download),
                Err(err) => {
                    warn!(slug, error = %err, "skipping page that failed to download");
                    None
                }
            }
        });
        let downloads = join_all(downloads).await;

        let needle = term.to_lowercase();
        let matches: Vec<SourceFile> = downloads
            .iter()
            .flatten()
            .flat_map(|download| download.files.iter())
            .filter(|file| file.contains_ignore_case(&needle))
            .cloned()
            .collect();

        debug!(term, matches = matches.len(), "search complete");
        Ok(matches)
    }
}
