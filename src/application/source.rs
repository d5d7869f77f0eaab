//! Collaborators consumed by the content pipeline.

use async_trait::async_trait;

use crate::application::error::ContentError;
use crate::domain::content::{DirEntry, DownloadResult, SourceFile};
use crate::domain::page::CompiledMdx;

/// Remote repository holding page sources.
///
/// Paths are relative to the repository's content root, e.g. `docs` or
/// `docs/routing`.
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// List the entries of a content directory.
    async fn list_directory(&self, path: &str) -> Result<Vec<DirEntry>, ContentError>;

    /// Download every file making up the page at `path`.
    ///
    /// A path without content yields an empty file list, not an error.
    async fn download_tree(&self, path: &str) -> Result<DownloadResult, ContentError>;
}

/// Turns a page's source files into render-ready output.
#[async_trait]
pub trait PageCompiler: Send + Sync {
    /// Returns `Ok(None)` when the files do not form a page and
    /// `Err(ContentError::Compile { .. })` when the content is malformed.
    async fn compile(
        &self,
        slug: &str,
        files: &[SourceFile],
    ) -> Result<Option<CompiledMdx>, ContentError>;
}
