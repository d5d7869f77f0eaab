//! Raw content as it arrives from the remote repository.

use serde::{Deserialize, Serialize};

/// A single file downloaded from the content repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    /// Repository-relative path, e.g. `content/docs/routing/index.mdx`.
    pub path: String,
    pub content: String,
}

impl SourceFile {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }

    /// Final path segment.
    pub fn file_name(&self) -> &str {
        last_segment(&self.path).unwrap_or(self.path.as_str())
    }

    /// Case-insensitive substring match over the file body.
    pub fn contains_ignore_case(&self, needle_lowercase: &str) -> bool {
        self.content.to_lowercase().contains(needle_lowercase)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    #[default]
    File,
    Dir,
    #[serde(other)]
    Other,
}

/// One entry of a remote directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    pub name: String,
    pub path: String,
    #[serde(default, rename = "type")]
    pub kind: EntryKind,
}

impl DirEntry {
    pub fn new(name: impl Into<String>, path: impl Into<String>, kind: EntryKind) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            kind,
        }
    }

    /// Slug addressed by this entry: the last non-empty path segment, without
    /// the page extension for single-file pages.
    pub fn slug(&self) -> Option<&str> {
        let segment = last_segment(&self.path)?;
        if self.kind != EntryKind::File {
            return Some(segment);
        }
        let stem = segment
            .strip_suffix(".mdx")
            .or_else(|| segment.strip_suffix(".md"))
            .unwrap_or(segment);
        (!stem.is_empty()).then_some(stem)
    }
}

/// File set for one page, as produced by a tree download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DownloadResult {
    /// File name of the page entry point relative to the page directory.
    pub entry_filename: String,
    pub files: Vec<SourceFile>,
}

impl DownloadResult {
    pub fn new(entry_filename: impl Into<String>, files: Vec<SourceFile>) -> Self {
        Self {
            entry_filename: entry_filename.into(),
            files,
        }
    }

    pub fn empty(entry_filename: impl Into<String>) -> Self {
        Self::new(entry_filename, Vec::new())
    }

    /// An empty file set is a "no such content" answer and must not linger in cache.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

fn last_segment(path: &str) -> Option<&str> {
    path.split('/').rev().find(|segment| !segment.is_empty())
}
