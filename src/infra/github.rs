//! Content source backed by the GitHub REST API.

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use futures::future::try_join_all;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::application::error::ContentError;
use crate::application::source::ContentSource;
use crate::config::SourceSettings;
use crate::domain::content::{DirEntry, DownloadResult, EntryKind, SourceFile};

/// Entry files looked up, in order, inside a page directory.
pub const ENTRY_FILENAMES: [&str; 3] = ["index.mdx", "index.md", "README.md"];
const PAGE_EXTENSIONS: [&str; 2] = ["mdx", "md"];

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("GitHub responded {status} for {url}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },
    #[error("failed to decode `{path}`: {message}")]
    Decode { path: String, message: String },
}

impl From<SourceError> for ContentError {
    fn from(err: SourceError) -> Self {
        ContentError::remote_unavailable(err.to_string())
    }
}

#[derive(Debug, Clone, Deserialize)]
struct ContentItem {
    name: String,
    path: String,
    sha: String,
    #[serde(default, rename = "type")]
    kind: EntryKind,
}

impl From<ContentItem> for DirEntry {
    fn from(item: ContentItem) -> Self {
        DirEntry {
            name: item.name,
            path: item.path,
            kind: item.kind,
        }
    }
}

/// The contents endpoint answers with an array for directories and an
/// object for files.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Listing {
    Many(Vec<ContentItem>),
    One(ContentItem),
}

impl Listing {
    fn into_items(self) -> Vec<ContentItem> {
        match self {
            Listing::Many(items) => items,
            Listing::One(item) => vec![item],
        }
    }
}

#[derive(Debug, Deserialize)]
struct Blob {
    content: String,
    #[serde(default)]
    encoding: String,
}

#[derive(Clone, Debug)]
pub struct GitHubSource {
    client: Client,
    api_base: Url,
    owner: String,
    repo: String,
    branch: String,
    content_root: String,
    token: Option<String>,
}

impl GitHubSource {
    pub fn new(settings: &SourceSettings) -> Result<Self, SourceError> {
        let client = Client::builder()
            .user_agent(Self::user_agent())
            .timeout(settings.timeout)
            .build()?;
        Ok(Self {
            client,
            api_base: settings.api_base_url.clone(),
            owner: settings.owner.clone(),
            repo: settings.repo.clone(),
            branch: settings.branch.clone(),
            content_root: settings.content_root.trim_matches('/').to_string(),
            token: settings.token.clone(),
        })
    }

    pub fn user_agent() -> &'static str {
        concat!("folio/", env!("CARGO_PKG_VERSION"))
    }

    fn repo_url(&self, tail: &str) -> Result<Url, SourceError> {
        let base = self.api_base.as_str().trim_end_matches('/');
        let url = format!("{base}/repos/{}/{}/{tail}", self.owner, self.repo);
        Ok(Url::parse(&url)?)
    }

    fn repo_path(&self, path: &str) -> String {
        let path = path.trim_matches('/');
        match (self.content_root.is_empty(), path.is_empty()) {
            (true, _) => path.to_string(),
            (false, true) => self.content_root.clone(),
            (false, false) => format!("{}/{path}", self.content_root),
        }
    }

    /// GET a JSON document. `Ok(None)` when the resource does not exist.
    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<Option<T>, SourceError> {
        let mut req = self
            .client
            .get(url.clone())
            .header(reqwest::header::ACCEPT, "application/vnd.github+json");
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }

        let resp = req.send().await?;
        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SourceError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        Ok(Some(resp.json().await?))
    }

    /// Items directly under a repository path.
    async fn list_items(&self, repo_path: &str) -> Result<Vec<ContentItem>, SourceError> {
        let mut url = self.repo_url(&format!("contents/{repo_path}"))?;
        url.query_pairs_mut().append_pair("ref", &self.branch);
        let listing: Option<Listing> = self.get_json(url).await?;
        Ok(listing.map(Listing::into_items).unwrap_or_default())
    }

    async fn fetch_file(&self, item: &ContentItem) -> Result<SourceFile, SourceError> {
        let url = self.repo_url(&format!("git/blobs/{}", item.sha))?;
        let blob: Blob = self
            .get_json(url.clone())
            .await?
            .ok_or_else(|| SourceError::Status {
                url: url.to_string(),
                status: StatusCode::NOT_FOUND.as_u16(),
                body: String::new(),
            })?;
        let content = decode_blob(&item.path, &blob)?;
        Ok(SourceFile::new(item.path.clone(), content))
    }

    /// Every file below `repo_path`, depth first in listing order.
    async fn collect_files(&self, repo_path: &str) -> Result<Vec<ContentItem>, SourceError> {
        let mut pending = vec![repo_path.to_string()];
        let mut files = Vec::new();
        while let Some(dir) = pending.pop() {
            let items = self.list_items(&dir).await?;
            let mut subdirs = Vec::new();
            for item in items {
                match item.kind {
                    EntryKind::File => files.push(item),
                    EntryKind::Dir => subdirs.push(item.path),
                    EntryKind::Other => {}
                }
            }
            pending.extend(subdirs.into_iter().rev());
        }
        Ok(files)
    }

    async fn download(&self, path: &str) -> Result<DownloadResult, SourceError> {
        let repo_path = self.repo_path(path);
        let (parent, slug) = match repo_path.rsplit_once('/') {
            Some((parent, slug)) => (parent.to_string(), slug.to_string()),
            None => (String::new(), repo_path.clone()),
        };

        let siblings = self.list_items(&parent).await?;

        let single_file = PAGE_EXTENSIONS.iter().find_map(|ext| {
            let name = format!("{slug}.{ext}");
            siblings
                .iter()
                .find(|item| item.kind == EntryKind::File && item.name == name)
        });
        if let Some(item) = single_file {
            let file = self.fetch_file(item).await?;
            return Ok(DownloadResult::new(item.name.clone(), vec![file]));
        }

        let has_dir = siblings
            .iter()
            .any(|item| item.kind == EntryKind::Dir && item.name == slug);
        if !has_dir {
            debug!(path = %repo_path, "no page file or directory");
            return Ok(DownloadResult::empty(format!("{slug}.mdx")));
        }

        let items = self.collect_files(&repo_path).await?;
        let entry_filename = ENTRY_FILENAMES
            .iter()
            .find(|candidate| {
                items
                    .iter()
                    .any(|item| item.path == format!("{repo_path}/{candidate}"))
            })
            .unwrap_or(&ENTRY_FILENAMES[0])
            .to_string();

        let files = try_join_all(items.iter().map(|item| self.fetch_file(item))).await?;
        Ok(DownloadResult::new(entry_filename, files))
    }
}

fn decode_blob(path: &str, blob: &Blob) -> Result<String, SourceError> {
    if !blob.encoding.is_empty() && blob.encoding != "base64" {
        return Ok(blob.content.clone());
    }
    let compact: String = blob
        .content
        .chars()
        .filter(|ch| !ch.is_ascii_whitespace())
        .collect();
    let bytes = STANDARD.decode(compact).map_err(|err| SourceError::Decode {
        path: path.to_string(),
        message: err.to_string(),
    })?;
    String::from_utf8(bytes).map_err(|err| SourceError::Decode {
        path: path.to_string(),
        message: err.to_string(),
    })
}

#[async_trait]
impl ContentSource for GitHubSource {
    #[instrument(skip(self), fields(repo = %self.repo))]
    async fn list_directory(&self, path: &str) -> Result<Vec<DirEntry>, ContentError> {
        let items = self.list_items(&self.repo_path(path)).await?;
        Ok(items.into_iter().map(DirEntry::from).collect())
    }

    #[instrument(skip(self), fields(repo = %self.repo))]
    async fn download_tree(&self, path: &str) -> Result<DownloadResult, ContentError> {
        Ok(self.download(path).await?)
    }
}
