use thiserror::Error;

use crate::cache::CacheFailure;
use crate::config::LoadError;
use crate::infra::error::InfraError;

/// Failures surfaced by the content pipeline.
///
/// "No such page" is not an error: lookups return `Ok(None)` for it. Values
/// are cloneable because one production result is handed to every caller
/// waiting on the same key.
#[derive(Debug, Clone, Error)]
pub enum ContentError {
    #[error("content source unavailable: {message}")]
    RemoteUnavailable { message: String },
    #[error("value for `{key}` failed validation: {reason}")]
    Validation { key: String, reason: String },
    #[error("failed to compile `{slug}`: {message}")]
    Compile { slug: String, message: String },
    #[error("production for `{key}` did not complete: {message}")]
    Aborted { key: String, message: String },
    #[error("search term must not be empty")]
    EmptySearchTerm,
    #[error("invalid purge pattern `{pattern}`: {message}")]
    InvalidPattern { pattern: String, message: String },
}

impl ContentError {
    pub fn remote_unavailable(message: impl Into<String>) -> Self {
        Self::RemoteUnavailable {
            message: message.into(),
        }
    }

    pub fn compile(slug: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Compile {
            slug: slug.into(),
            message: message.into(),
        }
    }

    /// Status a route layer would answer with. Missing pages never reach
    /// here; they are `Ok(None)` and map to 404 at the caller.
    pub fn http_status(&self) -> u16 {
        if self.is_caller_error() { 400 } else { 500 }
    }

    /// Whether the failure was caused by the caller's input rather than by
    /// infrastructure.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            ContentError::EmptySearchTerm | ContentError::InvalidPattern { .. }
        )
    }
}

impl From<CacheFailure> for ContentError {
    fn from(failure: CacheFailure) -> Self {
        match failure {
            CacheFailure::Validation { key, reason } => Self::Validation { key, reason },
            CacheFailure::Aborted { key, message } => Self::Aborted { key, message },
        }
    }
}

/// Top-level error for the operator binary.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Content(#[from] ContentError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Config(#[from] LoadError),
    #[error("page `{content_dir}/{slug}` not found")]
    NotFound { content_dir: String, slug: String },
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn not_found(content_dir: &str, slug: &str) -> Self {
        Self::NotFound {
            content_dir: content_dir.to_string(),
            slug: slug.to_string(),
        }
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    /// Process exit code reported for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::NotFound { .. } => 2,
            AppError::Content(error) if error.is_caller_error() => 64,
            AppError::Content(_)
            | AppError::Infra(_)
            | AppError::Config(_)
            | AppError::Unexpected(_) => 1,
        }
    }
}
