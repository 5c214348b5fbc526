//! Error types for copycache
//!
//! All modules use `CacheResult<T>` as their return type. Cache misses and
//! deletes of absent origins are not errors; they are reported through
//! `Option`/`bool`/[`DeleteOutcome`](crate::cache::DeleteOutcome) values.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for copycache operations
pub type CacheResult<T> = Result<T, CacheError>;

/// All errors that can occur in copycache
#[derive(Error, Debug)]
pub enum CacheError {
    // Validation errors
    #[error("Invalid origin {origin:?}: {reason}")]
    InvalidOrigin { origin: String, reason: String },

    #[error("Invalid cache input: {0}")]
    Validation(String),

    #[error("Source can't be a URL for {instruction}: {origin}")]
    RemoteNotAllowed { instruction: String, origin: String },

    // Disk layer errors
    #[error("Corrupted cache record {path}: {reason}")]
    CorruptRecord { path: PathBuf, reason: String },

    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Path not found in build context: {0}")]
    PathNotFound(String),

    // Network errors
    #[error("Download of {url} failed: {reason}")]
    Download { url: String, reason: String },

    #[error("Got HTTP status code >= 400 for {url}: {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("Unexpected HTTP status {status} for {url}")]
    UnexpectedStatus { url: String, status: u16 },

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

impl CacheError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a validation error
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation(reason.into())
    }

    /// Create an invalid origin error
    pub fn invalid_origin(origin: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidOrigin {
            origin: origin.into(),
            reason: reason.into(),
        }
    }

    /// Create a download error
    pub fn download(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::Download {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Download { .. } => true,
            Self::HttpStatus { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::CorruptRecord { .. } => {
                Some("Remove the record with: copycache rm <origin> (or copycache clear)")
            }
            Self::RemoteNotAllowed { .. } => Some("Use ADD for remote sources"),
            Self::HttpStatus { .. } => Some("The cached copy was kept; fix the URL or the server and rebuild"),
            Self::ConfigInvalid { .. } => Some("Run: copycache config init --force"),
            _ => None,
        }
    }
}
