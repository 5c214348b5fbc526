//! Origin key normalization
//!
//! An origin is the cache key of a COPY/ADD source: either a path relative
//! to the build context or an http(s) URL. Raw specifiers are normalized so
//! that `./src/`, `/src` and `src` all map to the same key.

use crate::error::{CacheError, CacheResult};
use sha2::{Digest, Sha256};
use std::fmt;
use url::Url;

/// Key used for the whole build context
pub const CONTEXT_ROOT: &str = ".";

/// Separator for canonical multi-origin keys
const AGGREGATE_SEPARATOR: &str = ",";

/// Check whether a raw source specifier is a remote URL
pub fn is_url(raw: &str) -> bool {
    let raw = raw.trim_start();
    raw.starts_with("http://") || raw.starts_with("https://")
}

/// Check whether a local path contains glob metacharacters
pub fn contains_wildcards(path: &str) -> bool {
    path.chars().any(|c| matches!(c, '*' | '?' | '['))
}

/// A normalized cache origin
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Origin {
    /// Build-context-relative path, `/`-separated, no `.` or `..` components
    Local(String),
    /// Remote http(s) URL
    Remote(Url),
}

impl Origin {
    /// Normalize a raw source specifier
    pub fn parse(raw: &str) -> CacheResult<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(CacheError::invalid_origin(raw, "origin is empty"));
        }

        if is_url(trimmed) {
            return Self::parse_remote(trimmed);
        }

        Self::parse_local(trimmed)
    }

    fn parse_remote(raw: &str) -> CacheResult<Self> {
        let url = Url::parse(raw).map_err(|e| CacheError::invalid_origin(raw, e.to_string()))?;
        if url.host_str().map_or(true, str::is_empty) {
            return Err(CacheError::invalid_origin(raw, "URL has no host"));
        }
        let origin = Self::Remote(url);
        // Every remote origin needs somewhere to be staged
        origin.file_name()?;
        Ok(origin)
    }

    fn parse_local(raw: &str) -> CacheResult<Self> {
        let unified = raw.replace('\\', "/");
        let mut parts: Vec<&str> = Vec::new();

        for component in unified.split('/') {
            match component {
                "" | "." => {}
                ".." => {
                    if parts.pop().is_none() {
                        return Err(CacheError::invalid_origin(
                            raw,
                            "path escapes the build context",
                        ));
                    }
                }
                other => parts.push(other),
            }
        }

        if parts.is_empty() {
            return Ok(Self::Local(CONTEXT_ROOT.to_string()));
        }
        Ok(Self::Local(parts.join("/")))
    }

    /// The canonical cache key
    pub fn key(&self) -> &str {
        match self {
            Self::Local(path) => path,
            Self::Remote(url) => url.as_str(),
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote(_))
    }

    /// File name a remote origin is staged under (last non-empty URL path segment)
    pub fn file_name(&self) -> CacheResult<String> {
        match self {
            Self::Remote(url) => url
                .path_segments()
                .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
                .map(str::to_string)
                .ok_or_else(|| {
                    CacheError::invalid_origin(
                        url.as_str(),
                        "cannot determine filename from url",
                    )
                }),
            Self::Local(path) => Ok(path.rsplit('/').next().unwrap_or(path).to_string()),
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Canonical key of several origins used together: sorted, comma-joined
///
/// Requires at least two non-empty origins.
pub fn aggregate_key<S: AsRef<str>>(origins: &[S]) -> CacheResult<String> {
    if origins.len() < 2 {
        return Err(CacheError::validation(
            "aggregate records need at least two origins",
        ));
    }

    let mut keys: Vec<&str> = origins.iter().map(|o| o.as_ref()).collect();
    if keys.iter().any(|k| k.trim().is_empty()) {
        return Err(CacheError::validation("aggregate origins must not be empty"));
    }
    keys.sort_unstable();
    Ok(keys.join(AGGREGATE_SEPARATOR))
}

/// Lowercase hex SHA-256 of a key, used for on-disk file names
pub fn key_digest(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}
