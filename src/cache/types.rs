//! Cached copy information and its on-disk record form

use crate::cache::hash::ContentHash;
use crate::error::{CacheError, CacheResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Marker rendered when a record has no Last-Modified value
pub const NO_LAST_MODIFIED: &str = "none";

/// Whether an entry is a single file or a directory tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File => write!(f, "file"),
            Self::Directory => write!(f, "directory"),
        }
    }
}

/// One resolved, hashed source item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyEntry {
    /// File or directory
    pub kind: EntryKind,

    /// Logical name (context-relative path, or the URL's file name)
    pub name: String,

    /// Staged content location
    pub path: PathBuf,

    /// Tagged content hash
    pub hash: ContentHash,

    /// Whether the builder may unpack this entry (ADD of a local archive)
    #[serde(default)]
    pub decompress: bool,

    /// Newest modification time in the source when it was hashed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,
}

/// The unit stored per origin
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyEntrySet {
    /// Entries in resolution order
    pub entries: Vec<CopyEntry>,

    /// HTTP Last-Modified of a remote origin, empty when unknown
    #[serde(default)]
    pub last_modified: String,
}

impl CopyEntrySet {
    pub fn new(entries: Vec<CopyEntry>) -> Self {
        Self {
            entries,
            last_modified: String::new(),
        }
    }

    /// Attach a Last-Modified value (None leaves it empty)
    pub fn with_last_modified(mut self, last_modified: Option<String>) -> Self {
        self.last_modified = last_modified.unwrap_or_default();
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// The only entry, if there is exactly one
    pub fn single(&self) -> Option<&CopyEntry> {
        match self.entries.as_slice() {
            [entry] => Some(entry),
            _ => None,
        }
    }

    /// Recorded Last-Modified, if any
    pub fn last_modified(&self) -> Option<&str> {
        let value = self.last_modified.trim();
        (!value.is_empty()).then_some(value)
    }

    /// Reject sets that must never be cached
    pub fn validate(&self) -> CacheResult<()> {
        if self.entries.is_empty() {
            return Err(CacheError::validation("copy entry set is empty"));
        }
        if let Some(entry) = self.entries.iter().find(|e| e.hash.is_empty()) {
            return Err(CacheError::validation(format!(
                "copy entry {} has an empty content hash",
                entry.name
            )));
        }
        Ok(())
    }
}

/// Cached hash of a multi-source instruction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateRecord {
    /// Aggregate content hash of all sources
    pub src_hash: String,

    /// Display string of the source names
    pub orig_paths: String,

    /// Sorted origins the aggregate was built from
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub origins: Vec<String>,

    /// Entry hashes `src_hash` was computed over, in resolution order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entry_hashes: Vec<ContentHash>,
}

impl AggregateRecord {
    pub fn new(src_hash: impl Into<String>, orig_paths: impl Into<String>) -> Self {
        Self {
            src_hash: src_hash.into(),
            orig_paths: orig_paths.into(),
            origins: Vec::new(),
            entry_hashes: Vec::new(),
        }
    }

    pub fn with_entry_hashes(mut self, entry_hashes: Vec<ContentHash>) -> Self {
        self.entry_hashes = entry_hashes;
        self
    }

    /// Whether the record was computed from exactly these entry hashes
    ///
    /// Records without entry hashes never match.
    pub fn matches_entries(&self, entry_hashes: &[ContentHash]) -> bool {
        !self.entry_hashes.is_empty() && self.entry_hashes == entry_hashes
    }

    /// Whether `origin` is one of the constituents
    pub fn includes(&self, origin: &str) -> bool {
        self.origins.iter().any(|o| o == origin)
    }

    pub fn validate(&self) -> CacheResult<()> {
        if self.src_hash.trim().is_empty() {
            return Err(CacheError::validation("aggregate srcHash is empty"));
        }
        if self.orig_paths.trim().is_empty() {
            return Err(CacheError::validation("aggregate origPaths is empty"));
        }
        Ok(())
    }
}

/// Durable form of one origin (or one aggregate key)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheRecord {
    /// Origin key, or canonical aggregate key for aggregate records
    pub origin: String,

    #[serde(default)]
    pub copy_info: CopyEntrySet,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregate: Option<AggregateRecord>,
}

impl CacheRecord {
    pub fn for_entries(origin: impl Into<String>, copy_info: CopyEntrySet) -> Self {
        Self {
            origin: origin.into(),
            copy_info,
            aggregate: None,
        }
    }

    pub fn for_aggregate(key: impl Into<String>, aggregate: AggregateRecord) -> Self {
        Self {
            origin: key.into(),
            copy_info: CopyEntrySet::default(),
            aggregate: Some(aggregate),
        }
    }

    /// A record needs an origin and either entries or an aggregate
    pub fn validate(&self) -> CacheResult<()> {
        if self.origin.trim().is_empty() {
            return Err(CacheError::validation("cache record origin is empty"));
        }
        match (&self.aggregate, self.copy_info.is_empty()) {
            (None, true) => Err(CacheError::validation(format!(
                "cache record for {} has neither copy info nor aggregate info",
                self.origin
            ))),
            (Some(aggregate), _) => aggregate.validate(),
            (None, false) => self.copy_info.validate(),
        }
    }
}

/// One listing row per persisted entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSummary {
    pub origin: String,
    pub file_hash: String,
    pub file_name: String,
    pub file_path: String,
    pub last_modified: String,
    pub record_file: String,
}

impl CacheSummary {
    /// Flatten a record into rows
    pub fn from_record(record: &CacheRecord, record_file: &str) -> Vec<Self> {
        let last_modified = record
            .copy_info
            .last_modified()
            .unwrap_or(NO_LAST_MODIFIED)
            .to_string();

        let mut rows: Vec<Self> = record
            .copy_info
            .entries
            .iter()
            .map(|entry| Self {
                origin: record.origin.clone(),
                file_hash: entry.hash.to_string(),
                file_name: entry.name.clone(),
                file_path: entry.path.display().to_string(),
                last_modified: last_modified.clone(),
                record_file: record_file.to_string(),
            })
            .collect();

        if let Some(aggregate) = &record.aggregate {
            rows.push(Self {
                origin: record.origin.clone(),
                file_hash: aggregate.src_hash.clone(),
                file_name: aggregate.orig_paths.clone(),
                file_path: String::new(),
                last_modified: NO_LAST_MODIFIED.to_string(),
                record_file: record_file.to_string(),
            });
        }

        rows
    }
}

/// Result of deleting one origin
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteOutcome {
    Deleted(String),
    NotFound(String),
}

impl DeleteOutcome {
    pub fn origin(&self) -> &str {
        match self {
            Self::Deleted(origin) | Self::NotFound(origin) => origin,
        }
    }

    pub fn is_deleted(&self) -> bool {
        matches!(self, Self::Deleted(_))
    }
}
