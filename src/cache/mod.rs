//! Build-time source cache for COPY/ADD instructions
//!
//! Copy info (hashed, staged sources) is kept per origin in two tiers: a
//! bounded in-memory LRU and one JSON record per origin on disk. The
//! [`Resolver`] decides whether a cached entry can be reused.
//!
//! # Resolution
//!
//! | Origin | Cached? | Check | Outcome |
//! |--------|---------|-------|---------|
//! | local | no | | hash, stage, store (miss) |
//! | local | yes | newest mtime not newer | reuse (hit) |
//! | local | yes | newer mtime or changed matches | rehash, restage (stale) |
//! | remote | no | | download, store (miss) |
//! | remote | yes, no Last-Modified | | download again (stale) |
//! | remote | yes | `If-Modified-Since` returns 304 | reuse (hit) |
//! | remote | yes | `If-Modified-Since` returns 200 | replace staged file (stale) |

pub mod context;
pub mod disk;
pub mod engine;
pub mod fetch;
pub mod hash;
pub mod lru;
pub mod origin;
pub mod staging;
pub mod store;
pub mod types;

pub use context::{ContextWalker, FileMeta, FsContext};
pub use disk::DiskLayer;
pub use engine::{Instruction, Resolution, ResolvedSources, Resolver, SourceOutcome};
pub use fetch::{Downloader, FetchOutcome, FetchResponse, HttpDownloader, RemoteFetcher};
pub use hash::{hash_directory, hash_file, hash_many, ContentHash, HashKind};
pub use lru::{LruCache, DEFAULT_CAPACITY};
pub use origin::{aggregate_key, Origin};
pub use store::{CacheStore, FileCache};
pub use types::{
    AggregateRecord, CacheRecord, CacheSummary, CopyEntry, CopyEntrySet, DeleteOutcome, EntryKind,
};
