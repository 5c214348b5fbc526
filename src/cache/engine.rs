//! Hit/stale/miss decisions for COPY/ADD sources
//!
//! Local origins are validated by modification time: the newest mtime in
//! the source subtree is recorded when the source is hashed, and a later
//! lookup only rehashes when something in the subtree is newer (or, for
//! wildcard origins, when the set of matches changed).
//!
//! Remote origins are validated by HTTP conditional requests against the
//! recorded `Last-Modified`. Without a recorded value the download is
//! repeated unconditionally. Network failures are never papered over with
//! the cached copy.

use crate::cache::context::{ContextWalker, FileMeta};
use crate::cache::disk::DiskLayer;
use crate::cache::fetch::{Downloader, FetchOutcome, FetchedFile, RemoteFetcher};
use crate::cache::hash::{hash_directory, hash_file, hash_many, ContentHash};
use crate::cache::origin::{contains_wildcards, Origin, CONTEXT_ROOT};
use crate::cache::staging::stage_local;
use crate::cache::store::{CacheStore, FileCache};
use crate::cache::types::{AggregateRecord, CopyEntry, CopyEntrySet, EntryKind};
use crate::error::{CacheError, CacheResult};
use chrono::{DateTime, Utc};
use glob::{MatchOptions, Pattern};
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// Instruction a source belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Instruction {
    Copy,
    Add,
}

impl Instruction {
    /// ADD may fetch URLs; COPY may not
    pub fn allows_remote(&self) -> bool {
        matches!(self, Self::Add)
    }

    /// ADD unpacks local archives
    pub fn decompresses_local(&self) -> bool {
        matches!(self, Self::Add)
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Copy => write!(f, "COPY"),
            Self::Add => write!(f, "ADD"),
        }
    }
}

/// How a source's copy info was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    /// Cached entry still valid, nothing rehashed
    Hit,
    /// Cached entry was outdated and has been replaced
    Stale,
    /// Nothing cached; computed and stored
    Miss,
    /// Cache disabled; computed and not stored
    Bypass,
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Hit => "hit",
            Self::Stale => "stale",
            Self::Miss => "miss",
            Self::Bypass => "bypass",
        };
        write!(f, "{}", s)
    }
}

/// Resolved copy info of one source
#[derive(Debug, Clone, Serialize)]
pub struct SourceOutcome {
    pub origin: String,
    pub resolution: Resolution,
    pub copy_info: CopyEntrySet,
}

/// All sources of one instruction plus its combined identity
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedSources {
    pub sources: Vec<SourceOutcome>,
    pub src_hash: String,
    pub orig_paths: String,
}

/// A local source as it currently exists in the context
#[derive(Debug, Clone)]
struct LocalSource {
    meta: FileMeta,
    newest: DateTime<Utc>,
}

/// Resolves COPY/ADD sources through a shared [`CacheStore`]
pub struct Resolver {
    store: Arc<CacheStore>,
    context: Arc<dyn ContextWalker>,
    fetcher: RemoteFetcher,
    use_cache: bool,
}

impl Resolver {
    pub fn new(
        store: Arc<CacheStore>,
        context: Arc<dyn ContextWalker>,
        downloader: Arc<dyn Downloader>,
    ) -> Self {
        Self {
            store,
            context,
            fetcher: RemoteFetcher::new(downloader),
            use_cache: true,
        }
    }

    /// Enable or bypass the cache (bypassed sources are never stored)
    pub fn use_cache(mut self, enabled: bool) -> Self {
        self.use_cache = enabled;
        self
    }

    /// Resolve one raw source specifier
    pub async fn resolve(&self, instruction: Instruction, raw: &str) -> CacheResult<SourceOutcome> {
        let origin = Origin::parse(raw)?;

        if origin.is_remote() && !instruction.allows_remote() {
            return Err(CacheError::RemoteNotAllowed {
                instruction: instruction.to_string(),
                origin: origin.key().to_string(),
            });
        }

        let (resolution, copy_info) = match &origin {
            Origin::Remote(_) => self.resolve_remote(&origin).await?,
            Origin::Local(key) => self.resolve_local(key, instruction).await?,
        };

        debug!("{} {}: {}", instruction, origin, resolution);
        Ok(SourceOutcome {
            origin: origin.key().to_string(),
            resolution,
            copy_info,
        })
    }

    /// Resolve every source of one instruction and derive its srcHash/origPaths
    ///
    /// A single resulting entry carries its own hash and name. Several
    /// entries get a `multi:` hash and space-joined names; with two or more
    /// origins that pair is kept as an aggregate record. The record is reused
    /// only while every origin is a hit and its entry hashes are the ones
    /// the record was computed over.
    pub async fn resolve_sources(
        &self,
        instruction: Instruction,
        raws: &[String],
    ) -> CacheResult<ResolvedSources> {
        if raws.is_empty() {
            return Err(CacheError::validation(format!(
                "{} needs at least one source",
                instruction
            )));
        }

        let mut sources = Vec::with_capacity(raws.len());
        for raw in raws {
            sources.push(self.resolve(instruction, raw).await?);
        }

        let entries: Vec<&CopyEntry> = sources
            .iter()
            .flat_map(|s| s.copy_info.entries.iter())
            .collect();

        if let [entry] = entries.as_slice() {
            let (src_hash, orig_paths) = (entry.hash.to_string(), entry.name.clone());
            return Ok(ResolvedSources {
                sources,
                src_hash,
                orig_paths,
            });
        }

        let origins: Vec<String> = sources.iter().map(|s| s.origin.clone()).collect();
        let entry_hashes: Vec<ContentHash> = entries.iter().map(|e| e.hash.clone()).collect();
        let keep_aggregate = self.use_cache && origins.len() >= 2;

        if keep_aggregate && sources.iter().all(|s| s.resolution == Resolution::Hit) {
            match self.store.get_aggregate_info(&origins).await? {
                Some(record) if record.matches_entries(&entry_hashes) => {
                    debug!("Reusing aggregate hash for {}", origins.join(","));
                    return Ok(ResolvedSources {
                        sources,
                        src_hash: record.src_hash,
                        orig_paths: record.orig_paths,
                    });
                }
                Some(_) => debug!("Aggregate for {} is outdated", origins.join(",")),
                None => {}
            }
        }

        let src_hash = hash_many(entry_hashes.iter().cloned()).to_string();
        let orig_paths = entries
            .iter()
            .map(|e| e.name.as_str())
            .collect::<Vec<_>>()
            .join(" ");

        if keep_aggregate {
            let record = AggregateRecord::new(src_hash.clone(), orig_paths.clone())
                .with_entry_hashes(entry_hashes);
            self.store.set_aggregate_info(&origins, record, true).await?;
        }

        Ok(ResolvedSources {
            sources,
            src_hash,
            orig_paths,
        })
    }

    async fn resolve_local(
        &self,
        key: &str,
        instruction: Instruction,
    ) -> CacheResult<(Resolution, CopyEntrySet)> {
        let decompress = instruction.decompresses_local();

        let context = Arc::clone(&self.context);
        let scan_key = key.to_string();
        let current = blocking(move || scan_local(&*context, &scan_key)).await?;

        if !self.use_cache {
            let set = self
                .stage_local_sources(current, self.store.disk().uncached(), decompress)
                .await?;
            return Ok((Resolution::Bypass, set));
        }

        let resolution = match self.store.get_copy_info(key).await? {
            None => Resolution::Miss,
            Some(cached) => {
                if !staged_present(&cached).await {
                    warn!("Staged content for {} is missing, staging again", key);
                    Resolution::Miss
                } else if is_current(&cached, &current) {
                    return Ok((Resolution::Hit, with_decompress(cached, decompress)));
                } else {
                    debug!("{} changed since it was hashed", key);
                    Resolution::Stale
                }
            }
        };

        let set = self
            .stage_local_sources(current, self.store.disk().clone(), decompress)
            .await?;
        self.store.set_copy_info(key, set.clone(), true).await?;
        Ok((resolution, set))
    }

    async fn stage_local_sources(
        &self,
        sources: Vec<LocalSource>,
        disk: DiskLayer,
        decompress: bool,
    ) -> CacheResult<CopyEntrySet> {
        let entries = blocking(move || {
            sources
                .iter()
                .map(|source| build_local_entry(&disk, source, decompress))
                .collect::<CacheResult<Vec<_>>>()
        })
        .await?;
        Ok(CopyEntrySet::new(entries))
    }

    async fn resolve_remote(&self, origin: &Origin) -> CacheResult<(Resolution, CopyEntrySet)> {
        let key = origin.key();

        if !self.use_cache {
            let dest = self.store.disk().uncached().remote_path(origin)?;
            let set = self.download(origin, &dest).await?;
            return Ok((Resolution::Bypass, set));
        }

        let dest = self.store.disk().remote_path(origin)?;
        let Some(cached) = self.store.get_copy_info(key).await? else {
            let set = self.download(origin, &dest).await?;
            self.store.set_copy_info(key, set.clone(), true).await?;
            return Ok((Resolution::Miss, set));
        };

        let staged = match cached.single() {
            Some(entry) => path_exists(&entry.path).await,
            None => false,
        };
        let conditional = match (cached.single(), cached.last_modified()) {
            (None, _) => {
                warn!(
                    "Cached copy info for {} has {} entries, expected 1; downloading again",
                    key,
                    cached.len()
                );
                None
            }
            (Some(_), _) if !staged => {
                warn!("Staged download for {} is missing, downloading again", key);
                None
            }
            (Some(_), None) => {
                debug!("No Last-Modified recorded for {}, downloading again", key);
                None
            }
            (Some(_), Some(since)) => Some(since.to_string()),
        };

        let set = match conditional {
            Some(since) => match self.fetcher.fetch(key, &dest, Some(&since)).await? {
                FetchOutcome::NotModified => return Ok((Resolution::Hit, cached)),
                FetchOutcome::Fetched(fetched) => remote_entry_set(origin, fetched)?,
            },
            None => self.download(origin, &dest).await?,
        };

        self.store.set_copy_info(key, set.clone(), true).await?;
        Ok((Resolution::Stale, set))
    }

    /// Unconditional download into `dest`
    async fn download(&self, origin: &Origin, dest: &Path) -> CacheResult<CopyEntrySet> {
        match self.fetcher.fetch(origin.key(), dest, None).await? {
            FetchOutcome::Fetched(fetched) => remote_entry_set(origin, fetched),
            FetchOutcome::NotModified => Err(CacheError::Internal(format!(
                "unconditional download of {} reported not modified",
                origin
            ))),
        }
    }
}

async fn blocking<T, F>(f: F) -> CacheResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> CacheResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| CacheError::Internal(format!("blocking task failed: {}", e)))?
}

async fn path_exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

async fn staged_present(set: &CopyEntrySet) -> bool {
    for entry in &set.entries {
        if !path_exists(&entry.path).await {
            return false;
        }
    }
    true
}

fn with_decompress(mut set: CopyEntrySet, decompress: bool) -> CopyEntrySet {
    for entry in &mut set.entries {
        entry.decompress = decompress;
    }
    set
}

fn remote_entry_set(origin: &Origin, fetched: FetchedFile) -> CacheResult<CopyEntrySet> {
    let modified = fetched.modified();
    let entry = CopyEntry {
        kind: EntryKind::File,
        name: origin.file_name()?,
        path: fetched.path,
        hash: fetched.hash,
        decompress: false,
        modified,
    };
    Ok(CopyEntrySet::new(vec![entry]).with_last_modified(fetched.last_modified))
}

/// Cached entries still describe the current sources
fn is_current(cached: &CopyEntrySet, current: &[LocalSource]) -> bool {
    if cached.len() != current.len() {
        return false;
    }

    let mut entries: Vec<&CopyEntry> = cached.entries.iter().collect();
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    let mut sources: Vec<&LocalSource> = current.iter().collect();
    sources.sort_by(|a, b| a.meta.name.cmp(&b.meta.name));

    entries.iter().zip(sources).all(|(entry, source)| {
        entry.name == source.meta.name
            && (entry.kind == EntryKind::Directory) == source.meta.is_dir
            && entry.modified.is_some_and(|recorded| source.newest <= recorded)
    })
}

/// Find the sources an origin currently names, without hashing anything
fn scan_local(context: &dyn ContextWalker, key: &str) -> CacheResult<Vec<LocalSource>> {
    let metas = if contains_wildcards(key) {
        expand_wildcard(context, key)?
    } else {
        vec![context.stat(key)?]
    };

    metas
        .into_iter()
        .map(|meta| {
            let newest = newest_modified(context, &meta)?;
            Ok(LocalSource { meta, newest })
        })
        .collect()
}

/// Leading components of a pattern that contain no wildcard
fn literal_prefix(pattern: &str) -> String {
    let literal: Vec<&str> = pattern
        .split('/')
        .take_while(|part| !contains_wildcards(part))
        .collect();
    if literal.is_empty() {
        CONTEXT_ROOT.to_string()
    } else {
        literal.join("/")
    }
}

fn is_within(name: &str, ancestor: &str) -> bool {
    name.strip_prefix(ancestor)
        .is_some_and(|rest| rest.starts_with('/'))
}

fn expand_wildcard(context: &dyn ContextWalker, pattern: &str) -> CacheResult<Vec<FileMeta>> {
    let matcher =
        Pattern::new(pattern).map_err(|e| CacheError::invalid_origin(pattern, e.to_string()))?;
    let options = MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    };

    let base = literal_prefix(pattern);
    let mut matches: Vec<FileMeta> = vec![];
    let walked = context.walk(&base, &mut |meta| {
        if meta.name == CONTEXT_ROOT || matches.iter().any(|m| is_within(&meta.name, &m.name)) {
            return Ok(());
        }
        if matcher.matches_with(&meta.name, options) {
            matches.push(meta.clone());
        }
        Ok(())
    });

    match walked {
        Ok(()) | Err(CacheError::PathNotFound(_)) => {}
        Err(e) => return Err(e),
    }
    if matches.is_empty() {
        return Err(CacheError::PathNotFound(pattern.to_string()));
    }
    Ok(matches)
}

/// Newest modification time of a file or anywhere in a directory subtree
fn newest_modified(context: &dyn ContextWalker, meta: &FileMeta) -> CacheResult<DateTime<Utc>> {
    let mut newest = meta.modified;
    if meta.is_dir {
        context.walk(&meta.name, &mut |child| {
            newest = newest.max(child.modified);
            Ok(())
        })?;
    }
    Ok(newest)
}

fn hash_source(meta: &FileMeta) -> CacheResult<ContentHash> {
    if meta.is_dir {
        hash_directory(&meta.path)
    } else {
        hash_file(&meta.path)
    }
}

/// Hash a source and stage it into the slot its content selects
///
/// Entries recorded earlier keep pointing at their own slots, so a build
/// still reading them never sees the new content.
fn build_local_entry(
    disk: &DiskLayer,
    source: &LocalSource,
    decompress: bool,
) -> CacheResult<CopyEntry> {
    let hash = hash_source(&source.meta)?;
    let staged = disk.local_path(&source.meta.name, &hash, source.newest);
    stage_local(&source.meta.path, &staged)?;

    Ok(CopyEntry {
        kind: if source.meta.is_dir {
            EntryKind::Directory
        } else {
            EntryKind::File
        },
        name: source.meta.name.clone(),
        path: staged,
        hash,
        decompress,
        modified: Some(source.newest),
    })
}
