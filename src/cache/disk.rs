//! Durable cache tier: one JSON record per origin
//!
//! Layout under the cache root:
//!
//! | Path | Content |
//! |------|---------|
//! | `records/<sha256(origin)>` | JSON [`CacheRecord`] with copy info |
//! | `aggregates/<sha256(key)>` | JSON [`CacheRecord`] of a multi-origin aggregate |
//! | `remote/<sha256(url)>/<file name>` | staged download of a remote origin |
//! | `local/<slot>/<base name>` | staged copy of a local source |
//! | `uncached/` | content staged with the cache disabled |
//!
//! Records are written to a temporary file in the same directory and renamed
//! over the target, so a crash never leaves a partially written record.
//! Local slots are derived from the source name, content hash and
//! modification time; a slot is written once and never replaced.

use crate::cache::hash::ContentHash;
use crate::cache::origin::{key_digest, Origin, CONTEXT_ROOT};
use crate::cache::types::CacheRecord;
use crate::error::{CacheError, CacheResult};
use chrono::{DateTime, Utc};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

/// Directory names under the cache root
pub mod layout {
    pub const RECORDS: &str = "records";
    pub const AGGREGATES: &str = "aggregates";
    pub const REMOTE: &str = "remote";
    pub const LOCAL: &str = "local";
    pub const UNCACHED: &str = "uncached";
}

/// Base name a staged copy of the whole build context gets
const CONTEXT_BASE_NAME: &str = "context";

/// On-disk cache tier
#[derive(Debug, Clone)]
pub struct DiskLayer {
    root: PathBuf,
    records_dir: PathBuf,
    aggregates_dir: PathBuf,
    remote_dir: PathBuf,
    local_dir: PathBuf,
}

impl DiskLayer {
    /// Create a disk layer rooted at `root` (directories are created lazily)
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            records_dir: root.join(layout::RECORDS),
            aggregates_dir: root.join(layout::AGGREGATES),
            remote_dir: root.join(layout::REMOTE),
            local_dir: root.join(layout::LOCAL),
        }
    }

    fn dirs(&self) -> [&PathBuf; 4] {
        [
            &self.records_dir,
            &self.aggregates_dir,
            &self.remote_dir,
            &self.local_dir,
        ]
    }

    /// Ensure all cache directories exist
    pub async fn ensure_dirs(&self) -> CacheResult<()> {
        for dir in self.dirs() {
            fs::create_dir_all(dir)
                .await
                .map_err(|e| CacheError::io(format!("creating directory {}", dir.display()), e))?;
        }
        Ok(())
    }

    /// Layer used for staging when the cache is bypassed
    ///
    /// Keeps uncached content away from paths that cached entries point at.
    pub fn uncached(&self) -> DiskLayer {
        DiskLayer::new(&self.root.join(layout::UNCACHED))
    }

    pub fn records_dir(&self) -> &Path {
        &self.records_dir
    }

    /// Root of the staged local content
    pub fn local_dir(&self) -> &Path {
        &self.local_dir
    }

    /// Record file for an origin
    pub fn record_path(&self, origin: &str) -> PathBuf {
        self.records_dir.join(key_digest(origin))
    }

    /// Record file for a canonical aggregate key
    pub fn aggregate_path(&self, key: &str) -> PathBuf {
        self.aggregates_dir.join(key_digest(key))
    }

    /// Deterministic staged location of a remote origin's content
    pub fn remote_path(&self, origin: &Origin) -> CacheResult<PathBuf> {
        Ok(self
            .remote_dir
            .join(key_digest(origin.key()))
            .join(origin.file_name()?))
    }

    /// Staged location of a local source with the given content
    ///
    /// Changed content (or a newer modification time) maps to a new slot,
    /// so restaging never overwrites a path an installed record uses.
    pub fn local_path(&self, name: &str, hash: &ContentHash, modified: DateTime<Utc>) -> PathBuf {
        let slot = key_digest(&format!("{}\n{}\n{}", name, hash, modified.to_rfc3339()));
        let base = match name.rsplit('/').next() {
            Some(base) if !base.is_empty() && name != CONTEXT_ROOT => base,
            _ => CONTEXT_BASE_NAME,
        };
        self.local_dir.join(slot).join(base)
    }

    /// Load the copy info record of an origin; `Ok(None)` when none exists
    pub async fn load(&self, origin: &str) -> CacheResult<Option<CacheRecord>> {
        Self::load_from(self.record_path(origin), origin).await
    }

    /// Load the record of an aggregate key; `Ok(None)` when none exists
    pub async fn load_aggregate(&self, key: &str) -> CacheResult<Option<CacheRecord>> {
        Self::load_from(self.aggregate_path(key), key).await
    }

    async fn load_from(path: PathBuf, key: &str) -> CacheResult<Option<CacheRecord>> {
        let content = match fs::read(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No cache record on disk for {}", key);
                return Ok(None);
            }
            Err(e) => {
                return Err(CacheError::io(
                    format!("reading cache record {}", path.display()),
                    e,
                ))
            }
        };

        let record = Self::decode(&path, &content)?;
        if record.origin != key {
            return Err(CacheError::CorruptRecord {
                path,
                reason: format!("record belongs to {:?}, expected {:?}", record.origin, key),
            });
        }

        Ok(Some(record))
    }

    fn decode(path: &Path, content: &[u8]) -> CacheResult<CacheRecord> {
        let record: CacheRecord =
            serde_json::from_slice(content).map_err(|e| CacheError::CorruptRecord {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        record.validate().map_err(|e| CacheError::CorruptRecord {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        Ok(record)
    }

    /// Persist a record atomically
    ///
    /// Aggregate records go to `aggregates/`, everything else to `records/`.
    pub async fn store(&self, record: &CacheRecord) -> CacheResult<()> {
        record.validate()?;

        let (dir, path) = if record.aggregate.is_some() {
            (&self.aggregates_dir, self.aggregate_path(&record.origin))
        } else {
            (&self.records_dir, self.record_path(&record.origin))
        };
        fs::create_dir_all(dir)
            .await
            .map_err(|e| CacheError::io(format!("creating directory {}", dir.display()), e))?;

        let content = serde_json::to_vec_pretty(record)?;
        write_atomic(&path, content).await?;

        debug!("Saved cache record for {} to {}", record.origin, path.display());
        Ok(())
    }

    /// Delete the copy info record of an origin; `Ok(false)` when it did not exist
    ///
    /// Remote origins also lose their staged download. Staged local content
    /// is left alone because origins naming the same source share slots.
    pub async fn delete(&self, origin: &str) -> CacheResult<bool> {
        if !Self::remove_record(&self.record_path(origin)).await? {
            return Ok(false);
        }
        debug!("Removed cache record for {}", origin);

        if let Ok(parsed @ Origin::Remote(_)) = Origin::parse(origin) {
            self.remove_remote_content(&parsed).await?;
        }

        Ok(true)
    }

    /// Delete the record of an aggregate key; `Ok(false)` when it did not exist
    pub async fn delete_aggregate(&self, key: &str) -> CacheResult<bool> {
        Self::remove_record(&self.aggregate_path(key)).await
    }

    async fn remove_record(path: &Path) -> CacheResult<bool> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(CacheError::io(
                format!("removing cache record {}", path.display()),
                e,
            )),
        }
    }

    async fn remove_remote_content(&self, origin: &Origin) -> CacheResult<()> {
        let staged = self.remote_path(origin)?;
        let Some(dir) = staged.parent() else {
            return Ok(());
        };

        match fs::remove_dir_all(dir).await {
            Ok(()) => {
                debug!("Removed staged download {}", staged.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::io(
                format!("removing staged download {}", dir.display()),
                e,
            )),
        }
    }

    /// Enumerate all persisted records as `(record file name, record)`
    ///
    /// Unreadable or corrupted records are skipped with a warning.
    pub async fn list(&self) -> CacheResult<Vec<(String, CacheRecord)>> {
        let mut records = Self::list_dir(&self.records_dir).await?;
        records.extend(self.list_aggregates().await?);
        records.sort_by(|a, b| a.1.origin.cmp(&b.1.origin));
        Ok(records)
    }

    /// Enumerate persisted aggregate records only
    pub async fn list_aggregates(&self) -> CacheResult<Vec<(String, CacheRecord)>> {
        Self::list_dir(&self.aggregates_dir).await
    }

    async fn list_dir(dir: &Path) -> CacheResult<Vec<(String, CacheRecord)>> {
        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => {
                return Err(CacheError::io(
                    format!("reading cache record directory {}", dir.display()),
                    e,
                ))
            }
        };

        let mut records = vec![];
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| CacheError::io("reading cache record entry", e))?
        {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') {
                continue;
            }

            let path = entry.path();
            let loaded = match fs::read(&path).await {
                Ok(content) => Self::decode(&path, &content),
                Err(e) => Err(CacheError::io(format!("reading {}", path.display()), e)),
            };

            match loaded {
                Ok(record) => records.push((name, record)),
                Err(e) => warn!("Failed to load cache record {}: {}", name, e),
            }
        }
        Ok(records)
    }

    /// Remove every record and all staged content
    pub async fn clear(&self) -> CacheResult<()> {
        let uncached = self.root.join(layout::UNCACHED);
        for dir in self.dirs().into_iter().chain([&uncached]) {
            match fs::remove_dir_all(dir).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(CacheError::io(
                        format!("removing directory {}", dir.display()),
                        e,
                    ))
                }
            }
        }
        self.ensure_dirs().await
    }
}

/// Write `content` to a sibling temp file, sync it, then rename over `path`
async fn write_atomic(path: &Path, content: Vec<u8>) -> CacheResult<()> {
    let dir = path
        .parent()
        .ok_or_else(|| CacheError::Internal(format!("{} has no parent", path.display())))?
        .to_path_buf();
    let target = path.to_path_buf();

    let written = tokio::task::spawn_blocking(move || -> std::io::Result<()> {
        let mut tmp = tempfile::Builder::new()
            .prefix(".record")
            .tempfile_in(&dir)?;
        tmp.write_all(&content)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&target).map_err(|e| e.error)?;
        Ok(())
    })
    .await
    .map_err(|e| CacheError::Internal(format!("record write task failed: {}", e)))?;

    written.map_err(|e| CacheError::io(format!("writing {}", path.display()), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::types::{AggregateRecord, CopyEntry, CopyEntrySet, EntryKind};
    use tempfile::TempDir;

    fn record(origin: &str, path: PathBuf) -> CacheRecord {
        CacheRecord::for_entries(
            origin,
            CopyEntrySet::new(vec![CopyEntry {
                kind: EntryKind::File,
                name: "app.tar".to_string(),
                path,
                hash: ContentHash::parse("file:abc").unwrap(),
                decompress: false,
                modified: None,
            }])
            .with_last_modified(Some("Wed, 21 Oct 2015 07:28:00 GMT".to_string())),
        )
    }

    #[tokio::test]
    async fn store_and_load() {
        let temp = TempDir::new().unwrap();
        let disk = DiskLayer::new(temp.path());

        let rec = record("src/app.tar", PathBuf::from("/x"));
        disk.store(&rec).await.unwrap();

        let loaded = disk.load("src/app.tar").await.unwrap().unwrap();
        assert_eq!(loaded, rec);
        assert!(disk.record_path("src/app.tar").ends_with(key_digest("src/app.tar")));
    }

    #[tokio::test]
    async fn load_missing_is_none() {
        let temp = TempDir::new().unwrap();
        let disk = DiskLayer::new(temp.path());
        assert!(disk.load("nothing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn store_leaves_no_temp_files() {
        let temp = TempDir::new().unwrap();
        let disk = DiskLayer::new(temp.path());

        disk.store(&record("a", PathBuf::from("/x"))).await.unwrap();
        disk.store(&record("a", PathBuf::from("/y"))).await.unwrap();

        let names: Vec<_> = std::fs::read_dir(disk.records_dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec![key_digest("a")]);
        assert_eq!(
            disk.load("a").await.unwrap().unwrap().copy_info.entries[0].path,
            PathBuf::from("/y")
        );
    }

    #[tokio::test]
    async fn corrupted_record_is_error() {
        let temp = TempDir::new().unwrap();
        let disk = DiskLayer::new(temp.path());
        disk.ensure_dirs().await.unwrap();
        std::fs::write(disk.record_path("a"), "{not json").unwrap();

        let err = disk.load("a").await.unwrap_err();
        assert!(matches!(err, CacheError::CorruptRecord { .. }));
    }

    #[tokio::test]
    async fn record_for_other_origin_is_corrupt() {
        let temp = TempDir::new().unwrap();
        let disk = DiskLayer::new(temp.path());
        disk.store(&record("a", PathBuf::from("/x"))).await.unwrap();
        std::fs::rename(disk.record_path("a"), disk.record_path("b")).unwrap();

        assert!(matches!(
            disk.load("b").await.unwrap_err(),
            CacheError::CorruptRecord { .. }
        ));
    }

    #[tokio::test]
    async fn delete_missing_is_not_found() {
        let temp = TempDir::new().unwrap();
        let disk = DiskLayer::new(temp.path());
        assert!(!disk.delete("unknown-origin").await.unwrap());
    }

    #[tokio::test]
    async fn delete_remote_removes_staged_download() {
        let temp = TempDir::new().unwrap();
        let disk = DiskLayer::new(temp.path());
        let url = "http://example.com/dist/app.tar";
        let origin = Origin::parse(url).unwrap();

        let staged = disk.remote_path(&origin).unwrap();
        std::fs::create_dir_all(staged.parent().unwrap()).unwrap();
        std::fs::write(&staged, "payload").unwrap();
        disk.store(&record(url, staged.clone())).await.unwrap();

        assert!(disk.delete(url).await.unwrap());
        assert!(!staged.exists());
        assert!(disk.load(url).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_skips_corrupt_records() {
        let temp = TempDir::new().unwrap();
        let disk = DiskLayer::new(temp.path());

        disk.store(&record("b", PathBuf::from("/b"))).await.unwrap();
        disk.store(&CacheRecord::for_aggregate(
            "a,b",
            AggregateRecord::new("multi:ff", "a b"),
        ))
        .await
        .unwrap();
        std::fs::write(disk.records_dir().join("garbage"), "][").unwrap();

        let listed = disk.list().await.unwrap();
        let origins: Vec<_> = listed.iter().map(|(_, r)| r.origin.as_str()).collect();
        assert_eq!(origins, vec!["a,b", "b"]);
    }

    #[tokio::test]
    async fn clear_removes_everything() {
        let temp = TempDir::new().unwrap();
        let disk = DiskLayer::new(temp.path());
        disk.store(&record("a", PathBuf::from("/a"))).await.unwrap();
        disk.store(&CacheRecord::for_aggregate(
            "a,b",
            AggregateRecord::new("multi:ff", "a b"),
        ))
        .await
        .unwrap();
        let staged = disk.local_path("src", &ContentHash::parse("dir:aa").unwrap(), Utc::now());
        std::fs::create_dir_all(&staged).unwrap();

        disk.clear().await.unwrap();

        assert!(disk.list().await.unwrap().is_empty());
        assert!(!staged.exists());
        assert!(disk.local_dir().exists());
    }

    #[tokio::test]
    async fn aggregate_and_origin_with_same_key_coexist() {
        let temp = TempDir::new().unwrap();
        let disk = DiskLayer::new(temp.path());

        disk.store(&record("a,b", PathBuf::from("/file-named-a-comma-b")))
            .await
            .unwrap();
        disk.store(&CacheRecord::for_aggregate(
            "a,b",
            AggregateRecord::new("multi:ff", "a b"),
        ))
        .await
        .unwrap();

        let origin = disk.load("a,b").await.unwrap().unwrap();
        assert_eq!(origin.copy_info.len(), 1);
        let aggregate = disk.load_aggregate("a,b").await.unwrap().unwrap();
        assert_eq!(aggregate.aggregate.unwrap().src_hash, "multi:ff");

        assert!(disk.delete("a,b").await.unwrap());
        assert!(disk.load_aggregate("a,b").await.unwrap().is_some());
        assert_eq!(disk.list_aggregates().await.unwrap().len(), 1);
    }

    #[test]
    fn uncached_layer_is_separate() {
        let disk = DiskLayer::new(Path::new("/cache"));
        let origin = Origin::parse("http://example.com/app.tar").unwrap();
        let uncached = disk.uncached();
        let hash = ContentHash::parse("dir:aa").unwrap();
        let now = Utc::now();

        assert_ne!(disk.remote_path(&origin).unwrap(), uncached.remote_path(&origin).unwrap());
        assert!(uncached.local_path("src", &hash, now).starts_with("/cache/uncached"));
        assert_ne!(disk.local_path("src", &hash, now), uncached.local_path("src", &hash, now));
    }

    #[test]
    fn local_slot_follows_content() {
        let disk = DiskLayer::new(Path::new("/cache"));
        let v1 = ContentHash::parse("file:aa").unwrap();
        let v2 = ContentHash::parse("file:bb").unwrap();
        let monday = DateTime::parse_from_rfc3339("2015-10-19T07:28:00Z").unwrap().with_timezone(&Utc);
        let wednesday = DateTime::parse_from_rfc3339("2015-10-21T07:28:00Z").unwrap().with_timezone(&Utc);

        let staged = disk.local_path("src/main.rs", &v1, monday);
        assert!(staged.starts_with("/cache/local"));
        assert!(staged.ends_with("main.rs"));
        assert_eq!(staged, disk.local_path("src/main.rs", &v1, monday));

        assert_ne!(staged, disk.local_path("src/main.rs", &v2, monday));
        assert_ne!(staged, disk.local_path("src/main.rs", &v1, wednesday));
        assert_ne!(staged, disk.local_path("lib/main.rs", &v1, monday));
        assert!(disk.local_path(".", &v1, monday).ends_with("context"));
    }
}
