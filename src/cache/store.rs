//! Two-tier cache store: in-memory LRU in front of the disk layer
//!
//! All state of one store (both LRU maps and all disk I/O) sits behind a
//! single mutex, so concurrent builds sharing a store never observe a torn
//! read or write the same record file at the same time. Writes go to disk
//! first and to memory second; a failed disk write leaves the previous
//! entry in place.

use crate::cache::disk::DiskLayer;
use crate::cache::lru::LruCache;
use crate::cache::origin::aggregate_key;
use crate::cache::types::{
    AggregateRecord, CacheRecord, CacheSummary, CopyEntrySet, DeleteOutcome,
};
use crate::error::{CacheError, CacheResult};
use async_trait::async_trait;
use std::path::Path;
use tokio::sync::Mutex;
use tracing::debug;

/// Cache capability consumed by the builder and the list/delete surface
#[async_trait]
pub trait FileCache: Send + Sync {
    /// Look up the entry set of an origin (memory, then disk)
    async fn get_copy_info(&self, origin: &str) -> CacheResult<Option<CopyEntrySet>>;

    /// Install an entry set, writing through to disk when `persist` is set
    async fn set_copy_info(
        &self,
        origin: &str,
        copy_info: CopyEntrySet,
        persist: bool,
    ) -> CacheResult<()>;

    /// Remove origins from memory and disk; absent origins are `NotFound`
    async fn del_copy_info(&self, origins: &[String]) -> CacheResult<Vec<DeleteOutcome>>;

    /// Look up the aggregate record of several origins in any order
    async fn get_aggregate_info(&self, origins: &[String]) -> CacheResult<Option<AggregateRecord>>;

    /// Install the aggregate record of several origins
    async fn set_aggregate_info(
        &self,
        origins: &[String],
        record: AggregateRecord,
        persist: bool,
    ) -> CacheResult<()>;

    /// Remove an aggregate record, returning whether it existed
    async fn del_aggregate_info(&self, origins: &[String]) -> CacheResult<bool>;

    /// Drop everything from memory and disk
    async fn clear(&self) -> CacheResult<()>;

    /// All persisted records as `(record file name, record)`
    async fn list_records(&self) -> CacheResult<Vec<(String, CacheRecord)>>;
}

struct StoreState {
    copy_info: LruCache<String, CopyEntrySet>,
    aggregates: LruCache<String, AggregateRecord>,
}

/// LRU + disk cache store, shared between builds via `Arc`
pub struct CacheStore {
    state: Mutex<StoreState>,
    disk: DiskLayer,
}

impl CacheStore {
    /// Create a store rooted at `root` holding up to `capacity` entries per map in memory
    pub fn new(root: &Path, capacity: usize) -> Self {
        Self {
            state: Mutex::new(StoreState {
                copy_info: LruCache::new(capacity),
                aggregates: LruCache::new(capacity),
            }),
            disk: DiskLayer::new(root),
        }
    }

    /// Create a store and make sure its directories exist
    pub async fn open(root: &Path, capacity: usize) -> CacheResult<Self> {
        let store = Self::new(root, capacity);
        store.disk.ensure_dirs().await?;
        debug!(
            "Opened file cache at {} (capacity {})",
            root.display(),
            capacity
        );
        Ok(store)
    }

    /// The disk layer, for staging paths
    pub fn disk(&self) -> &DiskLayer {
        &self.disk
    }

    /// Number of in-memory `(copy info, aggregate)` entries
    pub async fn memory_size(&self) -> (usize, usize) {
        let state = self.state.lock().await;
        (state.copy_info.size(), state.aggregates.size())
    }

    /// One listing row per persisted entry
    pub async fn summaries(&self) -> CacheResult<Vec<CacheSummary>> {
        let records = self.list_records().await?;
        Ok(records
            .iter()
            .flat_map(|(file, record)| CacheSummary::from_record(record, file))
            .collect())
    }

    /// Forget every aggregate built from `origin`, in memory and on disk
    async fn drop_aggregates_including(
        &self,
        state: &mut StoreState,
        origin: &str,
    ) -> CacheResult<()> {
        for key in state.aggregates.remove_where(|_, record| record.includes(origin)) {
            debug!("Dropped aggregate {} with {}", key, origin);
        }
        for (_, record) in self.disk.list_aggregates().await? {
            let includes = record
                .aggregate
                .as_ref()
                .is_some_and(|aggregate| aggregate.includes(origin));
            if includes {
                self.disk.delete_aggregate(&record.origin).await?;
                debug!("Deleted aggregate record {} with {}", record.origin, origin);
            }
        }
        Ok(())
    }

    fn check_origin(origin: &str) -> CacheResult<()> {
        if origin.trim().is_empty() {
            return Err(CacheError::invalid_origin(origin, "origin key is empty"));
        }
        Ok(())
    }
}

#[async_trait]
impl FileCache for CacheStore {
    async fn get_copy_info(&self, origin: &str) -> CacheResult<Option<CopyEntrySet>> {
        Self::check_origin(origin)?;
        let mut state = self.state.lock().await;

        if let Some(copy_info) = state.copy_info.get(&origin.to_string()) {
            return Ok(Some(copy_info.clone()));
        }

        debug!("Copy info for {} not in memory, trying disk", origin);
        let Some(record) = self.disk.load(origin).await? else {
            debug!("Copy info for {} not on disk", origin);
            return Ok(None);
        };

        if record.copy_info.is_empty() {
            return Ok(None);
        }

        if let Some(evicted) = state
            .copy_info
            .set(origin.to_string(), record.copy_info.clone())
        {
            debug!("Evicted {} from memory", evicted);
        }
        Ok(Some(record.copy_info))
    }

    async fn set_copy_info(
        &self,
        origin: &str,
        copy_info: CopyEntrySet,
        persist: bool,
    ) -> CacheResult<()> {
        Self::check_origin(origin)?;
        copy_info.validate()?;
        let mut state = self.state.lock().await;

        if persist {
            let record = CacheRecord::for_entries(origin, copy_info.clone());
            self.disk.store(&record).await?;
        }

        if let Some(evicted) = state.copy_info.set(origin.to_string(), copy_info) {
            debug!("Evicted {} from memory", evicted);
        }
        Ok(())
    }

    async fn del_copy_info(&self, origins: &[String]) -> CacheResult<Vec<DeleteOutcome>> {
        if origins.is_empty() {
            return Err(CacheError::validation("no origins given to delete"));
        }
        let mut state = self.state.lock().await;

        let mut outcomes = Vec::with_capacity(origins.len());
        for origin in origins {
            Self::check_origin(origin)?;
            let in_memory = state.copy_info.remove(origin);
            let on_disk = self.disk.delete(origin).await?;

            if in_memory || on_disk {
                debug!("Deleted copy info for {}", origin);
                self.drop_aggregates_including(&mut state, origin).await?;
                outcomes.push(DeleteOutcome::Deleted(origin.clone()));
            } else {
                debug!("Copy info for {} not found, nothing to delete", origin);
                outcomes.push(DeleteOutcome::NotFound(origin.clone()));
            }
        }
        Ok(outcomes)
    }

    async fn get_aggregate_info(&self, origins: &[String]) -> CacheResult<Option<AggregateRecord>> {
        let key = aggregate_key(origins)?;
        let mut state = self.state.lock().await;

        if let Some(record) = state.aggregates.get(&key) {
            return Ok(Some(record.clone()));
        }

        let Some(aggregate) = self.disk.load_aggregate(&key).await?.and_then(|r| r.aggregate) else {
            debug!("Aggregate info for {} not found", key);
            return Ok(None);
        };

        state.aggregates.set(key, aggregate.clone());
        Ok(Some(aggregate))
    }

    async fn set_aggregate_info(
        &self,
        origins: &[String],
        record: AggregateRecord,
        persist: bool,
    ) -> CacheResult<()> {
        let key = aggregate_key(origins)?;
        record.validate()?;
        let mut record = record;
        record.origins = origins.to_vec();
        record.origins.sort();
        record.origins.dedup();
        let mut state = self.state.lock().await;

        if persist {
            self.disk
                .store(&CacheRecord::for_aggregate(key.clone(), record.clone()))
                .await?;
        }

        state.aggregates.set(key, record);
        Ok(())
    }

    async fn del_aggregate_info(&self, origins: &[String]) -> CacheResult<bool> {
        let key = aggregate_key(origins)?;
        let mut state = self.state.lock().await;

        let in_memory = state.aggregates.remove(&key);
        let on_disk = self.disk.delete_aggregate(&key).await?;
        Ok(in_memory || on_disk)
    }

    async fn clear(&self) -> CacheResult<()> {
        let mut state = self.state.lock().await;
        state.copy_info.clear();
        state.aggregates.clear();
        self.disk.clear().await?;
        debug!("Cleared file cache");
        Ok(())
    }

    async fn list_records(&self) -> CacheResult<Vec<(String, CacheRecord)>> {
        let _state = self.state.lock().await;
        self.disk.list().await
    }
}
