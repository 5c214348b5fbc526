//! Fixed-capacity least-recently-used map
//!
//! Thin layer over [`lru::LruCache`] that reports which key an insert
//! pushed out, so the store can log evictions. Not synchronized;
//! [`CacheStore`](super::CacheStore) wraps it in a mutex.

use std::hash::Hash;
use std::num::NonZeroUsize;

/// Default capacity for production stores
pub const DEFAULT_CAPACITY: usize = 1024;

/// Recency-ordered map with a fixed capacity
#[derive(Debug)]
pub struct LruCache<K: Hash + Eq, V> {
    inner: lru::LruCache<K, V>,
}

impl<K, V> LruCache<K, V>
where
    K: Eq + Hash + Clone,
{
    /// Create a cache holding at most `capacity` entries (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: lru::LruCache::new(capacity),
        }
    }

    /// Number of entries currently held
    pub fn size(&self) -> usize {
        self.inner.len()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.inner.contains(key)
    }

    /// Look up a key, marking it most recently used on a hit
    pub fn get(&mut self, key: &K) -> Option<&V> {
        self.inner.get(key)
    }

    /// Insert or update a key as most recently used
    ///
    /// Returns the key evicted to make room, if any.
    pub fn set(&mut self, key: K, value: V) -> Option<K> {
        match self.inner.push(key.clone(), value) {
            // push hands back the old pair when the key was already present
            Some((evicted, _)) if evicted != key => Some(evicted),
            _ => None,
        }
    }

    /// Remove a key, returning whether it was present
    pub fn remove(&mut self, key: &K) -> bool {
        self.inner.pop(key).is_some()
    }

    /// Remove every entry matching `predicate`, returning the removed keys
    pub fn remove_where(&mut self, mut predicate: impl FnMut(&K, &V) -> bool) -> Vec<K> {
        let doomed: Vec<K> = self
            .inner
            .iter()
            .filter(|(k, v)| predicate(k, v))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &doomed {
            self.inner.pop(key);
        }
        doomed
    }

    /// Drop every entry
    pub fn clear(&mut self) {
        self.inner.clear();
    }
}
