//! Directory listing cache.
//!
//! Maps an absolute remote directory path to the last listing fetched for
//! it. Entries are never expired, evicted or invalidated: a `put` replaces
//! whatever was stored under the key and is visible to every later `get`.

use crate::metadata::RemoteMetadata;
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;

/// A cached value.
#[derive(Debug, Clone)]
pub enum CacheEntry {
    /// Snapshot of a directory listing, in server order.
    Listing(Arc<Vec<RemoteMetadata>>),
    /// Metadata of a single entry (the served root).
    Single(RemoteMetadata),
}

impl CacheEntry {
    /// Find an entry by name.
    ///
    /// A listing is searched by entry name; a single entry matches when its
    /// own name does.
    pub fn find(&self, name: &str) -> Option<&RemoteMetadata> {
        match self {
            CacheEntry::Listing(entries) => entries.iter().find(|e| e.name == name),
            CacheEntry::Single(meta) => (meta.name == name).then_some(meta),
        }
    }
}

/// Statistics for the directory cache.
///
/// Tracks lookups and remote listings. All counters are lock-free.
#[derive(Debug, Default)]
pub struct CacheStats {
    /// Number of lookups that found an entry.
    pub hits: AtomicU64,
    /// Number of lookups that found nothing.
    pub misses: AtomicU64,
    /// Number of writes to the cache.
    pub stores: AtomicU64,
}

impl CacheStats {
    /// Get the total number of cache hits.
    pub fn hit_count(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Get the total number of cache misses.
    pub fn miss_count(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Get the total number of stores.
    pub fn store_count(&self) -> u64 {
        self.stores.load(Ordering::Relaxed)
    }

    /// Compute the cache hit rate as a fraction (0.0 to 1.0).
    ///
    /// Returns 0.0 if no lookups have been performed.
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hit_count();
        let total = hits + self.miss_count();
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

/// Concurrent map from remote directory path to its cached listing.
#[derive(Debug, Default)]
pub struct DirCache {
    entries: DashMap<String, CacheEntry>,
    stats: CacheStats,
}

impl DirCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the entry stored under `key`.
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.get(key).map(|e| e.value().clone());
        if entry.is_some() {
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
            trace!(key = %key, "directory cache hit");
        } else {
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
            trace!(key = %key, "directory cache miss");
        }
        entry
    }

    /// Store `value` under `key`, replacing any previous value.
    pub fn put(&self, key: impl Into<String>, value: CacheEntry) {
        self.stats.stores.fetch_add(1, Ordering::Relaxed);
        self.entries.insert(key.into(), value);
    }

    /// Store a directory listing under `dir`.
    pub fn put_listing(&self, dir: impl Into<String>, listing: Vec<RemoteMetadata>) {
        self.put(dir, CacheEntry::Listing(Arc::new(listing)));
    }

    /// Number of keys currently cached.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been cached yet.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Lookup and store statistics.
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }
}
