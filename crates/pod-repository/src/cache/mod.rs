//! Snapshot caching with TTL support

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use camino::{Utf8Path, Utf8PathBuf};
use dashmap::DashMap;
use tracing::debug;

use pod_core::types::Unit;

use crate::provider::RepositoryProvider;
use crate::RepositoryResult;

/// Default time-to-live of a loaded snapshot
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Cache entry with TTL
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Units of the snapshot
    pub units: Arc<Vec<Unit>>,
    /// When the entry was stored
    pub stored_at: SystemTime,
    /// Time-to-live duration
    pub ttl: Duration,
}

impl CacheEntry {
    pub fn new(units: Vec<Unit>) -> Self {
        Self::with_ttl(units, DEFAULT_TTL)
    }

    pub fn with_ttl(units: Vec<Unit>, ttl: Duration) -> Self {
        Self {
            units: Arc::new(units),
            stored_at: SystemTime::now(),
            ttl,
        }
    }

    /// Check if cache entry is still fresh
    pub fn is_fresh(&self) -> bool {
        match self.stored_at.elapsed() {
            Ok(elapsed) => elapsed < self.ttl,
            Err(_) => false, // Clock went backwards, consider stale
        }
    }

    pub fn age(&self) -> Option<Duration> {
        self.stored_at.elapsed().ok()
    }
}

/// In-memory snapshot cache keyed by location
#[derive(Debug, Default)]
pub struct SnapshotCache {
    cache: DashMap<Utf8PathBuf, CacheEntry>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached units if fresh; stale entries are dropped
    pub fn get(&self, location: &Utf8Path) -> Option<Arc<Vec<Unit>>> {
        let fresh = self
            .cache
            .get(location)
            .map(|entry| entry.is_fresh().then(|| Arc::clone(&entry.units)));

        match fresh {
            Some(Some(units)) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(units)
            },
            Some(None) => {
                self.cache.remove(location);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            },
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            },
        }
    }

    pub fn insert(&self, location: Utf8PathBuf, units: Vec<Unit>) -> Arc<Vec<Unit>> {
        self.insert_entry(location, CacheEntry::new(units))
    }

    pub fn insert_with_ttl(&self, location: Utf8PathBuf, units: Vec<Unit>, ttl: Duration) -> Arc<Vec<Unit>> {
        self.insert_entry(location, CacheEntry::with_ttl(units, ttl))
    }

    fn insert_entry(&self, location: Utf8PathBuf, entry: CacheEntry) -> Arc<Vec<Unit>> {
        let units = Arc::clone(&entry.units);
        self.cache.insert(location, entry);
        units
    }

    pub fn contains_fresh(&self, location: &Utf8Path) -> bool {
        self.cache
            .get(location)
            .map(|entry| entry.is_fresh())
            .unwrap_or(false)
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        let fresh_entries = self.cache.iter().filter(|entry| entry.is_fresh()).count();
        CacheStats {
            total_entries: self.cache.len(),
            fresh_entries,
            stale_entries: self.cache.len() - fresh_entries,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    pub fn clear(&self) {
        self.cache.clear();
    }

    /// Remove stale entries, returning how many were dropped
    pub fn cleanup(&self) -> usize {
        let before = self.cache.len();
        self.cache.retain(|_, entry| entry.is_fresh());
        before - self.cache.len()
    }
}

/// Cache statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub total_entries: usize,
    pub fresh_entries: usize,
    pub stale_entries: usize,
    pub hits: u64,
    pub misses: u64,
}

/// Provider that remembers the snapshots another provider loaded
#[derive(Debug)]
pub struct CachedRepository<P> {
    inner: P,
    cache: SnapshotCache,
    ttl: Duration,
}

impl<P: RepositoryProvider> CachedRepository<P> {
    pub fn new(inner: P) -> Self {
        Self::with_ttl(inner, DEFAULT_TTL)
    }

    pub fn with_ttl(inner: P, ttl: Duration) -> Self {
        Self {
            inner,
            cache: SnapshotCache::new(),
            ttl,
        }
    }

    pub fn cache(&self) -> &SnapshotCache {
        &self.cache
    }

    /// Shared units of the snapshot at `location`
    pub async fn snapshot(&self, location: &Utf8Path) -> RepositoryResult<Arc<Vec<Unit>>> {
        if let Some(units) = self.cache.get(location) {
            debug!("Repository cache hit for {}", location);
            return Ok(units);
        }

        let units = self.inner.list_units(location).await?;
        Ok(self.cache.insert_with_ttl(location.to_path_buf(), units, self.ttl))
    }
}

impl<P: RepositoryProvider> RepositoryProvider for CachedRepository<P> {
    async fn list_units(&self, location: &Utf8Path) -> RepositoryResult<Vec<Unit>> {
        Ok(self.snapshot(location).await?.as_ref().clone())
    }
}
