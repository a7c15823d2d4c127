// Copyright 2025 Cowboy AI, LLC.

//! Concurrency-coalescing caches for mixin orders and compositions
//!
//! Lookups take a fast path on an already filled entry. On a miss the caller
//! claims the entry's cell and synthesizes under it; concurrent callers for the
//! same key wait on that cell instead of synthesizing again. A failed
//! synthesis leaves the cell empty, so the failure is not cached and the next
//! caller retries.

use dashmap::DashMap;
use once_cell::sync::OnceCell;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

use crate::context::ClassContext;
use crate::sorter::MixinOrder;
use crate::synthesis::Composition;

/// Counters of one cache
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CacheStats {
    /// Lookups answered from a filled entry
    pub hits: u64,
    /// Lookups that had to go through the entry's cell
    pub misses: u64,
    /// Synthesis runs started (successful or not)
    pub syntheses: u64,
    /// Filled entries
    pub entries: usize,
}

/// Map from keys to lazily synthesized shared values
pub struct CoalescingCache<K, V> {
    entries: DashMap<K, Arc<OnceCell<Arc<V>>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    syntheses: AtomicU64,
}

impl<K, V> CoalescingCache<K, V>
where
    K: Eq + Hash + Clone,
{
    /// Create an empty cache
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            syntheses: AtomicU64::new(0),
        }
    }

    /// Filled entry for a key
    pub fn lookup(&self, key: &K) -> Option<Arc<V>> {
        self.entries
            .get(key)
            .and_then(|cell| cell.value().get().cloned())
    }

    /// Return the entry for `key`, synthesizing it at most once across
    /// threads
    ///
    /// # Errors
    ///
    /// Returns the synthesis error; nothing is stored in that case
    pub fn get_or_try_insert_with<E, F>(&self, key: &K, synthesize: F) -> Result<Arc<V>, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        if let Some(value) = self.lookup(key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            trace!("Cache hit");
            return Ok(value);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        // the map shard lock is released before synthesis starts
        let cell = self.cell(key);
        let result = cell
            .get_or_try_init(|| {
                self.syntheses.fetch_add(1, Ordering::Relaxed);
                trace!("Synthesizing cache entry");
                synthesize().map(Arc::new)
            })
            .cloned();
        if result.is_err() {
            // drop the empty cell unless another caller still waits on it
            self.entries.remove_if(key, |_, stored| {
                stored.get().is_none() && Arc::strong_count(stored) == 2
            });
        }
        result
    }

    /// Store a value unless the key is already filled; returns the stored
    /// value
    pub fn insert_if_absent(&self, key: &K, value: V) -> Arc<V> {
        let cell = self.cell(key);
        Arc::clone(cell.get_or_init(|| Arc::new(value)))
    }

    fn cell(&self, key: &K) -> Arc<OnceCell<Arc<V>>> {
        let entry = self
            .entries
            .entry(key.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()));
        Arc::clone(entry.value())
    }

    /// Number of filled entries
    pub fn len(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.value().get().is_some())
            .count()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Current counters
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            syntheses: self.syntheses.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }
}

impl<K, V> Default for CoalescingCache<K, V>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> std::fmt::Debug for CoalescingCache<K, V>
where
    K: Eq + Hash + Clone,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoalescingCache")
            .field("stats", &self.stats())
            .finish()
    }
}

/// Process-wide caches of one composer, keyed by class context
#[derive(Debug, Default)]
pub struct CompositionCache {
    orders: CoalescingCache<ClassContext, MixinOrder>,
    compositions: CoalescingCache<ClassContext, Composition>,
}

impl CompositionCache {
    /// Create empty caches
    pub fn new() -> Self {
        Self::default()
    }

    /// Mixin orders
    pub fn orders(&self) -> &CoalescingCache<ClassContext, MixinOrder> {
        &self.orders
    }

    /// Compositions
    pub fn compositions(&self) -> &CoalescingCache<ClassContext, Composition> {
        &self.compositions
    }

    /// Drop every cached order and composition
    pub fn clear(&self) {
        self.orders.clear();
        self.compositions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use std::thread;

    /// Test concurrent misses synthesize once
    ///
    /// ```mermaid
    /// sequenceDiagram
    ///     participant T1 as thread 1
    ///     participant C as cell
    ///     participant T2 as thread 2..8
    ///     T1->>C: get_or_try_init (synthesize)
    ///     T2->>C: get_or_try_init (wait)
    ///     C-->>T1: Arc<V>
    ///     C-->>T2: same Arc<V>
    /// ```
    #[test]
    fn test_concurrent_synthesis_coalesces() {
        let cache: Arc<CoalescingCache<String, u64>> = Arc::new(CoalescingCache::new());
        let barrier = Arc::new(Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    cache
                        .get_or_try_insert_with(&"order".to_string(), || {
                            thread::sleep(std::time::Duration::from_millis(20));
                            Ok::<_, String>(42)
                        })
                        .unwrap()
                })
            })
            .collect();
        let values: Vec<Arc<u64>> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert!(values.iter().all(|v| Arc::ptr_eq(v, &values[0])));
        assert_eq!(cache.stats().syntheses, 1);
        assert_eq!(cache.len(), 1);
    }

    /// Test failures are not cached
    #[test]
    fn test_failure_not_cached() {
        let cache: CoalescingCache<&'static str, u64> = CoalescingCache::new();
        let err = cache
            .get_or_try_insert_with(&"order", || Err::<u64, _>("broken"))
            .unwrap_err();
        assert_eq!(err, "broken");
        assert!(cache.lookup(&"order").is_none());
        assert!(cache.is_empty());
        assert_eq!(cache.entries.len(), 0);

        let value = cache.get_or_try_insert_with(&"order", || Ok::<_, &str>(7)).unwrap();
        assert_eq!(*value, 7);
        let stats = cache.stats();
        assert_eq!(stats.syntheses, 2);
        assert_eq!(stats.misses, 2);

        let again = cache.get_or_try_insert_with(&"order", || Ok::<_, &str>(8)).unwrap();
        assert_eq!(*again, 7);
        assert_eq!(cache.stats().hits, 1);
    }

    /// Test repeated failures over many keys leave no empty slots behind
    #[test]
    fn test_failed_keys_release_slots() {
        let cache: CoalescingCache<u32, u32> = CoalescingCache::new();
        for key in 0..64 {
            assert!(cache.get_or_try_insert_with(&key, || Err::<u32, _>(key)).is_err());
        }
        assert_eq!(cache.entries.len(), 0);
        assert_eq!(cache.stats().syntheses, 64);

        cache.get_or_try_insert_with(&3, || Ok::<_, u32>(30)).unwrap();
        assert_eq!(cache.entries.len(), 1);
        assert_eq!(cache.len(), 1);
    }

    /// Test insert-if-absent keeps the first value
    #[test]
    fn test_insert_if_absent() {
        let cache: CoalescingCache<u8, &'static str> = CoalescingCache::new();
        assert_eq!(*cache.insert_if_absent(&1, "first"), "first");
        assert_eq!(*cache.insert_if_absent(&1, "second"), "first");
        cache.clear();
        assert!(cache.is_empty());
    }
}
