use crate::db::cache::{CacheKey, EntityCache};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Entries held by a [`MemoryEntityCache`] built with `Default`.
pub const DEFAULT_CACHE_CAPACITY: usize = 10_000;

const EVICTION_BATCH_DIVISOR: usize = 16;

///
/// CacheStats
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub size: usize,
}

///
/// MemoryEntityCache
///
/// Concurrent in-process cache with a bounded number of entries.
/// Inserting at capacity drops the least recently written entries, a small
/// batch at a time.
///

#[derive(Debug)]
pub struct MemoryEntityCache<E> {
    entries: DashMap<CacheKey, (u64, E)>,
    capacity: usize,
    clock: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl<E> MemoryEntityCache<E>
where
    E: Clone + Send + Sync,
{
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);

        Self {
            entries: DashMap::with_capacity(capacity.min(DEFAULT_CACHE_CAPACITY)),
            capacity,
            clock: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.contains_key(key)
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            size: self.entries.len(),
        }
    }

    // At capacity, drop the oldest writes in one scan: enough for the
    // incoming entry plus `capacity / EVICTION_BATCH_DIVISOR` more, so a full
    // scan happens at most once per batch of inserts.
    fn make_room(&self) {
        let len = self.entries.len();
        if len < self.capacity {
            return;
        }
        let batch = (self.capacity / EVICTION_BATCH_DIVISOR).max(1);
        let evict = (len - self.capacity + batch).min(len);

        let mut oldest = self
            .entries
            .iter()
            .map(|entry| (entry.value().0, entry.key().clone()))
            .collect::<Vec<_>>();
        if evict < oldest.len() {
            oldest.select_nth_unstable_by_key(evict, |(tick, _)| *tick);
            oldest.truncate(evict);
        }

        for (tick, key) in oldest {
            // entries rewritten since the scan stay
            if self
                .entries
                .remove_if(&key, |_, (current, _)| *current == tick)
                .is_some()
            {
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

impl<E> Default for MemoryEntityCache<E>
where
    E: Clone + Send + Sync,
{
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

impl<E> EntityCache<E> for MemoryEntityCache<E>
where
    E: Clone + Send + Sync,
{
    fn get(&self, key: &CacheKey) -> Option<E> {
        let hit = self.entries.get(key).map(|entry| entry.value().1.clone());
        let counter = if hit.is_some() {
            &self.hits
        } else {
            &self.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);

        hit
    }

    fn put(&self, key: CacheKey, entity: E) {
        if !self.entries.contains_key(&key) {
            self.make_room();
        }
        let tick = self.clock.fetch_add(1, Ordering::Relaxed);
        self.entries.insert(key, (tick, entity));
    }

    fn evict(&self, key: &CacheKey) {
        self.entries.remove(key);
    }

    fn clear(&self) {
        self.entries.clear();
    }
}
