use crate::db::cache::{CacheKey, EntityCache};
use std::sync::Arc;

///
/// CacheSplit
///
/// One-pass partition of a bulk read: entities served from cache, and the
/// positions that must be fetched from the store.
///

#[derive(Debug)]
pub struct CacheSplit<E> {
    pub hits: Vec<(usize, E)>,
    pub misses: Vec<usize>,
}

///
/// CacheChain
///
/// Ordered cache layers, nearest first. A hit in a lower layer is copied
/// into every layer above it; writes and evictions reach every layer.
///

pub struct CacheChain<E> {
    layers: Vec<Arc<dyn EntityCache<E>>>,
}

impl<E> CacheChain<E>
where
    E: Clone,
{
    #[must_use]
    pub const fn new() -> Self {
        Self { layers: Vec::new() }
    }

    #[must_use]
    pub fn single(layer: Arc<dyn EntityCache<E>>) -> Self {
        Self {
            layers: vec![layer],
        }
    }

    #[must_use]
    pub fn with_layer(mut self, layer: Arc<dyn EntityCache<E>>) -> Self {
        self.layers.push(layer);
        self
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.layers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Split `keys` into cache hits and store fetches in one pass.
    #[must_use]
    pub fn split(&self, keys: &[CacheKey]) -> CacheSplit<E> {
        let mut split = CacheSplit {
            hits: Vec::new(),
            misses: Vec::new(),
        };
        for (idx, key) in keys.iter().enumerate() {
            match self.get(key) {
                Some(entity) => split.hits.push((idx, entity)),
                None => split.misses.push(idx),
            }
        }

        split
    }
}

impl<E> Default for CacheChain<E>
where
    E: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Clone for CacheChain<E> {
    fn clone(&self) -> Self {
        Self {
            layers: self.layers.clone(),
        }
    }
}

impl<E> EntityCache<E> for CacheChain<E>
where
    E: Clone,
{
    fn get(&self, key: &CacheKey) -> Option<E> {
        for (depth, layer) in self.layers.iter().enumerate() {
            if let Some(entity) = layer.get(key) {
                for upper in &self.layers[..depth] {
                    upper.put(key.clone(), entity.clone());
                }
                return Some(entity);
            }
        }

        None
    }

    fn put(&self, key: CacheKey, entity: E) {
        if let Some((last, upper)) = self.layers.split_last() {
            for layer in upper {
                layer.put(key.clone(), entity.clone());
            }
            last.put(key, entity);
        }
    }

    fn evict(&self, key: &CacheKey) {
        for layer in &self.layers {
            layer.evict(key);
        }
    }

    fn clear(&self) {
        for layer in &self.layers {
            layer.clear();
        }
    }
}
