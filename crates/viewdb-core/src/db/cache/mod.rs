//! Module: db::cache
//! Responsibility: entity cache contract, in-memory layer and layered chain.
//! Does not own: when to populate or evict; the persistence core is the
//! only writer.

mod chain;
mod memory;

pub use chain::{CacheChain, CacheSplit};
pub use memory::{CacheStats, DEFAULT_CACHE_CAPACITY, MemoryEntityCache};

use derive_more::Display;
use std::marker::PhantomData;

///
/// CacheKey
///
/// Entities of different kinds may share ids, so every key is scoped by the
/// entity kind.
///

#[derive(Clone, Debug, Display, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[display("{namespace}:{id}")]
pub struct CacheKey {
    pub namespace: String,
    pub id: String,
}

impl CacheKey {
    #[must_use]
    pub fn new(namespace: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            id: id.into(),
        }
    }
}

///
/// EntityCache
///
/// Per-id operations are atomic; nothing spans ids.
///

pub trait EntityCache<E>: Send + Sync {
    fn get(&self, key: &CacheKey) -> Option<E>;

    fn put(&self, key: CacheKey, entity: E);

    fn evict(&self, key: &CacheKey);

    fn clear(&self);
}

///
/// NoCache
/// Cache layer that never holds anything.
///

pub struct NoCache<E>(PhantomData<fn() -> E>);

impl<E> NoCache<E> {
    #[must_use]
    pub const fn new() -> Self {
        Self(PhantomData)
    }
}

impl<E> Default for NoCache<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> EntityCache<E> for NoCache<E> {
    fn get(&self, _key: &CacheKey) -> Option<E> {
        None
    }

    fn put(&self, _key: CacheKey, _entity: E) {}

    fn evict(&self, _key: &CacheKey) {}

    fn clear(&self) {}
}
