//! Core runtime for viewdb: composite keys, query plans, partition merging,
//! pagination, entity caching, persistence and design-document sync over a
//! view-indexed document store.

// public exports are one module level down
pub mod db;
pub mod error;
pub mod key;
pub mod obs;

///
/// Prelude
///
/// Prelude contains the vocabulary needed to declare entities and run
/// queries. Stores, sinks and caches are imported from their modules.
///

pub mod prelude {
    pub use crate::{
        db::{
            Direction, ViewRow,
            cursor::{ContinuationCursor, Page, PageRequest},
            persist::{AuditedEntity, StoredEntity},
            plan::{KeyRange, ListQuery},
            stream::{DedupMode, RowComparator},
        },
        key,
        key::{CompositeKey, KeyComponent},
    };
}
