//! Data-access runtime: query plans, partition merging, pagination, caching,
//! persistence and design-document synchronization over a view-indexed
//! document store.

pub mod cache;
pub mod cursor;
pub mod design;
pub mod direction;
pub mod persist;
pub mod plan;
pub mod row;
pub mod store;
pub mod stream;

pub use direction::Direction;
pub use row::{GroupRow, ViewRow};
