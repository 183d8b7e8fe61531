//! Module: db::plan
//! Responsibility: partitioned query model: logical key selections, per-kind
//! view configuration, and one store query plan per partition.
//! Does not own: merging or deduplicating partition output.
//! Boundary: consumed by stream/cursor execution and by the store boundary.

mod list;
mod query;
mod range;
mod view_table;

pub use list::ListQuery;
pub use query::{PartitionPlan, PartitionedQuery, QueryPlan};
pub use range::{KeyRange, KeySelection};
pub use view_table::{ViewPartition, ViewSpec, ViewTable, design_doc_id};
