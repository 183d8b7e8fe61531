//! Module: db::stream
//! Responsibility: ordered row-stream contracts, comparators, deduplication
//! policy and the k-way interleave over partition streams.
//! Does not own: query-plan construction or continuation cursors.
//! Boundary: row-stream abstractions consumed by pagination and repositories.

mod contracts;
mod dedup;
mod interleave;
mod order;
mod scan;

pub use contracts::{BudgetedRowStream, RowStream, RowStreamBox, VecRowStream, collect_rows};
pub use dedup::DedupMode;
pub use interleave::{InterleaveRowStream, MergeSource};
pub use order::RowComparator;
pub use scan::{DEFAULT_SCAN_BATCH_SIZE, ViewScanStream};
