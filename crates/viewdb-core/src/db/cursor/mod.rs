//! Module: db::cursor
//! Responsibility: continuation cursors, page windows over the partition
//! merge, and the grouped duplicate pager.
//! Does not own: partition plan construction or merge ordering policy.
//! Boundary: persistence and facade list operations page through here.

mod grouped;
mod page;
mod token;
#[cfg(test)]
mod tests;

pub use grouped::{DEFAULT_GROUP_BATCH_SIZE, GroupedDuplicatePager};
pub use page::{Page, PageRequest, Paginator};
pub use token::{ContinuationCursor, MAX_TOKEN_LEN, TokenError, decode_token, encode_token};
