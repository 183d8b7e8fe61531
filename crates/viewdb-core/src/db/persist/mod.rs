//! Module: db::persist
//! Responsibility: generic per-kind persistence over the document store:
//! reads through the cache chain, revision-checked writes, soft delete,
//! bulk writes under both failure policies, listings, and audit stamping.
//! Does not own: view merging (stream), paging (cursor), or store transport.
//! Boundary: the `viewdb` facade wraps one repository per entity kind.

mod audit;
mod clock;
mod entity;
mod repository;
#[cfg(test)]
mod tests;

pub use audit::{AuditedRepository, stamp_audit};
pub use clock::{Clock, FixedClock, SystemClock, now_millis};
pub use entity::{AuditedEntity, StoredEntity, decode_document, encode_document};
pub use repository::{BulkItemOutcome, EntityRepository, EntityStream};
