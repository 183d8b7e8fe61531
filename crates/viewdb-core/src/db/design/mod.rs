//! Module: db::design
//! Responsibility: stored view definitions and their idempotent, retrying
//! reconciliation against the store.
//! Does not own: the map/reduce source text, which is opaque configuration.

mod document;
mod sync;

pub use document::{DesignDocument, ViewDefinition, merge_design_document};
pub use sync::{
    DEFAULT_DESIGN_ATTEMPTS, DesignSynchronizer, SyncAction, SyncOptions, SyncOutcome, SyncReport,
};
