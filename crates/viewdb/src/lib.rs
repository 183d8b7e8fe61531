//! ## Crate layout
//! - `core`: the runtime (keys, plans, merging, paging, caching, persistence).
//! - `config`: TOML runtime configuration.
//! - `dao`: per-entity-kind data access assembled from configuration.
//! - `error`: the public error taxonomy.
//!
//! The `prelude` module carries what entity declarations and call sites need.

pub use viewdb_core as core;

pub mod config;
pub mod dao;
pub mod error;

//
// Consts
//

/// Workspace version re-export for downstream tooling/tests.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use error::Error;

///
/// Prelude
///

pub mod prelude {
    pub use crate::{
        config::ViewDbConfig,
        dao::{EntityDao, EntityPage},
        error::{Error, ErrorKind},
    };
    pub use serde::{Deserialize, Serialize};
    pub use viewdb_core::prelude::*;
}
