//! Module: db::store
//! Responsibility: the async boundary with the document store, plus an
//! in-process implementation.
//! Does not own: wire protocols, transport retries or authentication.

mod memory;

pub use memory::{MapFn, MemoryDocumentStore, MemoryReduce, MemoryStoreStats};

use crate::{
    db::{
        design::DesignDocument,
        plan::QueryPlan,
        row::{GroupRow, ViewRow},
    },
    error::InternalError,
};
use async_trait::async_trait;
use derive_more::Display;
use serde_json::Value as JsonValue;

///
/// DocumentStore
///
/// Single collaborator the runtime talks to. Every method is one round-trip.
/// Transport failures surface as `ErrorClass::Unavailable` and are never
/// retried above this boundary.
///

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// One page of a view scan, ordered by `(key, id)` in plan direction and
    /// honouring the plan's start condition, end key, key set and limit.
    async fn execute_view(&self, plan: &QueryPlan) -> Result<Vec<ViewRow>, InternalError>;

    /// Reduced rows of a grouped scan, ordered by key in plan direction.
    async fn execute_grouped(&self, plan: &QueryPlan) -> Result<Vec<GroupRow>, InternalError>;

    /// Documents by id, positionally; `None` when absent.
    async fn get_by_ids(&self, ids: &[String]) -> Result<Vec<Option<JsonValue>>, InternalError>;

    /// Apply every write in one request; one result per request, in order.
    async fn bulk_write(
        &self,
        writes: Vec<WriteRequest>,
    ) -> Result<Vec<WriteResult>, InternalError>;

    async fn get_design_document(&self, id: &str)
    -> Result<Option<DesignDocument>, InternalError>;

    /// Revision-checked design write; a stale revision fails with
    /// `ErrorClass::DesignDocConflict`. Returns the new revision.
    async fn put_design_document(&self, doc: &DesignDocument) -> Result<String, InternalError>;
}

///
/// WriteOp
///

#[derive(Clone, Debug, PartialEq)]
pub enum WriteOp {
    Put(JsonValue),
    Purge,
}

///
/// WriteRequest
///
/// `rev == None` asks for an insert; otherwise the write is checked against
/// the stored revision.
///

#[derive(Clone, Debug, PartialEq)]
pub struct WriteRequest {
    pub id: String,
    pub rev: Option<String>,
    pub op: WriteOp,
}

impl WriteRequest {
    #[must_use]
    pub fn put(id: impl Into<String>, rev: Option<String>, body: JsonValue) -> Self {
        Self {
            id: id.into(),
            rev,
            op: WriteOp::Put(body),
        }
    }

    #[must_use]
    pub fn purge(id: impl Into<String>, rev: Option<String>) -> Self {
        Self {
            id: id.into(),
            rev,
            op: WriteOp::Purge,
        }
    }
}

///
/// WriteErrorKind
///

#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum WriteErrorKind {
    Conflict,
    NotFound,
    Forbidden,
    Other,
}

///
/// WriteError
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WriteError {
    pub kind: WriteErrorKind,
    pub reason: String,
}

impl WriteError {
    #[must_use]
    pub fn conflict(reason: impl Into<String>) -> Self {
        Self {
            kind: WriteErrorKind::Conflict,
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn not_found(reason: impl Into<String>) -> Self {
        Self {
            kind: WriteErrorKind::NotFound,
            reason: reason.into(),
        }
    }
}

///
/// WriteResult
///
/// Per-item outcome of a bulk write. Purges succeed with `rev: None`.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum WriteResult {
    Ok { id: String, rev: Option<String> },
    Err { id: String, error: WriteError },
}

impl WriteResult {
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Ok { id, .. } | Self::Err { id, .. } => id,
        }
    }
}
