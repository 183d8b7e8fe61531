use derive_more::Display;
use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;
use viewdb_core::error::{
    BulkFailure, ErrorClass, ErrorOrigin as CoreErrorOrigin, InternalError,
};

use crate::config::ConfigError;

///
/// Error
/// Public error type with a stable kind + origin taxonomy.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize, ThisError)]
#[error("{message}")]
pub struct Error {
    pub kind: ErrorKind,
    pub origin: ErrorOrigin,
    pub message: String,

    /// Every rejected item of an all-or-nothing bulk write; empty otherwise.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conflicts: Vec<BulkConflict>,
}

impl Error {
    pub fn new(kind: ErrorKind, origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self {
            kind,
            origin,
            message: message.into(),
            conflicts: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_conflicts(mut self, conflicts: Vec<BulkConflict>) -> Self {
        self.conflicts = conflicts;
        self
    }

    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self.kind, ErrorKind::Update(UpdateErrorKind::Conflict))
    }

    #[must_use]
    pub const fn is_unavailable(&self) -> bool {
        matches!(self.kind, ErrorKind::Store(StoreErrorKind::Unavailable))
    }
}

impl From<InternalError> for Error {
    fn from(err: InternalError) -> Self {
        let kind = match (err.class, err.origin) {
            (ErrorClass::NotFound, _) => ErrorKind::Store(StoreErrorKind::NotFound),
            (ErrorClass::Conflict, _) => ErrorKind::Update(UpdateErrorKind::Conflict),
            (ErrorClass::DesignDocConflict, _) => {
                ErrorKind::Update(UpdateErrorKind::DesignConflict)
            }
            (ErrorClass::Unavailable, _) => ErrorKind::Store(StoreErrorKind::Unavailable),
            (ErrorClass::Corruption, _) => ErrorKind::Store(StoreErrorKind::Corruption),
            (ErrorClass::Unsupported, _) => ErrorKind::Query(QueryErrorKind::Unsupported),
            (ErrorClass::InvariantViolation, CoreErrorOrigin::Cursor) => {
                ErrorKind::Query(QueryErrorKind::InvalidCursor)
            }
            (ErrorClass::InvariantViolation, CoreErrorOrigin::Merge) => {
                ErrorKind::Query(QueryErrorKind::Invalid)
            }
            (ErrorClass::InvariantViolation | ErrorClass::Internal, _) => ErrorKind::Internal,
        };

        let conflicts = err
            .bulk_failures()
            .map(|failures| failures.iter().map(BulkConflict::from).collect())
            .unwrap_or_default();

        Self::new(kind, err.origin.into(), err.message).with_conflicts(conflicts)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Self::new(ErrorKind::Config, ErrorOrigin::Config, err.to_string())
    }
}

///
/// BulkConflict
/// One item rejected by an all-or-nothing bulk write.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct BulkConflict {
    pub id: String,

    /// Revision the caller attempted to write against.
    pub rev: Option<String>,
    pub reason: String,
}

impl From<&BulkFailure> for BulkConflict {
    fn from(failure: &BulkFailure) -> Self {
        Self {
            id: failure.id.clone(),
            rev: failure.rev.clone(),
            reason: failure.reason.clone(),
        }
    }
}

///
/// ErrorKind
/// Public error taxonomy for callers.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum ErrorKind {
    Query(QueryErrorKind),
    Update(UpdateErrorKind),
    Store(StoreErrorKind),

    /// Configuration could not be read or failed validation.
    Config,

    /// The caller cannot remediate this.
    Internal,
}

///
/// QueryErrorKind
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum QueryErrorKind {
    /// Query shape is invalid, e.g. an ambiguous merge priority.
    Invalid,

    /// The query is valid but requests an unsupported feature.
    Unsupported,

    /// Continuation token is malformed or inconsistent.
    InvalidCursor,
}

///
/// UpdateErrorKind
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum UpdateErrorKind {
    /// Revision mismatch on one or more written documents.
    Conflict,

    /// Design document kept conflicting after every retry.
    DesignConflict,
}

///
/// StoreErrorKind
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum StoreErrorKind {
    /// Document or view does not exist.
    NotFound,
    Unavailable,
    Corruption,
}

///
/// ErrorOrigin
/// Public origin taxonomy for callers.
///

#[derive(Clone, Copy, Debug, Deserialize, Display, Eq, PartialEq, Serialize)]
pub enum ErrorOrigin {
    Cache,
    Config,
    Cursor,
    Design,
    Merge,
    Persist,
    Query,
    Serialize,
    Store,
}

impl From<CoreErrorOrigin> for ErrorOrigin {
    fn from(origin: CoreErrorOrigin) -> Self {
        match origin {
            CoreErrorOrigin::Cache => Self::Cache,
            CoreErrorOrigin::Config => Self::Config,
            CoreErrorOrigin::Cursor => Self::Cursor,
            CoreErrorOrigin::Design => Self::Design,
            CoreErrorOrigin::Merge => Self::Merge,
            CoreErrorOrigin::Persist => Self::Persist,
            CoreErrorOrigin::Query => Self::Query,
            CoreErrorOrigin::Serialize => Self::Serialize,
            CoreErrorOrigin::Store => Self::Store,
        }
    }
}

///
/// TESTS
///
