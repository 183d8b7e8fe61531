use std::fmt;
use thiserror::Error as ThisError;

///
/// InternalError
///
/// Structured runtime error with a stable internal classification.
/// Not a stable API; the `viewdb` facade maps it into its public error.
///

#[derive(Debug, ThisError)]
#[error("{message}")]
pub struct InternalError {
    pub class: ErrorClass,
    pub origin: ErrorOrigin,
    pub message: String,

    /// Optional structured error detail.
    pub detail: Option<ErrorDetail>,
}

impl InternalError {
    pub fn new(class: ErrorClass, origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self {
            class,
            origin,
            message: message.into(),
            detail: None,
        }
    }

    #[must_use]
    pub fn with_detail(mut self, detail: ErrorDetail) -> Self {
        self.detail = Some(detail);
        self
    }

    /// Construct a store-origin not-found error for one document id.
    pub fn store_not_found(id: impl Into<String>) -> Self {
        let id = id.into();

        Self::new(
            ErrorClass::NotFound,
            ErrorOrigin::Store,
            format!("document not found: {id}"),
        )
        .with_detail(ErrorDetail::Store(StoreError::NotFound { id }))
    }

    /// Construct a revision conflict for one document.
    pub fn revision_conflict(id: impl Into<String>, rev: Option<&str>) -> Self {
        let id = id.into();

        Self::new(
            ErrorClass::Conflict,
            ErrorOrigin::Persist,
            format!(
                "revision conflict on '{id}' (expected rev: {})",
                rev.unwrap_or("<new>")
            ),
        )
        .with_detail(ErrorDetail::Store(StoreError::Conflict { id }))
    }

    /// Construct the aggregate conflict raised by all-or-nothing bulk writes.
    pub fn bulk_conflict(failures: Vec<BulkFailure>) -> Self {
        let ids = failures
            .iter()
            .map(|failure| failure.id.as_str())
            .collect::<Vec<_>>()
            .join(", ");

        Self::new(
            ErrorClass::Conflict,
            ErrorOrigin::Persist,
            format!("bulk write rejected for {} item(s): {ids}", failures.len()),
        )
        .with_detail(ErrorDetail::BulkConflict(failures))
    }

    /// Construct a design-document revision conflict.
    pub fn design_conflict(id: impl Into<String>) -> Self {
        let id = id.into();

        Self::new(
            ErrorClass::DesignDocConflict,
            ErrorOrigin::Design,
            format!("design document revision conflict: {id}"),
        )
    }

    /// Construct a transport/store-unavailable error.
    pub fn store_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Unavailable, ErrorOrigin::Store, message)
    }

    /// Construct a store-origin internal error.
    pub fn store_internal(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Internal, ErrorOrigin::Store, message)
    }

    /// Construct a query-origin unsupported error.
    pub fn query_unsupported(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Unsupported, ErrorOrigin::Query, message)
    }

    /// Construct a merge-origin invariant violation.
    pub(crate) fn merge_invariant(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::InvariantViolation, ErrorOrigin::Merge, message)
    }

    /// Construct a cursor-origin invariant violation.
    pub(crate) fn cursor_invariant(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::InvariantViolation, ErrorOrigin::Cursor, message)
    }

    /// Construct a persist-origin invariant violation.
    pub(crate) fn persist_invariant(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::InvariantViolation, ErrorOrigin::Persist, message)
    }

    /// Construct a serialize-origin corruption error.
    pub(crate) fn serialize_corruption(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Corruption, ErrorOrigin::Serialize, message)
    }

    /// Construct a serialize-origin internal error.
    pub(crate) fn serialize_internal(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Internal, ErrorOrigin::Serialize, message)
    }

    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self.class, ErrorClass::NotFound)
    }

    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self.class, ErrorClass::Conflict)
    }

    #[must_use]
    pub const fn is_design_conflict(&self) -> bool {
        matches!(self.class, ErrorClass::DesignDocConflict)
    }

    /// Failed items of an aggregate bulk conflict, if this is one.
    #[must_use]
    pub fn bulk_failures(&self) -> Option<&[BulkFailure]> {
        match &self.detail {
            Some(ErrorDetail::BulkConflict(failures)) => Some(failures),
            _ => None,
        }
    }

    #[must_use]
    pub fn display_with_class(&self) -> String {
        format!("{}:{}: {}", self.origin, self.class, self.message)
    }
}

impl From<serde_json::Error> for InternalError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialize_corruption(err.to_string())
    }
}

///
/// ErrorDetail
///
/// Structured, origin-specific error detail carried by [`InternalError`].
///

#[derive(Debug, ThisError)]
pub enum ErrorDetail {
    #[error("{0}")]
    Store(StoreError),

    #[error("{} bulk item(s) failed", .0.len())]
    BulkConflict(Vec<BulkFailure>),
}

///
/// StoreError
///

#[derive(Debug, ThisError)]
pub enum StoreError {
    #[error("document not found: {id}")]
    NotFound { id: String },

    #[error("revision conflict: {id}")]
    Conflict { id: String },
}

///
/// BulkFailure
///
/// One rejected item of a bulk write, as reported by the store.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BulkFailure {
    pub id: String,
    pub rev: Option<String>,
    pub reason: String,
}

///
/// ErrorClass
/// Internal error taxonomy for runtime classification.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorClass {
    NotFound,
    Conflict,
    DesignDocConflict,
    Unavailable,
    Corruption,
    InvariantViolation,
    Unsupported,
    Internal,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::DesignDocConflict => "design_conflict",
            Self::Unavailable => "unavailable",
            Self::Corruption => "corruption",
            Self::InvariantViolation => "invariant_violation",
            Self::Unsupported => "unsupported",
            Self::Internal => "internal",
        };
        write!(f, "{label}")
    }
}

///
/// ErrorOrigin
/// Internal origin taxonomy for runtime classification.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorOrigin {
    Store,
    Cache,
    Query,
    Merge,
    Cursor,
    Persist,
    Design,
    Serialize,
    Config,
}

impl fmt::Display for ErrorOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Store => "store",
            Self::Cache => "cache",
            Self::Query => "query",
            Self::Merge => "merge",
            Self::Cursor => "cursor",
            Self::Persist => "persist",
            Self::Design => "design",
            Self::Serialize => "serialize",
            Self::Config => "config",
        };
        write!(f, "{label}")
    }
}

///
/// TESTS
///
