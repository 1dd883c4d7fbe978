//! Error types shared across the selector, planner, executor, and session
//! layers.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, QueryError>;

/// A selector was malformed or self-contradictory.
///
/// Raised by [`crate::selector`] validation, before any store interaction
/// takes place.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SelectorError {
    /// The bounding box was degenerate (`left >= right` or `bottom >= top`).
    #[error("bounding box is degenerate: left={left} right={right} bottom={bottom} top={top}")]
    DegenerateBbox {
        /// Supplied left (west) coordinate.
        left: f64,
        /// Supplied right (east) coordinate.
        right: f64,
        /// Supplied bottom (south) coordinate.
        bottom: f64,
        /// Supplied top (north) coordinate.
        top: f64,
    },
    /// An attribute selector carried a comparison operator that isn't one of
    /// the supported numeric comparison symbols.
    #[error("unsupported comparison operator '{op}'")]
    MalformedOperator {
        /// The operator text that failed to parse.
        op: String,
    },
    /// A tag key was empty; the store's tag column cannot address it.
    #[error("tag key cannot be empty")]
    EmptyKey,
}

/// Top-level error type returned by every public entry point.
#[derive(Debug, Error)]
pub enum QueryError {
    /// A selector failed validation before any store interaction occurred.
    #[error("invalid selector: {0}")]
    InvalidSelector(#[from] SelectorError),

    /// The schema-version probe run at session initialization failed or
    /// reported an incompatible version. No transaction was opened.
    #[error("schema incompatible: {0}")]
    SchemaIncompatible(String),

    /// The store connection could not be acquired or was lost.
    #[error("store unavailable: {0}")]
    StoreUnavailable(#[source] sqlx::Error),

    /// A stage of the execution plan returned an error from the store. The
    /// transaction has been rolled back; no partial result is returned.
    #[error("stage '{stage}' failed: {source}")]
    QueryFailed {
        /// Name of the stage that failed.
        stage: String,
        /// Underlying store error.
        #[source]
        source: sqlx::Error,
    },

    /// A store error occurred mid-iteration. The cursor has been closed; the
    /// caller must stop draining and release the session.
    #[error("cursor broken: {0}")]
    CursorBroken(#[source] sqlx::Error),

    /// The caller violated the session's scoping contract: a second iterate
    /// call was issued while a stream was still open, the session was used
    /// after release, or a prior fatal error poisoned it.
    #[error("lifecycle violation: {0}")]
    LifecycleViolation(&'static str),

    /// A point lookup (`Session::node_by_id`, `polyline_by_id`,
    /// `group_by_id`) found no record with the given id.
    #[error("no {kind} found with id {id}")]
    NotFound {
        /// Which entity kind was looked up (`"node"`, `"polyline"`, or
        /// `"group"`).
        kind: &'static str,
        /// The id that matched no row.
        id: u64,
    },
}

impl QueryError {
    /// Wraps a store error encountered while executing the named stage.
    pub(crate) fn query_failed(stage: impl Into<String>, source: sqlx::Error) -> Self {
        QueryError::QueryFailed {
            stage: stage.into(),
            source,
        }
    }
}
