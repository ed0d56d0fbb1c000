//! Database and service error types for ops-db.

use ops_core::errors::CoreError;
use thiserror::Error;

/// Errors from database operations.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// A SQL query failed.
    #[error("Query failed: {0}")]
    Query(String),

    /// Schema migration failed.
    #[error("Migration failed: {0}")]
    Migration(String),

    /// Expected a result row but none was returned.
    #[error("No result returned")]
    NoResult,

    /// Invalid state encountered (e.g., bad data in DB).
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Underlying libSQL error.
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// Catch-all for unexpected errors.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Typed outcomes of service operations. Expected conditions are returned,
/// never thrown through as raw persistence errors.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The target is absent or the actor lacks rights. Deliberately merged so
    /// callers cannot probe which IDs exist.
    #[error("not found or unauthorized")]
    NotFoundOrUnauthorized,

    /// Malformed or missing required input.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A named foreign reference does not exist (e.g., "project not found").
    #[error("{0} not found")]
    ReferenceNotFound(&'static str),

    /// The commit lost a race against a concurrent update; the caller may
    /// retry with fresh state.
    #[error("concurrent update conflict")]
    ConcurrencyConflict,

    /// Unexpected persistence failure.
    #[error(transparent)]
    Internal(#[from] DatabaseError),
}

impl From<libsql::Error> for ServiceError {
    fn from(err: libsql::Error) -> Self {
        Self::Internal(DatabaseError::LibSql(err))
    }
}

impl From<CoreError> for ServiceError {
    fn from(err: CoreError) -> Self {
        Self::Internal(DatabaseError::InvalidState(err.to_string()))
    }
}
