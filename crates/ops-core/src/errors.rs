//! Cross-cutting error types for Opsboard.
//!
//! Persistence errors (`DatabaseError`) and the service-facing error taxonomy
//! live in `ops-db`; this module holds only errors the pure core can raise.

use thiserror::Error;

/// Errors raised while staging changes.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A modification was staged with mismatched before/after snapshots.
    #[error("Staged entity mismatch: expected {expected}, found {found}")]
    EntityMismatch { expected: String, found: String },
}
