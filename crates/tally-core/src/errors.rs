//! Cross-cutting error types for Tally.
//!
//! Domain-specific errors (`DatabaseError`, `EnrichError`, `SearchError`) are
//! defined in their respective crates. The CLI converges them through `anyhow`.

use thiserror::Error;

/// Errors that can be raised by any Tally crate.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Entity lookup returned no result.
    #[error("Entity not found: {entity_type} {id}")]
    NotFound { entity_type: String, id: String },

    /// Data failed validation (shape, length, constraints).
    #[error("Validation error: {0}")]
    Validation(String),

    /// Canonical serialization failed.
    #[error("Canonical serialization failed: {0}")]
    Canonical(String),

    /// Catch-all for unexpected errors.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
