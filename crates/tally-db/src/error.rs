//! Database error types for tally-db.

use tally_core::enums::{ExportDenial, Operation};
use tally_core::errors::CoreError;
use thiserror::Error;

use crate::retry;

/// Errors from store, policy, and export operations.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// The append would fork the chain. Re-read the tail and retry.
    #[error("Integrity violation: chain '{chain}' no longer ends at {expected_prev}")]
    IntegrityViolation { chain: String, expected_prev: String },

    /// The caller targeted a tenant it is not authorized for. Never retried.
    #[error("Tenant scope violation: {caller} may not access tenant '{target}'")]
    TenantScopeViolation { caller: String, target: String },

    /// A write candidate failed validation. Nothing was committed.
    #[error("Malformed candidate: {0}")]
    MalformedCandidate(String),

    /// The caller's role does not permit the operation.
    #[error("Operation '{operation}' denied by access policy")]
    PolicyDenied { operation: Operation },

    /// Entity lookup returned no visible result.
    #[error("{entity_type} not found: {id}")]
    NotFound { entity_type: &'static str, id: String },

    /// An export download or inspection was refused.
    #[error("Export access denied: {0}")]
    ExportDenied(ExportDenial),

    /// A SQL query failed.
    #[error("Query failed: {0}")]
    Query(String),

    /// Schema migration failed.
    #[error("Migration failed: {0}")]
    Migration(String),

    /// Expected a result row but none was returned.
    #[error("No result returned")]
    NoResult,

    /// Invalid state encountered (e.g., bad data in DB, illegal transition).
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Underlying libSQL error.
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// Catch-all for unexpected errors.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DatabaseError {
    /// Whether retrying the same operation may succeed.
    ///
    /// True for lost chain races and transient lock contention only.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::IntegrityViolation { .. } => true,
            Self::LibSql(e) => retry::is_transient(e),
            _ => false,
        }
    }

    /// Whether this error should be treated as a security event.
    #[must_use]
    pub const fn is_security_event(&self) -> bool {
        matches!(self, Self::TenantScopeViolation { .. })
    }
}

impl From<CoreError> for DatabaseError {
    fn from(error: CoreError) -> Self {
        match error {
            CoreError::Validation(msg) => Self::MalformedCandidate(msg),
            CoreError::NotFound { id, .. } => Self::NotFound {
                entity_type: "entity",
                id,
            },
            CoreError::Canonical(msg) => Self::InvalidState(msg),
            CoreError::Other(e) => Self::Other(e),
        }
    }
}
