use std::time::Duration;

use tally_db::error::DatabaseError;
use tally_embeddings::EmbeddingError;

/// Errors confined to the enrichment subsystem.
///
/// None of these ever reach the writer that appended the record.
#[derive(Debug, thiserror::Error)]
pub enum EnrichError {
    /// The embedding or scoring function is down. Retried with backoff.
    #[error("Enrichment unavailable: {0}")]
    Unavailable(String),

    /// An external call exceeded its time bound. Retried with backoff.
    #[error("Enrichment call timed out after {0:?}")]
    Timeout(Duration),

    /// The function rejected the input or returned an unusable value.
    #[error("Malformed enrichment input or output: {0}")]
    Malformed(String),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl EnrichError {
    /// Whether a later attempt can succeed without anything changing.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Unavailable(_) | Self::Timeout(_) => true,
            Self::Malformed(_) => false,
            Self::Database(e) => e.is_retryable(),
        }
    }
}

impl From<EmbeddingError> for EnrichError {
    fn from(e: EmbeddingError) -> Self {
        match e {
            EmbeddingError::InitFailed(msg) | EmbeddingError::EmbedFailed(msg) => {
                Self::Unavailable(msg)
            }
            EmbeddingError::EmptyResult | EmbeddingError::DimensionMismatch { .. } => {
                Self::Malformed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_failures_are_retryable() {
        let e: EnrichError = EmbeddingError::EmbedFailed("onnx".into()).into();
        assert!(e.is_retryable());
        assert!(EnrichError::Timeout(Duration::from_secs(1)).is_retryable());
    }

    #[test]
    fn bad_vectors_are_not() {
        let e: EnrichError = EmbeddingError::DimensionMismatch {
            expected: 384,
            actual: 3,
        }
        .into();
        assert!(matches!(e, EnrichError::Malformed(_)));
        assert!(!e.is_retryable());
    }
}
