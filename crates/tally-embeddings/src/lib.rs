//! # tally-embeddings
//!
//! Turns audit record text into fixed-width vectors for the enrichment
//! pipeline and semantic search.
//!
//! Two implementations of [`Embedder`]:
//!
//! - [`EmbeddingEngine`]: fastembed (ONNX runtime), `AllMiniLML6V2`,
//!   384 dimensions. Downloads its model on first use.
//! - [`HashingEmbedder`]: deterministic feature hashing. No model, no I/O;
//!   used by tests and offline deployments.
//!
//! Both are synchronous. From async code, call them inside
//! [`tokio::task::spawn_blocking`].

pub mod engine;
pub mod error;
pub mod hashing;
pub mod vector;

pub use engine::EmbeddingEngine;
pub use error::EmbeddingError;
pub use hashing::HashingEmbedder;
pub use vector::{cosine_similarity, normalize};

/// An opaque `text -> vector` function.
///
/// Implementations are pure from the caller's point of view; a failure is
/// an error, never a malformed vector.
pub trait Embedder: Send + Sync {
    /// Width of every vector this embedder returns.
    fn dimension(&self) -> usize;

    /// Short identifier recorded alongside stored embeddings in logs.
    fn model_name(&self) -> &str;

    /// Embed a batch. Returns one vector per input, in order.
    ///
    /// # Errors
    ///
    /// Returns [`EmbeddingError`] if the model fails.
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Embed a single text.
    ///
    /// # Errors
    ///
    /// Returns [`EmbeddingError::EmptyResult`] if the model returns nothing,
    /// or [`EmbeddingError::DimensionMismatch`] for a vector of the wrong width.
    fn embed_single(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut out = self.embed_batch(&[text.to_string()])?;
        let v = out.pop().ok_or(EmbeddingError::EmptyResult)?;
        check_dimension(self.dimension(), &v)?;
        Ok(v)
    }
}

/// Reject a vector whose width is not `expected`.
///
/// # Errors
///
/// Returns [`EmbeddingError::DimensionMismatch`].
pub const fn check_dimension(expected: usize, v: &[f32]) -> Result<(), EmbeddingError> {
    if v.len() == expected {
        Ok(())
    } else {
        Err(EmbeddingError::DimensionMismatch {
            expected,
            actual: v.len(),
        })
    }
}
