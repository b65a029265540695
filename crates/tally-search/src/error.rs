//! Search error types for tally-search.

/// Errors from semantic search.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// Error from the trail (policy denial, storage failure).
    #[error("database error: {0}")]
    Database(#[from] tally_db::error::DatabaseError),

    /// Error from the embedding engine.
    #[error("embedding error: {0}")]
    Embedding(#[from] tally_embeddings::EmbeddingError),

    /// Invalid or empty search query.
    #[error("invalid query: {0}")]
    InvalidQuery(String),
}
