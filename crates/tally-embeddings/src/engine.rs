//! ONNX-backed embedding engine.

use std::sync::Mutex;

use fastembed::{EmbeddingModel, TextEmbedding, TextInitOptions};

use crate::error::EmbeddingError;
use crate::Embedder;

/// Local embedding engine backed by fastembed (ONNX runtime).
///
/// Wraps the `AllMiniLML6V2` model to produce 384-dimensional float vectors.
/// Model files are downloaded on first use and cached at `~/.tally/cache/fastembed/`.
///
/// The ONNX session needs `&mut` access, so calls are serialized behind a
/// mutex. From async code, call through [`tokio::task::spawn_blocking`].
pub struct EmbeddingEngine {
    model: Mutex<TextEmbedding>,
}

impl EmbeddingEngine {
    /// Create a new embedding engine with the `AllMiniLML6V2` model.
    ///
    /// Downloads the model on first run (~80MB).
    ///
    /// # Errors
    ///
    /// Returns [`EmbeddingError::InitFailed`] if model download or ONNX initialization fails.
    pub fn new() -> Result<Self, EmbeddingError> {
        let cache_dir = dirs::home_dir().map_or_else(
            || std::path::PathBuf::from(".fastembed_cache"),
            |h| h.join(".tally").join("cache").join("fastembed"),
        );

        let model = TextEmbedding::try_new(
            TextInitOptions::new(EmbeddingModel::AllMiniLML6V2)
                .with_cache_dir(cache_dir)
                .with_show_download_progress(true),
        )
        .map_err(|e| EmbeddingError::InitFailed(e.to_string()))?;

        tracing::info!(model = "all-MiniLM-L6-v2", "embedding engine ready");
        Ok(Self {
            model: Mutex::new(model),
        })
    }

    /// Embedding vector dimensionality of `AllMiniLML6V2`.
    pub const DIMENSION: usize = 384;
}

impl Embedder for EmbeddingEngine {
    fn dimension(&self) -> usize {
        Self::DIMENSION
    }

    fn model_name(&self) -> &str {
        "all-MiniLM-L6-v2"
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut model = self
            .model
            .lock()
            .map_err(|_| EmbeddingError::EmbedFailed("embedding model lock poisoned".into()))?;
        model
            .embed(texts.to_vec(), None)
            .map_err(|e| EmbeddingError::EmbedFailed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::cosine_similarity;

    #[test]
    #[ignore = "downloads the ONNX model"]
    fn single_embed_384_dims() {
        let engine = EmbeddingEngine::new().expect("engine should init");
        let embedding = engine
            .embed_single("user acme-admin granted role auditor")
            .expect("embed should succeed");

        assert_eq!(embedding.len(), 384);
        assert!(embedding.iter().all(|v| v.is_finite()));
    }

    #[test]
    #[ignore = "downloads the ONNX model"]
    fn related_events_cluster() {
        let engine = EmbeddingEngine::new().expect("engine should init");
        let a = engine.embed_single("failed login attempt for user").unwrap();
        let b = engine.embed_single("authentication failure on account").unwrap();
        let c = engine.embed_single("project budget line updated").unwrap();

        assert!(cosine_similarity(&a, &b) > cosine_similarity(&a, &c));
    }
}
