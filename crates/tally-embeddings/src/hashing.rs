//! Deterministic feature-hashing embedder.
//!
//! Tokens are lowercased alphanumeric runs. Each token and each adjacent
//! token pair is hashed with SHA-256 into one bucket with a sign, and the
//! result is L2-normalized. No model download, identical output on every
//! platform, and texts sharing vocabulary land close together.

use sha2::{Digest, Sha256};

use crate::error::EmbeddingError;
use crate::vector::normalize;
use crate::Embedder;

/// Default width, matching the ONNX engine so the two are interchangeable.
pub const DEFAULT_HASHING_DIM: usize = 384;

#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dim: usize,
}

impl HashingEmbedder {
    /// A zero `dim` is treated as one.
    #[must_use]
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1) }
    }

    fn bucket(&self, feature: &str) -> (usize, f32) {
        let digest = Sha256::digest(feature.as_bytes());
        let mut idx = [0u8; 8];
        idx.copy_from_slice(&digest[..8]);
        let bucket = u64::from_le_bytes(idx) % self.dim as u64;
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        #[allow(clippy::cast_possible_truncation)]
        (bucket as usize, sign)
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let tokens: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase)
            .collect();

        let mut v = vec![0.0f32; self.dim];
        for token in &tokens {
            let (i, s) = self.bucket(token);
            v[i] += s;
        }
        for pair in tokens.windows(2) {
            let (i, s) = self.bucket(&format!("{} {}", pair[0], pair[1]));
            v[i] += 0.5 * s;
        }
        normalize(&mut v);
        v
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_HASHING_DIM)
    }
}

impl Embedder for HashingEmbedder {
    fn dimension(&self) -> usize {
        self.dim
    }

    fn model_name(&self) -> &str {
        "feature-hashing"
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}
