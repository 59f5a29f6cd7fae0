/// Mock embedder for testing and offline indexing.
///
/// Generates deterministic embeddings seeded from the text's sha256 digest.
use sha2::{Digest, Sha256};

use super::{Embedder, EmbedderError};

/// A mock embedder that produces deterministic, unit-length vectors.
pub struct MockEmbedder {
    pub dimensions: usize,
    batch: bool,
}

impl MockEmbedder {
    /// Create a new `MockEmbedder` with the given dimensionality.
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            batch: true,
        }
    }

    /// Same vectors, but without a batch primitive.
    #[must_use]
    pub fn single_only(dimensions: usize) -> Self {
        Self {
            dimensions,
            batch: false,
        }
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new(384)
    }
}

impl Embedder for MockEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        // Extend the digest block by block until every dimension has a byte
        let mut embedding = Vec::with_capacity(self.dimensions);
        let mut block = 0u32;
        while embedding.len() < self.dimensions {
            let digest = Sha256::new()
                .chain_update(block.to_le_bytes())
                .chain_update(text.as_bytes())
                .finalize();
            let remaining = self.dimensions - embedding.len();
            embedding.extend(
                digest
                    .iter()
                    .take(remaining)
                    .map(|b| *b as f32 / 127.5 - 1.0),
            );
            block += 1;
        }

        // L2 normalize
        let norm_sq: f32 = embedding.iter().map(|v| v * v).sum();
        if norm_sq > 0.0 {
            let inv = 1.0 / norm_sq.sqrt();
            for v in &mut embedding {
                *v *= inv;
            }
        }

        Ok(embedding)
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        if !self.batch {
            return Err(EmbedderError::BatchUnsupported);
        }
        texts.iter().map(|t| self.embed(t)).collect()
    }

    fn supports_batch(&self) -> bool {
        self.batch
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
