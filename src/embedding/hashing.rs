use super::{EmbeddingClient, EmbeddingProviderError};
use async_trait::async_trait;

pub(crate) const DEFAULT_DIMENSION: usize = 384;

/// Deterministic embedding client that hashes bytes into a fixed-size, L2-normalized vector.
///
/// Useful offline and in tests: identical texts always map to identical vectors and texts that
/// share most of their bytes land close together.
pub struct HashingEmbeddingClient {
    model: String,
    dimension: usize,
}

impl HashingEmbeddingClient {
    /// Construct a client producing `dimension`-sized vectors.
    pub fn new(model: &str, dimension: usize) -> Result<Self, EmbeddingProviderError> {
        if dimension == 0 {
            return Err(EmbeddingProviderError::Configuration(
                "embedding dimension must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            model: model.to_string(),
            dimension,
        })
    }

    fn encode(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0_f32; self.dimension];

        if text.is_empty() {
            return embedding;
        }

        for (idx, byte) in text.bytes().enumerate() {
            let position = idx % self.dimension;
            embedding[position] += f32::from(byte) / 255.0;
        }

        let norm = embedding
            .iter()
            .map(|value| value * value)
            .sum::<f32>()
            .sqrt();

        if norm > 0.0 {
            for value in &mut embedding {
                *value /= norm;
            }
        }

        embedding
    }
}

#[async_trait]
impl EmbeddingClient for HashingEmbeddingClient {
    async fn embed_batch(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingProviderError> {
        tracing::debug!(
            model = %self.model,
            dimension = self.dimension,
            texts = texts.len(),
            "Generating hashed embeddings"
        );
        Ok(texts.iter().map(|text| self.encode(text)).collect())
    }

    fn model(&self) -> &str {
        &self.model
    }
}
