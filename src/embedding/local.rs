//! In-process sentence-transformer embeddings via fastembed (ONNX runtime).
//!
//! The model weights are downloaded to fastembed's cache on first use; afterwards embedding runs
//! without network access.

use super::{EmbeddingClient, EmbeddingProviderError, ensure_vector_count};
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::sync::{Arc, Mutex};

/// Embeddings computed locally with an ONNX sentence-transformer.
pub struct LocalEmbeddingClient {
    model: Arc<Mutex<TextEmbedding>>,
    name: String,
}

fn model_for(name: &str) -> Result<EmbeddingModel, EmbeddingProviderError> {
    let short = name.rsplit('/').next().unwrap_or(name);
    match short.to_ascii_lowercase().as_str() {
        "all-minilm-l6-v2" => Ok(EmbeddingModel::AllMiniLML6V2),
        "all-minilm-l12-v2" => Ok(EmbeddingModel::AllMiniLML12V2),
        "bge-small-en-v1.5" => Ok(EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(EmbeddingModel::BGEBaseENV15),
        _ => Err(EmbeddingProviderError::Configuration(format!(
            "unsupported local embedding model '{name}'"
        ))),
    }
}

impl LocalEmbeddingClient {
    /// Load `model` (for example `sentence-transformers/all-MiniLM-L6-v2`).
    pub fn new(model: &str) -> Result<Self, EmbeddingProviderError> {
        let kind = model_for(model)?;
        let embedding = TextEmbedding::try_new(InitOptions::new(kind)).map_err(|error| {
            EmbeddingProviderError::ProviderUnavailable(format!(
                "failed to load local model '{model}': {error}"
            ))
        })?;
        tracing::info!(model, "Local embedding model loaded");
        Ok(Self {
            model: Arc::new(Mutex::new(embedding)),
            name: model.to_string(),
        })
    }
}

#[async_trait]
impl EmbeddingClient for LocalEmbeddingClient {
    async fn embed_batch(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingProviderError> {
        let expected = texts.len();
        let model = Arc::clone(&self.model);
        let vectors = tokio::task::spawn_blocking(move || {
            let model = model.lock().map_err(|_| {
                EmbeddingProviderError::GenerationFailed("local model lock poisoned".into())
            })?;
            model
                .embed(texts, None)
                .map_err(|error| EmbeddingProviderError::GenerationFailed(error.to_string()))
        })
        .await
        .map_err(|error| EmbeddingProviderError::GenerationFailed(error.to_string()))??;

        ensure_vector_count(expected, &vectors)?;
        Ok(vectors)
    }

    fn model(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_hub_and_short_model_names() {
        assert!(matches!(
            model_for("sentence-transformers/all-MiniLM-L6-v2"),
            Ok(EmbeddingModel::AllMiniLML6V2)
        ));
        assert!(matches!(
            model_for("all-MiniLM-L6-v2"),
            Ok(EmbeddingModel::AllMiniLML6V2)
        ));
        assert!(matches!(
            model_for("text-embedding-004"),
            Err(EmbeddingProviderError::Configuration(_))
        ));
    }

    #[tokio::test]
    #[ignore = "Downloads the all-MiniLM-L6-v2 model"]
    async fn embeds_with_minilm() {
        let client = LocalEmbeddingClient::new("sentence-transformers/all-MiniLM-L6-v2").unwrap();
        let vectors = client
            .embed_batch(vec![
                "Everyone has the right to education.".into(),
                "No one shall be subjected to torture.".into(),
            ])
            .await
            .unwrap();
        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[0].len(), 384);
    }
}
