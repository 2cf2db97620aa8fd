//! Embedding client abstraction and adapters.
//!
//! Every backend exposes the same two operations: embed a batch of chunk texts, and embed a
//! single question. Adapters talk HTTP directly with `reqwest` rather than wrapping provider SDKs.

mod gemini;
mod hashing;
#[cfg(feature = "local-embeddings")]
mod local;
mod ollama;

use crate::config::{EmbeddingConfig, EmbeddingProvider, SecretError, SecretResolver};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

pub use gemini::GeminiEmbeddingClient;
pub use hashing::HashingEmbeddingClient;
#[cfg(feature = "local-embeddings")]
pub use local::LocalEmbeddingClient;
pub use ollama::OllamaEmbeddingClient;

/// Errors raised by embedding providers.
#[derive(Debug, Error)]
pub enum EmbeddingProviderError {
    /// The provider rejected the configured API key.
    #[error("Invalid API key for {provider}; check the secrets file. Provider said: {detail}")]
    InvalidApiKey {
        /// Provider name.
        provider: &'static str,
        /// Diagnostic returned by the provider.
        detail: String,
    },
    /// The client was configured with unusable settings.
    #[error("Embedding provider misconfigured: {0}")]
    Configuration(String),
    /// The provider could not be reached.
    #[error("Embedding provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// The provider returned an error response.
    #[error("Failed to generate embeddings: {0}")]
    GenerationFailed(String),
    /// The provider response could not be interpreted.
    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
    /// The API key reference could not be resolved.
    #[error("Failed to resolve embedding API key: {0}")]
    Secret(#[from] SecretError),
}

/// Interface implemented by embedding backends.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Produce one embedding vector per input text, in input order.
    async fn embed_batch(&self, texts: Vec<String>)
    -> Result<Vec<Vec<f32>>, EmbeddingProviderError>;

    /// Produce the embedding for a single query text.
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbeddingProviderError> {
        let mut vectors = self.embed_batch(vec![text.to_string()]).await?;
        vectors.pop().ok_or_else(|| {
            EmbeddingProviderError::InvalidResponse("provider returned no vector".into())
        })
    }

    /// Model identifier used for logging.
    fn model(&self) -> &str;
}

/// Build the embedding client described by `config`, resolving its API key through `secrets`.
pub fn build_embedding_client(
    config: &EmbeddingConfig,
    secrets: &SecretResolver,
) -> Result<Arc<dyn EmbeddingClient>, EmbeddingProviderError> {
    tracing::info!(provider = ?config.provider, model = %config.model, "Initializing embedding client");
    let client: Arc<dyn EmbeddingClient> = match config.provider {
        EmbeddingProvider::Gemini => {
            let api_key = secrets
                .resolve_optional(config.api_key.as_deref())?
                .unwrap_or_default();
            tracing::info!(key_length = api_key.len(), "Embedding API key resolved");
            Arc::new(GeminiEmbeddingClient::new(
                &config.model,
                &api_key,
                config.base_url.clone(),
            )?)
        }
        EmbeddingProvider::Ollama => Arc::new(OllamaEmbeddingClient::new(
            &config.model,
            config.base_url.clone(),
        )?),
        EmbeddingProvider::Hashing => Arc::new(HashingEmbeddingClient::new(
            &config.model,
            config.dimension.unwrap_or(hashing::DEFAULT_DIMENSION),
        )?),
        EmbeddingProvider::Local => local_client(&config.model)?,
    };
    Ok(client)
}

#[cfg(feature = "local-embeddings")]
fn local_client(model: &str) -> Result<Arc<dyn EmbeddingClient>, EmbeddingProviderError> {
    Ok(Arc::new(LocalEmbeddingClient::new(model)?))
}

#[cfg(not(feature = "local-embeddings"))]
fn local_client(model: &str) -> Result<Arc<dyn EmbeddingClient>, EmbeddingProviderError> {
    Err(EmbeddingProviderError::Configuration(format!(
        "provider 'local' (model '{model}') needs a build with the `local-embeddings` feature"
    )))
}

/// Verify that a provider returned exactly one vector per input.
pub(crate) fn ensure_vector_count(
    expected: usize,
    vectors: &[Vec<f32>],
) -> Result<(), EmbeddingProviderError> {
    if vectors.len() != expected {
        return Err(EmbeddingProviderError::InvalidResponse(format!(
            "expected {expected} vectors, received {}",
            vectors.len()
        )));
    }
    if vectors.iter().any(Vec::is_empty) {
        return Err(EmbeddingProviderError::InvalidResponse(
            "provider returned an empty vector".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DistanceMetric, VectorStoreKind};
    use std::path::PathBuf;

    fn config(provider: EmbeddingProvider, api_key: Option<&str>) -> EmbeddingConfig {
        EmbeddingConfig {
            provider,
            model: "test-model".into(),
            dimension: Some(16),
            vector_store: VectorStoreKind::Local,
            distance: DistanceMetric::L2,
            vector_store_path: PathBuf::from("vectorstore"),
            api_key: api_key.map(str::to_string),
            base_url: None,
        }
    }

    #[tokio::test]
    async fn builds_hashing_client_with_configured_dimension() {
        let secrets = SecretResolver::new("unused.yaml");
        let client = build_embedding_client(&config(EmbeddingProvider::Hashing, None), &secrets)
            .expect("client");
        let vector = client.embed_one("Article 1").await.expect("vector");
        assert_eq!(vector.len(), 16);
        assert_eq!(client.model(), "test-model");
    }

    #[test]
    fn gemini_requires_api_key() {
        let secrets = SecretResolver::new("unused.yaml");
        let error = build_embedding_client(&config(EmbeddingProvider::Gemini, None), &secrets)
            .err()
            .expect("missing key rejected");
        assert!(matches!(error, EmbeddingProviderError::Configuration(_)));
    }

    #[test]
    fn unresolvable_secret_is_reported() {
        let secrets = SecretResolver::new("definitely-missing-secret.yaml");
        let error = build_embedding_client(
            &config(EmbeddingProvider::Gemini, Some("!secret Gemini_API_Key")),
            &secrets,
        )
        .err()
        .expect("secret failure");
        assert!(matches!(error, EmbeddingProviderError::Secret(_)));
    }

    #[cfg(not(feature = "local-embeddings"))]
    #[test]
    fn local_provider_requires_feature() {
        let secrets = SecretResolver::new("unused.yaml");
        let error = build_embedding_client(&config(EmbeddingProvider::Local, None), &secrets)
            .err()
            .expect("feature disabled");
        assert!(
            matches!(error, EmbeddingProviderError::Configuration(message) if message.contains("local-embeddings"))
        );
    }

    #[test]
    fn vector_count_mismatch_is_rejected() {
        let error = ensure_vector_count(2, &[vec![0.1]]).unwrap_err();
        assert!(matches!(error, EmbeddingProviderError::InvalidResponse(_)));
        assert!(ensure_vector_count(1, &[vec![0.1]]).is_ok());
    }
}
