//! Hosted Gemini embeddings.

use super::{EmbeddingClient, EmbeddingProviderError, ensure_vector_count};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;

const DEFAULT_GEMINI_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const MAX_BATCH: usize = 100;
const PROVIDER: &str = "gemini";

/// Gemini `embedContent` / `batchEmbedContents` client.
pub struct GeminiEmbeddingClient {
    http: Client,
    base_url: String,
    model: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct ContentEmbedding {
    values: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct BatchResponse {
    #[serde(default)]
    embeddings: Vec<ContentEmbedding>,
}

#[derive(Debug, Deserialize)]
struct SingleResponse {
    embedding: ContentEmbedding,
}

impl GeminiEmbeddingClient {
    /// Validate the key and build the client. `model` may be given with or without `models/`.
    pub fn new(
        model: &str,
        api_key: &str,
        base_url: Option<String>,
    ) -> Result<Self, EmbeddingProviderError> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(EmbeddingProviderError::Configuration(
                "Gemini API key is empty".into(),
            ));
        }
        if !api_key.starts_with("AIza") {
            let prefix: String = api_key.chars().take(4).collect();
            tracing::warn!(
                prefix = %prefix,
                "API key format may be invalid; Gemini keys usually start with 'AIza'"
            );
        }

        let http = Client::builder()
            .user_agent("rusty-counsel/embed")
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|error| EmbeddingProviderError::Configuration(error.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.unwrap_or_else(|| DEFAULT_GEMINI_URL.to_string()),
            model: model.trim().trim_start_matches("models/").to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn endpoint(&self, method: &str) -> String {
        format!(
            "{}/models/{}:{method}",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }

    fn qualified_model(&self) -> String {
        format!("models/{}", self.model)
    }

    fn content(text: &str) -> Value {
        json!({ "parts": [{ "text": text }] })
    }

    async fn post(&self, method: &str, body: &Value) -> Result<reqwest::Response, EmbeddingProviderError> {
        let response = self
            .http
            .post(self.endpoint(method))
            .query(&[("key", self.api_key.as_str())])
            .json(body)
            .send()
            .await
            .map_err(|error| {
                EmbeddingProviderError::ProviderUnavailable(format!(
                    "failed to reach Gemini at {}: {error}",
                    self.base_url
                ))
            })?;

        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        tracing::error!(status = %status, model = %self.model, "Gemini embedding request failed");
        if body.contains("API_KEY_INVALID")
            || status == StatusCode::UNAUTHORIZED
            || status == StatusCode::FORBIDDEN
        {
            return Err(EmbeddingProviderError::InvalidApiKey {
                provider: PROVIDER,
                detail: format!("{status}: {body}"),
            });
        }
        Err(EmbeddingProviderError::GenerationFailed(format!(
            "Gemini returned {status}: {body}"
        )))
    }

    async fn embed_chunk(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingProviderError> {
        let model = self.qualified_model();
        let requests: Vec<Value> = texts
            .iter()
            .map(|text| json!({ "model": model, "content": Self::content(text) }))
            .collect();
        let response = self
            .post("batchEmbedContents", &json!({ "requests": requests }))
            .await?;
        let body: BatchResponse = response.json().await.map_err(|error| {
            EmbeddingProviderError::InvalidResponse(format!(
                "failed to decode Gemini batch response: {error}"
            ))
        })?;
        let vectors: Vec<Vec<f32>> = body
            .embeddings
            .into_iter()
            .map(|embedding| embedding.values)
            .collect();
        ensure_vector_count(texts.len(), &vectors)?;
        Ok(vectors)
    }
}

#[async_trait]
impl EmbeddingClient for GeminiEmbeddingClient {
    async fn embed_batch(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingProviderError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(MAX_BATCH) {
            tracing::debug!(model = %self.model, batch = batch.len(), "Embedding batch with Gemini");
            vectors.extend(self.embed_chunk(batch).await?);
        }
        Ok(vectors)
    }

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbeddingProviderError> {
        let body = json!({
            "model": self.qualified_model(),
            "content": Self::content(text),
        });
        let response = self.post("embedContent", &body).await?;
        let body: SingleResponse = response.json().await.map_err(|error| {
            EmbeddingProviderError::InvalidResponse(format!(
                "failed to decode Gemini response: {error}"
            ))
        })?;
        if body.embedding.values.is_empty() {
            return Err(EmbeddingProviderError::InvalidResponse(
                "Gemini returned an empty embedding".into(),
            ));
        }
        Ok(body.embedding.values)
    }

    fn model(&self) -> &str {
        &self.model
    }
}
