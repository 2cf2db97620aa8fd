//! OpenAI-compatible chat completions (Groq, OpenAI).

use super::{ChatClient, LlmProviderError, mask_key};
use crate::config::LlmProvider;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Chat client for OpenAI-style `/chat/completions` endpoints (Groq and OpenAI).
pub struct OpenAiCompatibleChatClient {
    http: Client,
    provider: &'static str,
    base_url: String,
    model: String,
    api_key: String,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Message {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiCompatibleChatClient {
    /// Build a client for `provider`; `base_url` overrides the provider default.
    pub fn new(
        provider: LlmProvider,
        model: &str,
        api_key: &str,
        base_url: Option<String>,
        temperature: f32,
    ) -> Result<Self, LlmProviderError> {
        let default_url = match provider {
            LlmProvider::Groq => GROQ_BASE_URL,
            LlmProvider::OpenAi => OPENAI_BASE_URL,
            LlmProvider::Ollama => {
                return Err(LlmProviderError::Configuration(
                    "Ollama does not expose the chat completions API used by this client".into(),
                ));
            }
        };
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(LlmProviderError::Configuration(format!(
                "{} API key could not be resolved; check the secrets file",
                provider.as_str()
            )));
        }

        let http = Client::builder()
            .user_agent("rusty-counsel/chat")
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|error| LlmProviderError::Configuration(error.to_string()))?;

        Ok(Self {
            http,
            provider: provider.as_str(),
            base_url: base_url.unwrap_or_else(|| default_url.to_string()),
            model: model.to_string(),
            api_key: api_key.to_string(),
            temperature,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn authentication_error(&self, status: StatusCode, body: &str) -> LlmProviderError {
        let mut detail = format!("{status}: {body}");
        if self.api_key.starts_with("hf_") {
            detail.push_str(
                " (the configured key looks like a Hugging Face token; replace it with a key for this provider)",
            );
        }
        LlmProviderError::Authentication {
            provider: self.provider,
            masked_key: mask_key(&self.api_key),
            detail,
        }
    }
}

fn is_auth_failure(status: StatusCode, body: &str) -> bool {
    let lowered = body.to_ascii_lowercase();
    status == StatusCode::UNAUTHORIZED
        || lowered.contains("invalid_api_key")
        || lowered.contains("invalid api key")
}

#[async_trait]
impl ChatClient for OpenAiCompatibleChatClient {
    async fn complete(&self, prompt: &str) -> Result<String, LlmProviderError> {
        let payload = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": self.temperature,
        });

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                LlmProviderError::ProviderUnavailable(format!(
                    "failed to reach {} at {}: {error}",
                    self.provider, self.base_url
                ))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            if is_auth_failure(status, &body) {
                let error = self.authentication_error(status, &body);
                tracing::error!(provider = self.provider, error = %error, "Chat authentication failed");
                return Err(error);
            }
            tracing::error!(provider = self.provider, status = %status, "Chat completion failed");
            return Err(LlmProviderError::GenerationFailed(format!(
                "{} returned {status}: {body}",
                self.provider
            )));
        }

        let body: CompletionResponse = response.json().await.map_err(|error| {
            LlmProviderError::InvalidResponse(format!(
                "failed to decode {} response: {error}",
                self.provider
            ))
        })?;

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .ok_or_else(|| {
                LlmProviderError::InvalidResponse(format!(
                    "{} returned no message content",
                    self.provider
                ))
            })
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};

    fn client(server: &MockServer, key: &str) -> OpenAiCompatibleChatClient {
        OpenAiCompatibleChatClient::new(
            LlmProvider::Groq,
            "llama-3.1-8b-instant",
            key,
            Some(server.base_url()),
            0.2,
        )
        .expect("client")
    }

    #[tokio::test]
    async fn completes_with_bearer_auth() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/chat/completions")
                    .header("authorization", "Bearer gsk_test_key")
                    .json_body_partial(r#"{"model":"llama-3.1-8b-instant"}"#);
                then.status(200).json_body(json!({
                    "choices": [
                        { "index": 0, "message": { "role": "assistant", "content": "  Article 3 protects life.  " } }
                    ]
                }));
            })
            .await;

        let answer = client(&server, "gsk_test_key")
            .complete("What does Article 3 say?")
            .await
            .expect("answer");

        mock.assert_async().await;
        assert_eq!(answer, "Article 3 protects life.");
    }

    #[tokio::test]
    async fn unauthorized_maps_to_authentication_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(401).json_body(json!({
                    "error": { "message": "Invalid API Key", "code": "invalid_api_key" }
                }));
            })
            .await;

        let error = client(&server, "hf_notagroqkey")
            .complete("question")
            .await
            .expect_err("auth failure");

        match error {
            LlmProviderError::Authentication {
                provider,
                masked_key,
                detail,
            } => {
                assert_eq!(provider, "groq");
                assert_eq!(masked_key, "hf_not...");
                assert!(detail.contains("Hugging Face"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn server_errors_are_generation_failures() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(503).body("over capacity");
            })
            .await;

        let error = client(&server, "gsk_test_key")
            .complete("question")
            .await
            .expect_err("failure");
        assert!(
            matches!(error, LlmProviderError::GenerationFailed(message) if message.contains("503"))
        );
    }

    #[test]
    fn default_base_urls_follow_provider() {
        let groq =
            OpenAiCompatibleChatClient::new(LlmProvider::Groq, "m", "gsk_key_123", None, 0.7)
                .unwrap();
        assert_eq!(groq.endpoint(), "https://api.groq.com/openai/v1/chat/completions");
        let openai =
            OpenAiCompatibleChatClient::new(LlmProvider::OpenAi, "m", "sk-key-123", None, 0.7)
                .unwrap();
        assert_eq!(openai.endpoint(), "https://api.openai.com/v1/chat/completions");
    }
}
