//! Retrieval-augmented answering: chat-completion adapters, the legal prompt, and the component
//! that glues retrieval to generation.

pub mod chat;
pub mod component;
pub mod ollama;
pub mod prompt;

use crate::config::{LlmConfig, LlmProvider, SecretError, SecretResolver};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

pub use chat::OpenAiCompatibleChatClient;
pub use component::{Answer, NO_CONTEXT_ANSWER, QueryComponent, QueryError};
pub use ollama::OllamaChatClient;
pub use prompt::PromptTemplate;

/// Errors surfaced by chat-completion providers.
#[derive(Debug, Error)]
pub enum LlmProviderError {
    /// The provider rejected the API key.
    #[error(
        "{provider} authentication failed: invalid API key (resolved key, masked: {masked_key}). \
         Place a valid {provider} key in the secrets file under the name referenced by the `LLM.api_key` \
         setting and re-run. Provider said: {detail}"
    )]
    Authentication {
        /// Provider name.
        provider: &'static str,
        /// First characters of the key, never the full value.
        masked_key: String,
        /// Diagnostic returned by the provider.
        detail: String,
    },
    /// Settings are unusable (missing key, bad client options).
    #[error("LLM provider misconfigured: {0}")]
    Configuration(String),
    /// Provider was unreachable.
    #[error("LLM provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider returned an error response.
    #[error("Failed to generate completion: {0}")]
    GenerationFailed(String),
    /// Provider response could not be parsed.
    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
    /// API key reference could not be resolved.
    #[error("Failed to resolve LLM API key: {0}")]
    Secret(#[from] SecretError),
}

/// Chat-completion interface: one prompt in, one answer out.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Send `prompt` as a single user turn and return the model's reply.
    async fn complete(&self, prompt: &str) -> Result<String, LlmProviderError>;

    /// Model identifier used for logging.
    fn model(&self) -> &str;
}

/// Build the chat client described by `config`, resolving its API key through `secrets`.
pub fn build_chat_client(
    config: &LlmConfig,
    secrets: &SecretResolver,
) -> Result<Arc<dyn ChatClient>, LlmProviderError> {
    let client: Arc<dyn ChatClient> = match config.provider {
        LlmProvider::Groq | LlmProvider::OpenAi => {
            let api_key = secrets
                .resolve_optional(config.api_key.as_deref())?
                .unwrap_or_default();
            tracing::info!(masked_key = %mask_key(&api_key), "LLM API key resolved");
            Arc::new(OpenAiCompatibleChatClient::new(
                config.provider,
                &config.model,
                &api_key,
                config.base_url.clone(),
                config.temperature,
            )?)
        }
        LlmProvider::Ollama => Arc::new(OllamaChatClient::new(
            &config.model,
            config.base_url.clone(),
            config.temperature,
        )?),
    };
    tracing::info!(
        provider = config.provider.as_str(),
        model = %config.model,
        "Using LLM provider"
    );
    Ok(client)
}

/// Show only the first six characters of a key.
pub fn mask_key(key: &str) -> String {
    if key.chars().count() > 6 {
        let prefix: String = key.chars().take(6).collect();
        format!("{prefix}...")
    } else {
        "<empty>".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_all_but_prefix() {
        assert_eq!(mask_key("gsk_abcdefghijkl"), "gsk_ab...");
        assert_eq!(mask_key("short"), "<empty>");
        assert_eq!(mask_key(""), "<empty>");
    }

    #[test]
    fn authentication_message_never_contains_full_key() {
        let error = LlmProviderError::Authentication {
            provider: "groq",
            masked_key: mask_key("gsk_supersecretvalue"),
            detail: "401 Unauthorized".into(),
        };
        let message = error.to_string();
        assert!(message.contains("gsk_su..."));
        assert!(!message.contains("supersecretvalue"));
        assert!(message.contains("secrets file"));
    }

    #[test]
    fn groq_requires_key() {
        let config = LlmConfig {
            provider: LlmProvider::Groq,
            model: "llama-3.1-8b-instant".into(),
            api_key: None,
            base_url: None,
            temperature: 0.7,
        };
        let error = build_chat_client(&config, &SecretResolver::new("unused.yaml"))
            .err()
            .expect("missing key");
        assert!(matches!(error, LlmProviderError::Configuration(_)));
    }
}
