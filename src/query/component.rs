//! Retrieval plus generation: embed the question, fetch the nearest chunks, and ask the model to
//! answer from them alone.

use super::{ChatClient, LlmProviderError, PromptTemplate};
use crate::embedding::{EmbeddingClient, EmbeddingProviderError};
use crate::index::{IndexError, SearchHit, VectorIndex};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

/// Returned without calling the model when retrieval finds nothing.
pub const NO_CONTEXT_ANSWER: &str = "No relevant legal information found in the indexed documents.";

/// Errors raised while answering a question.
#[derive(Debug, Error)]
pub enum QueryError {
    /// The question was empty or whitespace.
    #[error("Question must not be empty")]
    EmptyQuestion,
    /// Embedding the question failed.
    #[error(transparent)]
    Embedding(#[from] EmbeddingProviderError),
    /// Searching the index failed.
    #[error(transparent)]
    Index(#[from] IndexError),
    /// The chat model failed.
    #[error(transparent)]
    Llm(#[from] LlmProviderError),
}

/// A generated answer and the chunks it was grounded on.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    /// Model output, trimmed.
    pub text: String,
    /// Retrieved chunks passed as context, best first.
    pub sources: Vec<SearchHit>,
}

impl Answer {
    /// Whether any context was retrieved for the question.
    pub fn has_context(&self) -> bool {
        !self.sources.is_empty()
    }
}

/// Retrieves the chunks closest to a question and asks the chat model to answer from them.
#[derive(Clone)]
pub struct QueryComponent {
    chat: Arc<dyn ChatClient>,
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn EmbeddingClient>,
    prompt: PromptTemplate,
    top_k: usize,
}

impl QueryComponent {
    /// Component retrieving `top_k` chunks per question with the legal prompt.
    pub fn new(
        chat: Arc<dyn ChatClient>,
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn EmbeddingClient>,
        top_k: usize,
    ) -> Self {
        tracing::info!(
            model = chat.model(),
            vectors = index.len(),
            top_k,
            "Initializing QueryComponent"
        );
        Self {
            chat,
            index,
            embedder,
            prompt: PromptTemplate::legal(),
            top_k,
        }
    }

    /// Replace the prompt template.
    pub fn with_prompt(mut self, prompt: PromptTemplate) -> Self {
        self.prompt = prompt;
        self
    }

    /// Number of vectors available for retrieval.
    pub fn indexed_vectors(&self) -> usize {
        self.index.len()
    }

    /// Embed the question and return the closest chunks, best first.
    pub async fn retrieve_docs(&self, question: &str) -> Result<Vec<SearchHit>, QueryError> {
        let query = self.embedder.embed_one(question).await?;
        let hits = self.index.search(&query, self.top_k).await?;
        tracing::debug!(hits = hits.len(), top_k = self.top_k, "Retrieved context");
        Ok(hits)
    }

    /// Join hit texts with a blank line between them.
    pub fn build_context(hits: &[SearchHit]) -> String {
        hits.iter()
            .map(|hit| hit.payload.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Answer `question` from the indexed documents.
    pub async fn answer_query(&self, question: &str) -> Result<Answer, QueryError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(QueryError::EmptyQuestion);
        }

        tracing::info!(question, "Processing query");
        let hits = self.retrieve_docs(question).await?;
        if hits.is_empty() {
            tracing::warn!("No documents retrieved for question");
            return Ok(Answer {
                text: NO_CONTEXT_ANSWER.to_string(),
                sources: Vec::new(),
            });
        }

        let context = Self::build_context(&hits);
        let prompt = self.prompt.render(question, &context);
        let text = self.chat.complete(&prompt).await?;
        tracing::info!(sources = hits.len(), answer_chars = text.len(), "Answer generated");

        Ok(Answer {
            text: text.trim().to_string(),
            sources: hits,
        })
    }
}
