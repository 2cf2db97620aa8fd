//! Vector index lifecycle: insert embedded chunks, search by similarity, persist and reload.
//!
//! Two backends share the [`VectorIndex`] trait. [`LocalIndex`] is a usearch graph persisted next to
//! the corpus; [`QdrantIndex`] delegates storage and search to a Qdrant collection and only
//! persists a manifest locally.

pub mod builder;
pub mod local;
pub mod qdrant;

use crate::config::SecretError;
use crate::embedding::EmbeddingProviderError;
use crate::processing::TextChunk;
use crate::qdrant::QdrantError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub use builder::{IndexBuilder, open_existing};
pub use crate::config::DistanceMetric;
pub use local::LocalIndex;
pub use self::qdrant::QdrantIndex;

/// Errors raised while building, searching, or persisting an index.
#[derive(Debug, Error)]
pub enum IndexError {
    /// A vector's length differs from the index dimension.
    #[error("Vector dimension mismatch: index holds {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension fixed by the first inserted vector.
        expected: usize,
        /// Dimension of the offending vector.
        actual: usize,
    },
    /// The vector is empty or contains non-finite values.
    #[error("Invalid vector: {0}")]
    InvalidVector(String),
    /// No persisted index exists at the given location.
    #[error("No persisted index found at {}", .0.display())]
    NotFound(PathBuf),
    /// The manifest points at a Qdrant collection that no longer exists.
    #[error("Qdrant collection '{0}' does not exist")]
    MissingCollection(String),
    /// Filesystem failure while persisting or loading.
    #[error("Index I/O failed for {}: {source}", path.display())]
    Io {
        /// Path being read or written.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// Persisted data could not be encoded or decoded.
    #[error("Index file {} is not valid: {source}", path.display())]
    Serialization {
        /// Path being read or written.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },
    /// Index settings are unusable.
    #[error("Index misconfigured: {0}")]
    Configuration(String),
    /// The usearch backend rejected an operation.
    #[error("Vector index backend failed: {0}")]
    Backend(String),
    /// Qdrant request failed.
    #[error(transparent)]
    Qdrant(#[from] QdrantError),
    /// Embedding chunks failed.
    #[error(transparent)]
    Embedding(#[from] EmbeddingProviderError),
    /// Qdrant API key reference could not be resolved.
    #[error(transparent)]
    Secret(#[from] SecretError),
}

/// Chunk metadata stored with every vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkPayload {
    /// Chunk text forwarded to the model as context.
    pub text: String,
    /// Path of the PDF the chunk came from.
    pub source: String,
    /// Zero-based page number.
    pub page: usize,
    /// Character offset of the chunk within its page.
    #[serde(default)]
    pub start_index: Option<usize>,
    /// SHA-256 of the chunk text.
    pub chunk_hash: String,
}

impl From<&TextChunk> for ChunkPayload {
    fn from(chunk: &TextChunk) -> Self {
        Self {
            text: chunk.text.clone(),
            source: chunk.metadata.source.display().to_string(),
            page: chunk.metadata.page,
            start_index: chunk.metadata.start_index,
            chunk_hash: chunk.metadata.chunk_hash.clone(),
        }
    }
}

/// One vector queued for insertion.
#[derive(Debug, Clone)]
pub struct IndexRecord {
    /// Unique identifier of the vector.
    pub id: String,
    /// Embedding vector.
    pub vector: Vec<f32>,
    /// Metadata returned with search hits.
    pub payload: ChunkPayload,
}

/// A search result. Lower-is-better or higher-is-better depends on the index metric; hits are
/// always returned best first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    /// Identifier of the matched vector.
    pub id: String,
    /// Distance or similarity reported by the index.
    pub score: f32,
    /// Metadata stored with the vector.
    pub payload: ChunkPayload,
}

/// Similarity-searchable store of chunk vectors.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert (or replace) a single vector.
    async fn insert(
        &mut self,
        id: String,
        vector: Vec<f32>,
        payload: ChunkPayload,
    ) -> Result<(), IndexError>;

    /// Insert many vectors at once.
    async fn insert_batch(&mut self, records: Vec<IndexRecord>) -> Result<(), IndexError> {
        for record in records {
            self.insert(record.id, record.vector, record.payload).await?;
        }
        Ok(())
    }

    /// Return at most `k` hits ordered best first.
    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, IndexError>;

    /// Persist the index under `dir`.
    async fn persist(&self, dir: &Path) -> Result<(), IndexError>;

    /// Number of stored vectors.
    fn len(&self) -> usize;

    /// Whether the index holds no vectors.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dimension shared by all vectors, once known.
    fn dimension(&self) -> Option<usize>;
}

/// Reject empty vectors and vectors containing NaN or infinities.
pub(crate) fn validate_vector(vector: &[f32]) -> Result<(), IndexError> {
    if vector.is_empty() {
        return Err(IndexError::InvalidVector("vector is empty".into()));
    }
    if let Some(position) = vector.iter().position(|value| !value.is_finite()) {
        return Err(IndexError::InvalidVector(format!(
            "non-finite value at position {position}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::ChunkMetadata;

    #[test]
    fn payload_copies_chunk_metadata() {
        let chunk = TextChunk {
            text: "Article 5".into(),
            metadata: ChunkMetadata {
                source: "echr.pdf".into(),
                page: 3,
                start_index: Some(12),
                chunk_hash: "hash".into(),
            },
        };
        let payload = ChunkPayload::from(&chunk);
        assert_eq!(payload.text, "Article 5");
        assert_eq!(payload.source, "echr.pdf");
        assert_eq!(payload.page, 3);
        assert_eq!(payload.start_index, Some(12));
    }

    #[test]
    fn invalid_vectors_are_rejected() {
        assert!(validate_vector(&[]).is_err());
        assert!(validate_vector(&[0.1, f32::NAN]).is_err());
        assert!(validate_vector(&[f32::INFINITY]).is_err());
        assert!(validate_vector(&[0.1, -0.2]).is_ok());
    }
}
