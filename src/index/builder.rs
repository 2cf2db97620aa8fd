//! Turns chunks into a persisted index of the configured kind.
//!
//! Building is embed-then-write: every chunk is embedded before the target store is touched, so
//! an empty corpus or an embedding failure never wipes an index that is already on disk or in
//! Qdrant.

use super::{ChunkPayload, IndexError, IndexRecord, LocalIndex, QdrantIndex, VectorIndex};
use crate::config::{DistanceMetric, EmbeddingConfig, QdrantConfig, SecretResolver, VectorStoreKind};
use crate::embedding::EmbeddingClient;
use crate::processing::TextChunk;
use crate::qdrant::payload::generate_point_id;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const EMBED_BATCH_SIZE: usize = 100;

enum Store {
    Local(DistanceMetric),
    Qdrant {
        config: QdrantConfig,
        api_key: Option<String>,
    },
}

/// Embeds chunks into a fresh index of the configured kind and persists it.
pub struct IndexBuilder {
    store: Store,
    path: PathBuf,
    batch_size: usize,
}

impl IndexBuilder {
    /// Derive the store settings from configuration, resolving the Qdrant key if one is set.
    pub fn from_config(
        embedding: &EmbeddingConfig,
        qdrant: Option<&QdrantConfig>,
        secrets: &SecretResolver,
    ) -> Result<Self, IndexError> {
        let store = match embedding.vector_store {
            VectorStoreKind::Local => Store::Local(embedding.distance),
            VectorStoreKind::Qdrant => {
                let config = qdrant.cloned().ok_or_else(|| {
                    IndexError::Configuration(
                        "vector_store is 'qdrant' but no qdrant section is configured".into(),
                    )
                })?;
                let api_key = secrets.resolve_optional(config.api_key.as_deref())?;
                Store::Qdrant { config, api_key }
            }
        };
        Ok(Self {
            store,
            path: embedding.vector_store_path.clone(),
            batch_size: EMBED_BATCH_SIZE,
        })
    }

    /// Local usearch index persisted at `path`, ranked by squared L2 distance.
    pub fn local(path: impl Into<PathBuf>) -> Self {
        Self {
            store: Store::Local(DistanceMetric::L2),
            path: path.into(),
            batch_size: EMBED_BATCH_SIZE,
        }
    }

    /// Rank a local index with `metric`. Qdrant stores are unaffected.
    pub fn with_metric(mut self, metric: DistanceMetric) -> Self {
        if let Store::Local(current) = &mut self.store {
            *current = metric;
        }
        self
    }

    /// Override how many chunk texts are sent to the embedder per request.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Where the index (or its manifest) is persisted.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Embed every chunk, insert it under a fresh UUID, and persist the result.
    ///
    /// An empty chunk list yields an empty, unpersisted index so an existing store on disk is
    /// left intact. The store is only cleared once every chunk has been embedded.
    pub async fn build(
        &self,
        chunks: &[TextChunk],
        embedder: &dyn EmbeddingClient,
    ) -> Result<Arc<dyn VectorIndex>, IndexError> {
        if chunks.is_empty() {
            tracing::warn!("No chunks to index; skipping persistence");
            return Ok(Arc::from(self.detached_index()?));
        }

        let records = self.embed_chunks(chunks, embedder).await?;
        let mut index = self.empty_index().await?;
        let mut pending = records.into_iter().peekable();
        while pending.peek().is_some() {
            let batch: Vec<IndexRecord> = pending.by_ref().take(self.batch_size).collect();
            index.insert_batch(batch).await?;
        }

        index.persist(&self.path).await?;
        tracing::info!(
            vectors = index.len(),
            path = %self.path.display(),
            "Vector index built"
        );
        Ok(Arc::from(index))
    }

    async fn embed_chunks(
        &self,
        chunks: &[TextChunk],
        embedder: &dyn EmbeddingClient,
    ) -> Result<Vec<IndexRecord>, IndexError> {
        tracing::info!(
            chunks = chunks.len(),
            model = embedder.model(),
            batch_size = self.batch_size,
            "Embedding chunks"
        );
        let mut records = Vec::with_capacity(chunks.len());
        for (batch_number, batch) in chunks.chunks(self.batch_size).enumerate() {
            let texts: Vec<String> = batch.iter().map(|chunk| chunk.text.clone()).collect();
            let vectors = embedder.embed_batch(texts).await?;
            if vectors.len() != batch.len() {
                return Err(IndexError::Configuration(format!(
                    "embedder returned {} vectors for {} chunks",
                    vectors.len(),
                    batch.len()
                )));
            }
            records.extend(batch.iter().zip(vectors).map(|(chunk, vector)| IndexRecord {
                id: generate_point_id(),
                vector,
                payload: ChunkPayload::from(chunk),
            }));
            tracing::debug!(batch = batch_number + 1, embedded = records.len(), "Batch embedded");
        }
        Ok(records)
    }

    /// Load the index previously persisted at the configured path.
    pub async fn open_existing(&self) -> Result<Arc<dyn VectorIndex>, IndexError> {
        let index: Arc<dyn VectorIndex> = match &self.store {
            Store::Local(_) => Arc::new(LocalIndex::load(&self.path).await?),
            Store::Qdrant { api_key, .. } => {
                Arc::new(QdrantIndex::load(&self.path, api_key.clone()).await?)
            }
        };
        Ok(index)
    }

    /// A store handle that has not touched any persisted state.
    fn detached_index(&self) -> Result<Box<dyn VectorIndex>, IndexError> {
        Ok(match &self.store {
            Store::Local(metric) => Box::new(LocalIndex::new(*metric)),
            Store::Qdrant { config, api_key } => {
                Box::new(QdrantIndex::connect(config, api_key.clone())?)
            }
        })
    }

    /// A store handle emptied of earlier contents, ready for a rebuild.
    async fn empty_index(&self) -> Result<Box<dyn VectorIndex>, IndexError> {
        Ok(match &self.store {
            Store::Local(_) => self.detached_index()?,
            Store::Qdrant { config, api_key } => {
                let mut index = QdrantIndex::connect(config, api_key.clone())?;
                index.reset().await?;
                Box::new(index)
            }
        })
    }
}

/// Load the persisted index for the configured vector store.
pub async fn open_existing(
    embedding: &EmbeddingConfig,
    qdrant: Option<&QdrantConfig>,
    secrets: &SecretResolver,
) -> Result<Arc<dyn VectorIndex>, IndexError> {
    IndexBuilder::from_config(embedding, qdrant, secrets)?
        .open_existing()
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmbeddingProvider;
    use crate::embedding::{HashingEmbeddingClient, OllamaEmbeddingClient};
    use crate::processing::ChunkMetadata;
    use httpmock::{
        Method::{DELETE, GET, POST},
        MockServer,
    };
    use serde_json::json;

    fn qdrant_builder(server: &MockServer, dir: &Path) -> IndexBuilder {
        IndexBuilder {
            store: Store::Qdrant {
                config: QdrantConfig {
                    url: server.base_url(),
                    collection: "legal".into(),
                    api_key: None,
                },
                api_key: None,
            },
            path: dir.to_path_buf(),
            batch_size: EMBED_BATCH_SIZE,
        }
    }

    async fn existing_collection(server: &MockServer, dir: &Path) {
        server
            .mock_async(|when, then| {
                when.method(GET).path("/collections/legal");
                then.status(200).json_body(json!({ "result": {} }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/collections/legal/points/count");
                then.status(200).json_body(json!({ "result": { "count": 5 } }));
            })
            .await;
        let config = QdrantConfig {
            url: server.base_url(),
            collection: "legal".into(),
            api_key: None,
        };
        QdrantIndex::connect(&config, None)
            .unwrap()
            .persist(dir)
            .await
            .unwrap();
    }

    fn chunk(text: &str, page: usize) -> TextChunk {
        TextChunk {
            text: text.into(),
            metadata: ChunkMetadata {
                source: "data/pdfs/udhr.pdf".into(),
                page,
                start_index: Some(0),
                chunk_hash: crate::processing::compute_chunk_hash(text),
            },
        }
    }

    #[tokio::test]
    async fn build_embeds_in_batches_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let embedder = HashingEmbeddingClient::new("hash", 32).unwrap();
        let chunks = vec![
            chunk("Everyone has the right to life, liberty and security of person.", 0),
            chunk("No one shall be subjected to torture.", 1),
            chunk("All are equal before the law.", 2),
        ];

        let builder = IndexBuilder::local(dir.path()).with_batch_size(2);
        let index = builder.build(&chunks, &embedder).await.unwrap();
        assert_eq!(index.len(), 3);
        assert_eq!(index.dimension(), Some(32));

        let query = embedder
            .embed_one("No one shall be subjected to torture.")
            .await
            .unwrap();
        let hits = index.search(&query, 1).await.unwrap();
        assert_eq!(hits[0].payload.page, 1);

        let reopened = builder.open_existing().await.unwrap();
        assert_eq!(reopened.len(), 3);
    }

    #[tokio::test]
    async fn empty_build_leaves_existing_store_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let embedder = HashingEmbeddingClient::new("hash", 8).unwrap();
        let builder = IndexBuilder::local(dir.path());
        builder
            .build(&[chunk("Article 1", 0)], &embedder)
            .await
            .unwrap();

        let empty = builder.build(&[], &embedder).await.unwrap();
        assert!(empty.is_empty());
        assert_eq!(builder.open_existing().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn empty_build_keeps_qdrant_collection() {
        let server = MockServer::start_async().await;
        let dir = tempfile::tempdir().unwrap();
        existing_collection(&server, dir.path()).await;
        let delete = server
            .mock_async(|when, then| {
                when.method(DELETE).path("/collections/legal");
                then.status(200).json_body(json!({ "result": true }));
            })
            .await;

        let builder = qdrant_builder(&server, dir.path());
        let embedder = HashingEmbeddingClient::new("hash", 8).unwrap();
        let empty = builder.build(&[], &embedder).await.unwrap();

        assert!(empty.is_empty());
        assert_eq!(delete.hits_async().await, 0);
        assert_eq!(builder.open_existing().await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn failed_embedding_keeps_qdrant_collection() {
        let server = MockServer::start_async().await;
        let dir = tempfile::tempdir().unwrap();
        existing_collection(&server, dir.path()).await;
        let delete = server
            .mock_async(|when, then| {
                when.method(DELETE).path("/collections/legal");
                then.status(200).json_body(json!({ "result": true }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/embed");
                then.status(500).body("model not loaded");
            })
            .await;

        let builder = qdrant_builder(&server, dir.path());
        let embedder = OllamaEmbeddingClient::new("nomic-embed-text", Some(server.base_url()))
            .unwrap();
        let result = builder.build(&[chunk("Article 1", 0)], &embedder).await;

        assert!(matches!(result, Err(IndexError::Embedding(_))));
        assert_eq!(delete.hits_async().await, 0);
        assert_eq!(builder.open_existing().await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn local_builder_honours_cosine_metric() {
        let dir = tempfile::tempdir().unwrap();
        let embedder = HashingEmbeddingClient::new("hash", 16).unwrap();
        let builder = IndexBuilder::local(dir.path()).with_metric(DistanceMetric::Cosine);
        let index = builder
            .build(&[chunk("Everyone has the right to education.", 0)], &embedder)
            .await
            .unwrap();

        let query = embedder
            .embed_one("Everyone has the right to education.")
            .await
            .unwrap();
        let hits = index.search(&query, 1).await.unwrap();
        assert!((hits[0].score - 1.0).abs() < 1e-4);

        let reopened = LocalIndex::load(dir.path()).await.unwrap();
        assert_eq!(reopened.metric(), DistanceMetric::Cosine);
    }

    #[test]
    fn qdrant_store_requires_section() {
        let config = EmbeddingConfig {
            provider: EmbeddingProvider::Hashing,
            model: "hash".into(),
            dimension: Some(8),
            vector_store: VectorStoreKind::Qdrant,
            distance: DistanceMetric::L2,
            vector_store_path: PathBuf::from("vectorstore"),
            api_key: None,
            base_url: None,
        };
        let secrets = SecretResolver::new("unused.yaml");
        assert!(matches!(
            IndexBuilder::from_config(&config, None, &secrets),
            Err(IndexError::Configuration(_))
        ));
    }
}
