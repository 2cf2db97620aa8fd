//! Qdrant-backed index: vectors and payloads live in a remote collection, and a small manifest
//! on disk remembers which collection to reattach to.

use super::{ChunkPayload, IndexError, IndexRecord, SearchHit, VectorIndex, validate_vector};
use crate::config::QdrantConfig;
use crate::qdrant::{
    PointInsert, QdrantService,
    payload::{build_payload, current_timestamp_rfc3339, parse_payload},
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const MANIFEST_FILE: &str = "qdrant.json";

/// What gets written locally so a later run can reattach to the collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QdrantManifest {
    /// Base URL of the Qdrant instance.
    pub url: String,
    /// Collection holding the vectors.
    pub collection: String,
    /// Vector dimension of the collection.
    pub dimension: Option<usize>,
}

/// Index backed by a Qdrant collection using cosine similarity.
pub struct QdrantIndex {
    service: QdrantService,
    url: String,
    collection: String,
    dimension: Option<usize>,
    count: usize,
}

impl QdrantIndex {
    /// Connect to the configured instance without touching the collection.
    pub fn connect(config: &QdrantConfig, api_key: Option<String>) -> Result<Self, IndexError> {
        let service = QdrantService::new(&config.url, api_key)?;
        Ok(Self {
            service,
            url: config.url.clone(),
            collection: config.collection.clone(),
            dimension: None,
            count: 0,
        })
    }

    /// Drop any previous contents so a rebuild starts from an empty collection.
    pub async fn reset(&mut self) -> Result<(), IndexError> {
        tracing::info!(collection = %self.collection, "Dropping existing Qdrant collection");
        self.service.delete_collection(&self.collection).await?;
        self.dimension = None;
        self.count = 0;
        Ok(())
    }

    /// Reattach to the collection recorded by [`VectorIndex::persist`] under `dir`.
    pub async fn load(dir: &Path, api_key: Option<String>) -> Result<Self, IndexError> {
        let path = Self::manifest_file(dir);
        let data = match tokio::fs::read(&path).await {
            Ok(data) => data,
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => {
                return Err(IndexError::NotFound(path));
            }
            Err(source) => return Err(IndexError::Io { path, source }),
        };
        let manifest: QdrantManifest =
            serde_json::from_slice(&data).map_err(|source| IndexError::Serialization {
                path: path.clone(),
                source,
            })?;

        let service = QdrantService::new(&manifest.url, api_key)?;
        if !service.collection_exists(&manifest.collection).await? {
            return Err(IndexError::MissingCollection(manifest.collection));
        }
        let count = service.count_points(&manifest.collection).await?;
        tracing::info!(
            collection = %manifest.collection,
            vectors = count,
            "Attached to Qdrant collection"
        );

        Ok(Self {
            service,
            url: manifest.url,
            collection: manifest.collection,
            dimension: manifest.dimension,
            count,
        })
    }

    /// Manifest location under `dir`.
    pub fn manifest_file(dir: &Path) -> PathBuf {
        dir.join(MANIFEST_FILE)
    }

    /// Collection name.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    async fn ensure_collection(&mut self, dimension: usize) -> Result<(), IndexError> {
        match self.dimension {
            Some(expected) if expected != dimension => Err(IndexError::DimensionMismatch {
                expected,
                actual: dimension,
            }),
            Some(_) => Ok(()),
            None => {
                self.service
                    .create_collection_if_not_exists(&self.collection, dimension as u64)
                    .await?;
                self.service.ensure_payload_indexes(&self.collection).await?;
                self.dimension = Some(dimension);
                Ok(())
            }
        }
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn insert(
        &mut self,
        id: String,
        vector: Vec<f32>,
        payload: ChunkPayload,
    ) -> Result<(), IndexError> {
        self.insert_batch(vec![IndexRecord {
            id,
            vector,
            payload,
        }])
        .await
    }

    async fn insert_batch(&mut self, records: Vec<IndexRecord>) -> Result<(), IndexError> {
        let Some(first) = records.first() else {
            return Ok(());
        };
        let dimension = first.vector.len();
        for record in &records {
            validate_vector(&record.vector)?;
            if record.vector.len() != dimension {
                return Err(IndexError::DimensionMismatch {
                    expected: dimension,
                    actual: record.vector.len(),
                });
            }
        }
        self.ensure_collection(dimension).await?;

        let now = current_timestamp_rfc3339();
        let points: Vec<PointInsert> = records
            .into_iter()
            .map(|record| PointInsert {
                payload: build_payload(&record.payload, &now),
                id: record.id,
                vector: record.vector,
            })
            .collect();
        let summary = self.service.index_points(&self.collection, points).await?;
        self.count += summary.upserted;
        Ok(())
    }

    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, IndexError> {
        if k == 0 {
            return Ok(Vec::new());
        }
        validate_vector(query)?;
        if let Some(expected) = self.dimension
            && expected != query.len()
        {
            return Err(IndexError::DimensionMismatch {
                expected,
                actual: query.len(),
            });
        }

        let points = self
            .service
            .search_points(&self.collection, query.to_vec(), k)
            .await?;
        let hits = points
            .into_iter()
            .filter_map(|point| {
                let payload = point.payload.and_then(parse_payload);
                if payload.is_none() {
                    tracing::warn!(id = %point.id, "Skipping Qdrant point without chunk payload");
                }
                payload.map(|payload| SearchHit {
                    id: point.id,
                    score: point.score,
                    payload,
                })
            })
            .collect();
        Ok(hits)
    }

    async fn persist(&self, dir: &Path) -> Result<(), IndexError> {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|source| IndexError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        let path = Self::manifest_file(dir);
        let manifest = QdrantManifest {
            url: self.url.clone(),
            collection: self.collection.clone(),
            dimension: self.dimension,
        };
        let data =
            serde_json::to_vec_pretty(&manifest).map_err(|source| IndexError::Serialization {
                path: path.clone(),
                source,
            })?;
        tokio::fs::write(&path, data)
            .await
            .map_err(|source| IndexError::Io {
                path: path.clone(),
                source,
            })?;
        tracing::info!(path = %path.display(), collection = %self.collection, "Wrote Qdrant manifest");
        Ok(())
    }

    fn len(&self) -> usize {
        self.count
    }

    fn dimension(&self) -> Option<usize> {
        self.dimension
    }
}
