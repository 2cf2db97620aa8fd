//! On-disk vector index backed by usearch.
//!
//! Vectors live in a usearch HNSW graph saved as `index.usearch`; chunk payloads and the mapping
//! from string ids to usearch keys live in an `index.json` sidecar next to it.

use super::{ChunkPayload, IndexError, SearchHit, VectorIndex, validate_vector};
use crate::config::DistanceMetric;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

const METADATA_FILE: &str = "index.json";
const VECTORS_FILE: &str = "index.usearch";
const FORMAT_VERSION: u32 = 2;

const CONNECTIVITY: usize = 16;
const EXPANSION_ADD: usize = 128;
const EXPANSION_SEARCH: usize = 64;
const MIN_CAPACITY: usize = 64;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Entry {
    id: String,
    payload: ChunkPayload,
}

#[derive(Serialize)]
struct Sidecar<'a> {
    version: u32,
    metric: DistanceMetric,
    dimension: Option<usize>,
    next_key: u64,
    entries: &'a BTreeMap<u64, Entry>,
}

#[derive(Deserialize)]
struct StoredSidecar {
    version: u32,
    metric: DistanceMetric,
    dimension: Option<usize>,
    next_key: u64,
    entries: BTreeMap<u64, Entry>,
}

fn metric_kind(metric: DistanceMetric) -> MetricKind {
    match metric {
        DistanceMetric::L2 => MetricKind::L2sq,
        DistanceMetric::Cosine => MetricKind::Cos,
    }
}

fn backend(action: &str, error: impl fmt::Display) -> IndexError {
    IndexError::Backend(format!("{action}: {error}"))
}

fn utf8_path(path: &Path) -> Result<&str, IndexError> {
    path.to_str().ok_or_else(|| {
        IndexError::Configuration(format!("index path {} is not valid UTF-8", path.display()))
    })
}

/// Approximate nearest-neighbour index persisted to a local directory.
///
/// `L2` ranks by squared Euclidean distance (ascending). `Cosine` reports `1 - distance` as the
/// score, so larger is better. The graph is created lazily on the first insert, once the
/// dimension is known.
pub struct LocalIndex {
    metric: DistanceMetric,
    dimension: Option<usize>,
    vectors: Option<Index>,
    entries: BTreeMap<u64, Entry>,
    keys: HashMap<String, u64>,
    next_key: u64,
}

impl fmt::Debug for LocalIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalIndex")
            .field("metric", &self.metric)
            .field("dimension", &self.dimension)
            .field("vectors", &self.entries.len())
            .finish()
    }
}

impl Default for LocalIndex {
    fn default() -> Self {
        Self::new(DistanceMetric::default())
    }
}

impl LocalIndex {
    /// Empty index ranking with `metric`.
    pub fn new(metric: DistanceMetric) -> Self {
        Self {
            metric,
            dimension: None,
            vectors: None,
            entries: BTreeMap::new(),
            keys: HashMap::new(),
            next_key: 0,
        }
    }

    /// Metric used for ranking.
    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    /// Sidecar file the index metadata is written to under `dir`.
    pub fn index_file(dir: &Path) -> PathBuf {
        dir.join(METADATA_FILE)
    }

    fn vectors_file(dir: &Path) -> PathBuf {
        dir.join(VECTORS_FILE)
    }

    fn create_graph(metric: DistanceMetric, dimension: usize) -> Result<Index, IndexError> {
        let options = IndexOptions {
            dimensions: dimension,
            metric: metric_kind(metric),
            quantization: ScalarKind::F32,
            connectivity: CONNECTIVITY,
            expansion_add: EXPANSION_ADD,
            expansion_search: EXPANSION_SEARCH,
            multi: false,
        };
        Index::new(&options).map_err(|error| backend("create usearch index", error))
    }

    /// Load an index previously written with [`VectorIndex::persist`].
    pub async fn load(dir: &Path) -> Result<Self, IndexError> {
        let path = Self::index_file(dir);
        match tokio::fs::try_exists(&path).await {
            Ok(true) => {}
            Ok(false) => return Err(IndexError::NotFound(path)),
            Err(source) => return Err(IndexError::Io { path, source }),
        }

        let data = tokio::fs::read(&path).await.map_err(|source| IndexError::Io {
            path: path.clone(),
            source,
        })?;
        let stored: StoredSidecar =
            serde_json::from_slice(&data).map_err(|source| IndexError::Serialization {
                path: path.clone(),
                source,
            })?;
        if stored.version != FORMAT_VERSION {
            return Err(IndexError::Configuration(format!(
                "unsupported index format version {} in {}",
                stored.version,
                path.display()
            )));
        }

        let vectors = match stored.dimension {
            Some(dimension) if !stored.entries.is_empty() => {
                let file = Self::vectors_file(dir);
                if !file.is_file() {
                    return Err(IndexError::NotFound(file));
                }
                let graph = Self::create_graph(stored.metric, dimension)?;
                graph
                    .load(utf8_path(&file)?)
                    .map_err(|error| backend("load usearch index", error))?;
                if graph.dimensions() != dimension {
                    return Err(IndexError::DimensionMismatch {
                        expected: dimension,
                        actual: graph.dimensions(),
                    });
                }
                if let Some(key) = stored.entries.keys().find(|key| !graph.contains(**key)) {
                    return Err(IndexError::Configuration(format!(
                        "key {key} listed in {} is missing from the vector file",
                        path.display()
                    )));
                }
                Some(graph)
            }
            _ => None,
        };

        let keys = stored
            .entries
            .iter()
            .map(|(key, entry)| (entry.id.clone(), *key))
            .collect();
        tracing::info!(
            path = %path.display(),
            vectors = stored.entries.len(),
            metric = ?stored.metric,
            "Loaded local index"
        );
        Ok(Self {
            metric: stored.metric,
            dimension: stored.dimension,
            vectors,
            entries: stored.entries,
            keys,
            next_key: stored.next_key,
        })
    }

    fn check_dimension(&self, actual: usize) -> Result<(), IndexError> {
        match self.dimension {
            Some(expected) if expected != actual => {
                Err(IndexError::DimensionMismatch { expected, actual })
            }
            _ => Ok(()),
        }
    }

    fn graph_for(&mut self, dimension: usize) -> Result<&Index, IndexError> {
        if self.vectors.is_none() {
            self.vectors = Some(Self::create_graph(self.metric, dimension)?);
            self.dimension = Some(dimension);
        }
        self.vectors
            .as_ref()
            .ok_or_else(|| IndexError::Backend("usearch index unavailable".into()))
    }

    fn score(&self, distance: f32) -> f32 {
        match self.metric {
            DistanceMetric::L2 => distance,
            DistanceMetric::Cosine => 1.0 - distance,
        }
    }
}

#[async_trait]
impl VectorIndex for LocalIndex {
    async fn insert(
        &mut self,
        id: String,
        vector: Vec<f32>,
        payload: ChunkPayload,
    ) -> Result<(), IndexError> {
        validate_vector(&vector)?;
        self.check_dimension(vector.len())?;

        let key = self.next_key;
        let previous = self.keys.get(&id).copied();
        let graph = self.graph_for(vector.len())?;
        if graph.size() + 1 > graph.capacity() {
            let capacity = (graph.capacity() * 2).max(MIN_CAPACITY);
            graph
                .reserve(capacity)
                .map_err(|error| backend("reserve usearch capacity", error))?;
        }
        if let Some(old) = previous {
            graph
                .remove(old)
                .map_err(|error| backend("remove replaced vector", error))?;
        }
        graph
            .add(key, vector.as_slice())
            .map_err(|error| backend("add vector", error))?;

        if let Some(old) = previous {
            self.entries.remove(&old);
        }
        self.next_key += 1;
        self.keys.insert(id.clone(), key);
        self.entries.insert(key, Entry { id, payload });
        Ok(())
    }

    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, IndexError> {
        let Some(graph) = self.vectors.as_ref() else {
            return Ok(Vec::new());
        };
        if k == 0 || self.entries.is_empty() {
            return Ok(Vec::new());
        }
        validate_vector(query)?;
        self.check_dimension(query.len())?;

        let matches = graph
            .search(query, k.min(self.entries.len()))
            .map_err(|error| backend("search", error))?;
        Ok(matches
            .keys
            .iter()
            .zip(&matches.distances)
            .filter_map(|(key, distance)| {
                self.entries.get(key).map(|entry| SearchHit {
                    id: entry.id.clone(),
                    score: self.score(*distance),
                    payload: entry.payload.clone(),
                })
            })
            .collect())
    }

    async fn persist(&self, dir: &Path) -> Result<(), IndexError> {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|source| IndexError::Io {
                path: dir.to_path_buf(),
                source,
            })?;

        if let Some(graph) = &self.vectors {
            let file = Self::vectors_file(dir);
            graph
                .save(utf8_path(&file)?)
                .map_err(|error| backend("save usearch index", error))?;
        }

        let path = Self::index_file(dir);
        let sidecar = Sidecar {
            version: FORMAT_VERSION,
            metric: self.metric,
            dimension: self.dimension,
            next_key: self.next_key,
            entries: &self.entries,
        };
        let data = serde_json::to_vec(&sidecar).map_err(|source| IndexError::Serialization {
            path: path.clone(),
            source,
        })?;
        tokio::fs::write(&path, data)
            .await
            .map_err(|source| IndexError::Io {
                path: path.clone(),
                source,
            })?;

        tracing::info!(path = %path.display(), vectors = self.entries.len(), "Persisted local index");
        Ok(())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn dimension(&self) -> Option<usize> {
        self.dimension
    }
}
