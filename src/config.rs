//! YAML-driven configuration for the pipeline.
//!
//! Two files describe a deployment: `config.yaml` carries locations, providers, and models, while
//! `params.yaml` carries tuning knobs (chunking and retrieval). Credentials never live in either
//! file directly; they are written as `"!secret KEY"` references and resolved against a third
//! YAML file by [`secrets::resolve_secret`] when a provider client is built.

pub mod secrets;

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;

pub use secrets::{SecretError, SecretResolver, resolve_secret};

const DEFAULT_CONFIG_PATH: &str = "config/config.yaml";
const DEFAULT_PARAMS_PATH: &str = "config/params.yaml";
const DEFAULT_SECRETS_PATH: &str = "config/secret.yaml";

/// Errors encountered while loading configuration files.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A configuration file could not be read.
    #[error("Failed to read {path}: {source}")]
    Io {
        /// File or directory that failed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// A configuration file was not valid YAML for the expected schema.
    #[error("Failed to parse {path}: {source}")]
    Parse {
        /// File that failed to parse.
        path: PathBuf,
        /// Underlying YAML error.
        #[source]
        source: serde_yaml::Error,
    },
    /// A value was present but violates a constraint.
    #[error("Invalid configuration value: {0}")]
    Invalid(String),
    /// [`init_config`] was called after the global configuration was installed.
    #[error("Configuration already initialized; refusing to load {}", .0.display())]
    AlreadyInitialized(PathBuf),
}

/// Locations of the configuration, parameter, and secret files.
#[derive(Debug, Clone)]
pub struct ConfigPaths {
    /// Main configuration file (`config.yaml`).
    pub config: PathBuf,
    /// Tuning parameters (`params.yaml`).
    pub params: PathBuf,
    /// Secrets referenced via `!secret KEY` (`secret.yaml`).
    pub secrets: PathBuf,
}

impl ConfigPaths {
    /// Resolve file locations from `RUSTY_COUNSEL_*` environment variables, after loading `.env`.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self {
            config: env_path("RUSTY_COUNSEL_CONFIG", DEFAULT_CONFIG_PATH),
            params: env_path("RUSTY_COUNSEL_PARAMS", DEFAULT_PARAMS_PATH),
            secrets: env_path("RUSTY_COUNSEL_SECRETS", DEFAULT_SECRETS_PATH),
        }
    }

    /// Standard file names inside a single directory.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            config: dir.join("config.yaml"),
            params: dir.join("params.yaml"),
            secrets: dir.join("secret.yaml"),
        }
    }
}

fn env_path(key: &str, default: &str) -> PathBuf {
    env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(default))
}

/// Where PDFs come from and where they are kept.
#[derive(Debug, Clone)]
pub struct DataConfig {
    /// Root directory for downloaded artifacts.
    pub root_dir: PathBuf,
    /// Directory holding the PDF corpus.
    pub pdf_directory: PathBuf,
    /// URLs the ingestion stage downloads from.
    pub source_urls: Vec<String>,
}

/// Unit used to measure chunk lengths.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LengthUnit {
    /// Unicode scalar values.
    #[default]
    Characters,
    /// `cl100k_base` tokens.
    Tokens,
}

/// Sliding-window chunking parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct ChunkingConfig {
    /// Maximum chunk length in [`LengthUnit`]s.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Length shared between consecutive chunks.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    /// Record each chunk's character offset within its page.
    #[serde(default = "default_true")]
    pub add_start_index: bool,
    /// Unit for `chunk_size` and `chunk_overlap`.
    #[serde(default)]
    pub length_unit: LengthUnit,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            add_start_index: true,
            length_unit: LengthUnit::Characters,
        }
    }
}

/// Supported embedding backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Hosted Gemini embeddings API.
    Gemini,
    /// Local Ollama runtime.
    Ollama,
    /// Deterministic hashed vectors, no network access.
    Hashing,
    /// In-process sentence-transformer model (requires the `local-embeddings` feature).
    Local,
}

/// Backing store for the vector index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorStoreKind {
    /// usearch index persisted to a local directory.
    #[serde(alias = "faiss", alias = "flat", alias = "usearch")]
    Local,
    /// Remote Qdrant collection.
    Qdrant,
}

/// How the local index ranks stored vectors against a query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// Squared Euclidean distance; smaller is better.
    #[default]
    #[serde(alias = "euclidean", alias = "l2sq")]
    L2,
    /// Cosine similarity; larger is better.
    Cosine,
}

/// Embedding model and vector store settings.
#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingConfig {
    /// Provider used to embed chunks and questions.
    pub provider: EmbeddingProvider,
    /// Model identifier passed to the provider.
    pub model: String,
    /// Expected vector dimensionality; inferred from the first embedding when absent.
    #[serde(default)]
    pub dimension: Option<usize>,
    /// Store implementation.
    #[serde(default = "default_vector_store")]
    pub vector_store: VectorStoreKind,
    /// Ranking metric of the local store; Qdrant collections always use cosine.
    #[serde(default)]
    pub distance: DistanceMetric,
    /// Directory the index (or its manifest) is persisted to.
    pub vector_store_path: PathBuf,
    /// API key or `!secret KEY` reference.
    #[serde(default, deserialize_with = "secrets::deserialize_reference")]
    pub api_key: Option<String>,
    /// Override for the provider base URL.
    #[serde(default)]
    pub base_url: Option<String>,
}

/// Supported chat-completion backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// Groq's OpenAI-compatible endpoint.
    Groq,
    /// OpenAI chat completions.
    #[serde(rename = "openai")]
    OpenAi,
    /// Local Ollama runtime.
    Ollama,
}

impl LlmProvider {
    /// Lowercase provider name used in logs and error messages.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Groq => "groq",
            Self::OpenAi => "openai",
            Self::Ollama => "ollama",
        }
    }
}

/// Chat model settings.
#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    /// Provider hosting the model.
    pub provider: LlmProvider,
    /// Model identifier.
    pub model: String,
    /// API key or `!secret KEY` reference.
    #[serde(default, deserialize_with = "secrets::deserialize_reference")]
    pub api_key: Option<String>,
    /// Override for the provider base URL.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

/// Qdrant connection settings, required when `vector_store: qdrant`.
#[derive(Debug, Clone, Deserialize)]
pub struct QdrantConfig {
    /// Base URL of the Qdrant instance.
    pub url: String,
    /// Collection holding the chunk vectors.
    pub collection: String,
    /// Optional API key or `!secret KEY` reference.
    #[serde(default, deserialize_with = "secrets::deserialize_reference")]
    pub api_key: Option<String>,
}

/// Retrieval parameters for the query stage.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RetrievalConfig {
    /// Number of chunks retrieved per question.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

/// HTTP surface settings.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct ServerConfig {
    /// Fixed port; the first free port in 4100-4199 is used when absent.
    #[serde(default)]
    pub port: Option<u16>,
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    data: DataSection,
    embeddings: EmbeddingConfig,
    #[serde(rename = "LLM", alias = "llm")]
    llm: LlmConfig,
    #[serde(default)]
    qdrant: Option<QdrantConfig>,
    #[serde(default)]
    server: ServerConfig,
}

#[derive(Debug, Deserialize)]
struct DataSection {
    root_dir: PathBuf,
    pdf_directory: PathBuf,
    #[serde(default, alias = "source_urls")]
    source_url: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ParamsFile {
    #[serde(default, rename = "chunkingparams")]
    chunking: ChunkingConfig,
    #[serde(default, rename = "retrievalparams")]
    retrieval: RetrievalConfig,
}

/// Parsed and validated configuration with accessors for each pipeline stage.
#[derive(Debug)]
pub struct ConfigurationManager {
    config: ConfigFile,
    params: ParamsFile,
    secrets: SecretResolver,
}

impl ConfigurationManager {
    /// Read and validate the configuration pair, creating the data root directory.
    pub fn new(paths: ConfigPaths) -> Result<Self, ConfigError> {
        let config: ConfigFile = read_yaml(&paths.config)?;
        let params: ParamsFile = read_yaml(&paths.params)?;
        let manager = Self {
            config,
            params,
            secrets: SecretResolver::new(paths.secrets),
        };
        manager.validate()?;
        create_directory(&manager.config.data.root_dir)?;
        tracing::debug!(
            config = %paths.config.display(),
            params = %paths.params.display(),
            embedding_provider = ?manager.config.embeddings.provider,
            vector_store = ?manager.config.embeddings.vector_store,
            llm_provider = manager.config.llm.provider.as_str(),
            "Loaded configuration"
        );
        Ok(manager)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let chunking = &self.params.chunking;
        if chunking.chunk_size == 0 {
            return Err(ConfigError::Invalid(
                "chunkingparams.chunk_size must be greater than zero".into(),
            ));
        }
        if chunking.chunk_overlap >= chunking.chunk_size {
            return Err(ConfigError::Invalid(format!(
                "chunkingparams.chunk_overlap ({}) must be smaller than chunk_size ({})",
                chunking.chunk_overlap, chunking.chunk_size
            )));
        }
        if self.params.retrieval.top_k == 0 {
            return Err(ConfigError::Invalid(
                "retrievalparams.top_k must be greater than zero".into(),
            ));
        }
        if self.config.embeddings.dimension == Some(0) {
            return Err(ConfigError::Invalid(
                "embeddings.dimension must be greater than zero".into(),
            ));
        }
        if self.config.embeddings.model.trim().is_empty() {
            return Err(ConfigError::Invalid("embeddings.model is empty".into()));
        }
        if self.config.llm.model.trim().is_empty() {
            return Err(ConfigError::Invalid("LLM.model is empty".into()));
        }
        if self.config.embeddings.vector_store == VectorStoreKind::Qdrant
            && self.config.qdrant.is_none()
        {
            return Err(ConfigError::Invalid(
                "vector_store is qdrant but no qdrant section is configured".into(),
            ));
        }
        Ok(())
    }

    /// Data locations; creates the PDF directory.
    pub fn data_config(&self) -> Result<DataConfig, ConfigError> {
        let data = &self.config.data;
        create_directory(&data.pdf_directory)?;
        Ok(DataConfig {
            root_dir: data.root_dir.clone(),
            pdf_directory: data.pdf_directory.clone(),
            source_urls: data.source_url.clone(),
        })
    }

    /// Chunking parameters from `params.yaml`.
    pub fn chunking_config(&self) -> ChunkingConfig {
        self.params.chunking.clone()
    }

    /// Embedding and vector store settings.
    pub fn embedding_config(&self) -> EmbeddingConfig {
        self.config.embeddings.clone()
    }

    /// Chat model settings.
    pub fn llm_config(&self) -> LlmConfig {
        self.config.llm.clone()
    }

    /// Retrieval parameters from `params.yaml`.
    pub fn retrieval_config(&self) -> RetrievalConfig {
        self.params.retrieval
    }

    /// Qdrant connection settings, if configured.
    pub fn qdrant_config(&self) -> Option<QdrantConfig> {
        self.config.qdrant.clone()
    }

    /// HTTP surface settings.
    pub fn server_config(&self) -> ServerConfig {
        self.config.server
    }

    /// Resolver for `!secret` references.
    pub fn secrets(&self) -> &SecretResolver {
        &self.secrets
    }
}

fn read_yaml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn create_directory(path: &Path) -> Result<(), ConfigError> {
    fs::create_dir_all(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::debug!(path = %path.display(), "Directory ensured");
    Ok(())
}

fn default_chunk_size() -> usize {
    1000
}

fn default_chunk_overlap() -> usize {
    200
}

fn default_true() -> bool {
    true
}

fn default_vector_store() -> VectorStoreKind {
    VectorStoreKind::Local
}

fn default_temperature() -> f32 {
    0.7
}

fn default_top_k() -> usize {
    4
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<ConfigurationManager> = OnceLock::new();

/// Load configuration from `paths` and install it in the global cache.
///
/// The cache is written once; a second call fails with [`ConfigError::AlreadyInitialized`] instead
/// of silently keeping the first configuration.
pub fn init_config(paths: ConfigPaths) -> Result<&'static ConfigurationManager, ConfigError> {
    install(&CONFIG, paths)
}

fn install(
    cell: &'static OnceLock<ConfigurationManager>,
    paths: ConfigPaths,
) -> Result<&'static ConfigurationManager, ConfigError> {
    if cell.get().is_some() {
        tracing::warn!(config = %paths.config.display(), "Configuration already initialized");
        return Err(ConfigError::AlreadyInitialized(paths.config));
    }
    let config_path = paths.config.clone();
    let manager = ConfigurationManager::new(paths)?;
    if cell.set(manager).is_err() {
        tracing::warn!(config = %config_path.display(), "Configuration already initialized");
        return Err(ConfigError::AlreadyInitialized(config_path));
    }
    cell.get().ok_or(ConfigError::AlreadyInitialized(config_path))
}
