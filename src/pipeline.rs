//! Orchestrates the four stages: ingestion, loading and chunking, indexing, and query setup.

use crate::config::{
    ChunkingConfig, ConfigError, ConfigurationManager, DataConfig, EmbeddingConfig, LlmConfig,
    QdrantConfig, RetrievalConfig, SecretResolver,
};
use crate::embedding::{EmbeddingClient, EmbeddingProviderError, build_embedding_client};
use crate::index::{IndexBuilder, IndexError, VectorIndex};
use crate::ingestion::{DataIngestion, IngestionError, IngestionReport};
use crate::metrics::PipelineMetrics;
use crate::processing::{
    Chunker, ChunkingError, DataLoader, Document, LoaderError, TextChunk,
};
use crate::query::{ChatClient, LlmProviderError, QueryComponent, build_chat_client};
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;

/// Errors that abort a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Configuration could not be read.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The ingestion stage could not start.
    #[error(transparent)]
    Ingestion(#[from] IngestionError),
    /// The corpus directory could not be scanned.
    #[error(transparent)]
    Loader(#[from] LoaderError),
    /// The chunker could not be built.
    #[error(transparent)]
    Chunking(#[from] ChunkingError),
    /// Loading produced no documents.
    #[error("Stage 02 produced no documents; add PDFs to the corpus directory or run ingestion")]
    NoDocuments,
    /// Chunking produced no chunks.
    #[error("Stage 02 produced no text chunks")]
    NoChunks,
    /// Embedding client setup failed.
    #[error(transparent)]
    Embedding(#[from] EmbeddingProviderError),
    /// Building or loading the index failed.
    #[error(transparent)]
    Index(#[from] IndexError),
    /// Chat client setup failed.
    #[error(transparent)]
    Llm(#[from] LlmProviderError),
}

/// Settings for every stage, usually taken from a [`ConfigurationManager`].
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Corpus location and download sources.
    pub data: DataConfig,
    /// Chunk sizing.
    pub chunking: ChunkingConfig,
    /// Embedding model and vector store.
    pub embedding: EmbeddingConfig,
    /// Qdrant connection, when the Qdrant store is selected.
    pub qdrant: Option<QdrantConfig>,
    /// Chat model.
    pub llm: LlmConfig,
    /// Retrieval depth.
    pub retrieval: RetrievalConfig,
    /// Resolver for `!secret` references.
    pub secrets: SecretResolver,
}

impl PipelineSettings {
    /// Collect the settings of every stage.
    pub fn from_config(config: &ConfigurationManager) -> Result<Self, ConfigError> {
        Ok(Self {
            data: config.data_config()?,
            chunking: config.chunking_config(),
            embedding: config.embedding_config(),
            qdrant: config.qdrant_config(),
            llm: config.llm_config(),
            retrieval: config.retrieval_config(),
            secrets: config.secrets().clone(),
        })
    }
}

/// Which optional steps a run performs.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Download the configured PDFs first.
    pub ingest: bool,
    /// Use the persisted index when one exists instead of rebuilding.
    pub reuse_index: bool,
}

/// Result of a full run.
pub struct PipelineOutcome {
    /// Chunks in the index the query component searches.
    pub chunk_count: usize,
    /// Ready-to-use question answering component.
    pub query: QueryComponent,
}

/// Runs the stages in order with start/completion banners.
pub struct Pipeline {
    settings: PipelineSettings,
    metrics: Arc<PipelineMetrics>,
}

impl Pipeline {
    /// Pipeline over `settings` with fresh metrics.
    pub fn new(settings: PipelineSettings) -> Self {
        Self {
            settings,
            metrics: Arc::new(PipelineMetrics::new()),
        }
    }

    /// Pipeline over the settings held by `config`.
    pub fn from_config(config: &ConfigurationManager) -> Result<Self, PipelineError> {
        Ok(Self::new(PipelineSettings::from_config(config)?))
    }

    /// Shared counters updated by the pipeline.
    pub fn metrics(&self) -> Arc<PipelineMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Settings the pipeline was built with.
    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Stage 01: download the configured PDFs.
    pub async fn ingest(&self) -> Result<IngestionReport, PipelineError> {
        run_stage("Stage 01: Data Ingestion", self.download()).await
    }

    /// Stage 02: load the PDFs and chunk them.
    pub async fn load_and_chunk(&self) -> Result<(usize, Vec<TextChunk>), PipelineError> {
        run_stage("Stage 02: Text Loading & Chunking", self.load_documents()).await
    }

    /// Stage 02 without the loader, for callers that already hold documents.
    pub fn chunk(&self, documents: &[Document]) -> Result<Vec<TextChunk>, PipelineError> {
        if documents.is_empty() {
            tracing::warn!("No documents loaded; aborting pipeline");
            return Err(PipelineError::NoDocuments);
        }
        let chunker = Chunker::new(self.settings.chunking.clone())?;
        let chunks = chunker.split_documents(documents);
        if chunks.is_empty() {
            tracing::warn!("No text chunks created; aborting pipeline");
            return Err(PipelineError::NoChunks);
        }
        tracing::info!(
            documents = documents.len(),
            chunks = chunks.len(),
            "Chunks created"
        );
        Ok(chunks)
    }

    /// Stage 03: embed and persist, falling back to the persisted index if the build is empty.
    pub async fn build_index(
        &self,
        chunks: &[TextChunk],
        embedder: &dyn EmbeddingClient,
    ) -> Result<Arc<dyn VectorIndex>, PipelineError> {
        run_stage("Stage 03: Embedding Creation", self.embed_chunks(chunks, embedder)).await
    }

    /// Load the index persisted by an earlier run.
    pub async fn open_index(&self) -> Result<Arc<dyn VectorIndex>, PipelineError> {
        Ok(self.index_builder()?.open_existing().await?)
    }

    /// Embedding client for the configured provider.
    pub fn embedder(&self) -> Result<Arc<dyn EmbeddingClient>, PipelineError> {
        Ok(build_embedding_client(
            &self.settings.embedding,
            &self.settings.secrets,
        )?)
    }

    /// Chat client for the configured provider.
    pub fn chat_client(&self) -> Result<Arc<dyn ChatClient>, PipelineError> {
        Ok(build_chat_client(&self.settings.llm, &self.settings.secrets)?)
    }

    /// Stage 04: wire the chat model, index, and embedder together.
    pub fn query_component(
        &self,
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn EmbeddingClient>,
    ) -> Result<QueryComponent, PipelineError> {
        let chat = self.chat_client()?;
        Ok(QueryComponent::new(
            chat,
            index,
            embedder,
            self.settings.retrieval.top_k,
        ))
    }

    /// Query component over the persisted index, without re-indexing.
    ///
    /// The reopened index size is added to the `chunks_indexed` counter.
    pub async fn open_query(&self) -> Result<QueryComponent, PipelineError> {
        let embedder = self.embedder()?;
        let index = self.open_index().await?;
        self.metrics.record_indexing(0, index.len() as u64);
        self.query_component(index, embedder)
    }

    /// Run every stage and return a query component ready for questions.
    pub async fn run(&self, options: RunOptions) -> Result<PipelineOutcome, PipelineError> {
        if options.ingest {
            self.ingest().await?;
        } else {
            tracing::info!("Stage 01: Data Ingestion skipped");
        }

        let embedder = self.embedder()?;
        if options.reuse_index
            && let Some(outcome) = self.try_reuse(Arc::clone(&embedder)).await?
        {
            return Ok(outcome);
        }

        let (document_count, chunks) = self.load_and_chunk().await?;
        self.index_and_query(document_count, &chunks, embedder)
            .await
    }

    /// Stages 02 (chunking only) through 04 over documents supplied by the caller.
    pub async fn run_with_documents(
        &self,
        documents: Vec<Document>,
    ) -> Result<PipelineOutcome, PipelineError> {
        let embedder = self.embedder()?;
        let chunks = run_stage("Stage 02: Text Chunking", async { self.chunk(&documents) }).await?;
        self.index_and_query(documents.len(), &chunks, embedder)
            .await
    }

    async fn index_and_query(
        &self,
        document_count: usize,
        chunks: &[TextChunk],
        embedder: Arc<dyn EmbeddingClient>,
    ) -> Result<PipelineOutcome, PipelineError> {
        let index = self.build_index(chunks, embedder.as_ref()).await?;
        self.metrics
            .record_indexing(document_count as u64, index.len() as u64);
        let chunk_count = index.len();
        let query = run_stage("Stage 04: Query Pipeline", async {
            self.query_component(index, embedder)
        })
        .await?;
        Ok(PipelineOutcome { chunk_count, query })
    }

    async fn download(&self) -> Result<IngestionReport, PipelineError> {
        let ingestion = DataIngestion::new(self.settings.data.clone())?;
        let report = ingestion.download_pdfs().await;
        tracing::info!(
            downloaded = report.downloaded.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "Ingestion finished"
        );
        Ok(report)
    }

    async fn load_documents(&self) -> Result<(usize, Vec<TextChunk>), PipelineError> {
        let documents = DataLoader::new(&self.settings.data).load_pdfs().await?;
        let chunks = self.chunk(&documents)?;
        Ok((documents.len(), chunks))
    }

    async fn embed_chunks(
        &self,
        chunks: &[TextChunk],
        embedder: &dyn EmbeddingClient,
    ) -> Result<Arc<dyn VectorIndex>, PipelineError> {
        let builder = self.index_builder()?;
        let index = builder.build(chunks, embedder).await?;
        if !index.is_empty() {
            return Ok(index);
        }
        tracing::warn!("Index build produced no vectors; loading persisted index");
        Ok(builder.open_existing().await?)
    }

    async fn try_reuse(
        &self,
        embedder: Arc<dyn EmbeddingClient>,
    ) -> Result<Option<PipelineOutcome>, PipelineError> {
        match self.open_index().await {
            Ok(index) if !index.is_empty() => {
                tracing::info!(vectors = index.len(), "Reusing persisted index; skipping stages 02 and 03");
                let chunk_count = index.len();
                self.metrics.record_indexing(0, chunk_count as u64);
                let query = run_stage("Stage 04: Query Pipeline", async {
                    self.query_component(index, embedder)
                })
                .await?;
                Ok(Some(PipelineOutcome { chunk_count, query }))
            }
            Ok(_) => {
                tracing::info!("Persisted index is empty; rebuilding");
                Ok(None)
            }
            Err(PipelineError::Index(IndexError::NotFound(path))) => {
                tracing::info!(path = %path.display(), "No persisted index; rebuilding");
                Ok(None)
            }
            Err(error) => {
                tracing::warn!(error = %error, "Persisted index unusable; rebuilding");
                Ok(None)
            }
        }
    }

    fn index_builder(&self) -> Result<IndexBuilder, PipelineError> {
        Ok(IndexBuilder::from_config(
            &self.settings.embedding,
            self.settings.qdrant.as_ref(),
            &self.settings.secrets,
        )?)
    }
}

async fn run_stage<T, F>(name: &'static str, stage: F) -> Result<T, PipelineError>
where
    F: Future<Output = Result<T, PipelineError>>,
{
    tracing::info!(stage = name, "===== {name} (start) =====");
    match stage.await {
        Ok(value) => {
            tracing::info!(stage = name, "===== {name} (completed) =====");
            Ok(value)
        }
        Err(error) => {
            tracing::error!(stage = name, error = %error, "Stage failed");
            Err(error)
        }
    }
}
