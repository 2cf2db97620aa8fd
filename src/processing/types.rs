//! Core data types and error definitions for loading and chunking.

use anyhow::Error as TokenizerError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Errors produced while turning documents into chunks.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// Chunking was configured with an impossible budget.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
    /// Tokenizer resources were unavailable.
    #[error("failed to initialize tokenizer '{encoding}': {source}")]
    Tokenizer {
        /// Encoding we attempted to load.
        encoding: String,
        /// Underlying error raised by the tokenizer library.
        #[source]
        source: TokenizerError,
    },
}

/// Errors that stop the loader from scanning the corpus directory.
#[derive(Debug, Error)]
pub enum LoaderError {
    /// The PDF directory is missing or unreadable.
    #[error("Failed to read PDF directory {path}: {message}")]
    Directory {
        /// Directory path.
        path: PathBuf,
        /// Diagnostic from the directory walk.
        message: String,
    },
}

/// Where a page of text came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// PDF file the page belongs to.
    pub source: PathBuf,
    /// Zero-based page number.
    pub page: usize,
    /// Number of pages in the source file.
    pub total_pages: usize,
}

/// One page of extracted PDF text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Extracted page text.
    pub page_content: String,
    /// Provenance of the page.
    pub metadata: DocumentMetadata,
}

/// Provenance and identity of a chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// PDF file the chunk was cut from.
    pub source: PathBuf,
    /// Zero-based page number.
    pub page: usize,
    /// Character offset of the chunk within its page, when recorded and locatable.
    pub start_index: Option<usize>,
    /// SHA-256 hex digest of the chunk text.
    pub chunk_hash: String,
}

/// A window of document text, the unit of embedding and retrieval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    /// Chunk text.
    pub text: String,
    /// Chunk provenance.
    pub metadata: ChunkMetadata,
}
