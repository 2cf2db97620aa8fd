//! Document processing: PDF loading and chunking.

pub mod chunking;
pub mod loader;
pub mod types;

pub use chunking::{Chunker, compute_chunk_hash};
pub use loader::DataLoader;
pub use types::{ChunkMetadata, ChunkingError, Document, DocumentMetadata, LoaderError, TextChunk};
