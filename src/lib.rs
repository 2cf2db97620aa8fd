#![deny(missing_docs)]

//! Core library for Rusty Counsel, a retrieval-augmented question answering pipeline over a
//! small corpus of legal PDFs.

/// HTTP routing and REST handlers.
pub mod api;
/// YAML configuration and secret resolution.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Vector index backends and the index builder.
pub mod index;
/// PDF downloads into the local corpus.
pub mod ingestion;
/// Structured logging and tracing setup.
pub mod logging;
/// Pipeline counters.
pub mod metrics;
/// Stage orchestration.
pub mod pipeline;
/// PDF loading and chunking.
pub mod processing;
/// Qdrant vector store integration.
pub mod qdrant;
/// Retrieval-augmented answering.
pub mod query;
