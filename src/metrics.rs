//! Process-wide counters for indexing and question answering, served by `GET /metrics`.

use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing pipeline activity.
#[derive(Default)]
pub struct PipelineMetrics {
    documents_loaded: AtomicU64,
    chunks_indexed: AtomicU64,
    questions_answered: AtomicU64,
    questions_without_context: AtomicU64,
}

impl PipelineMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the documents and chunks produced by an indexing run.
    pub fn record_indexing(&self, document_count: u64, chunk_count: u64) {
        self.documents_loaded
            .fetch_add(document_count, Ordering::Relaxed);
        self.chunks_indexed.fetch_add(chunk_count, Ordering::Relaxed);
    }

    /// Record an answered question; `with_context` is false when retrieval found nothing.
    pub fn record_question(&self, with_context: bool) {
        self.questions_answered.fetch_add(1, Ordering::Relaxed);
        if !with_context {
            self.questions_without_context
                .fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_loaded: self.documents_loaded.load(Ordering::Relaxed),
            chunks_indexed: self.chunks_indexed.load(Ordering::Relaxed),
            questions_answered: self.questions_answered.load(Ordering::Relaxed),
            questions_without_context: self.questions_without_context.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of pipeline counters used for reporting.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct MetricsSnapshot {
    /// PDF pages loaded as documents since startup.
    pub documents_loaded: u64,
    /// Chunks embedded into a fresh index or found in a reopened one.
    pub chunks_indexed: u64,
    /// Questions answered, including those answered without context.
    pub questions_answered: u64,
    /// Questions for which retrieval returned no chunks.
    pub questions_without_context: u64,
}
