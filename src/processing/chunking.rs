//! Fixed-size, overlapping chunk windows.
//!
//! Each page is first cut into separator-aware segments with `semchunk-rs`, sized so that a
//! segment plus the configured overlap still fits the chunk budget. Every segment after the first
//! is then widened to the left into its predecessor by up to `chunk_overlap` length units, so a
//! sentence straddling a boundary stays visible to retrieval from both sides.
//!
//! Chunks are slices of the page text whenever the segment can be located in it, which keeps
//! `start_index` exact. Lengths are measured in characters by default, or in `cl100k_base`
//! tokens through `tiktoken-rs`.

use crate::config::{ChunkingConfig, LengthUnit};
use semchunk_rs::Chunker as SemanticSplitter;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tiktoken_rs::cl100k_base;

use super::types::{ChunkMetadata, ChunkingError, Document, TextChunk};

type LengthCounter = Arc<dyn Fn(&str) -> usize + Send + Sync>;

/// A chunk of page text and its byte offset in the page, when locatable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Window {
    pub(crate) text: String,
    pub(crate) byte_start: Option<usize>,
}

/// Splits documents into overlapping windows according to [`ChunkingConfig`].
pub struct Chunker {
    config: ChunkingConfig,
    counter: LengthCounter,
}

impl Chunker {
    /// Build a chunker, loading the tokenizer when lengths are measured in tokens.
    pub fn new(config: ChunkingConfig) -> Result<Self, ChunkingError> {
        if config.chunk_size == 0 {
            return Err(ChunkingError::InvalidChunkSize);
        }
        let counter = match config.length_unit {
            LengthUnit::Characters => character_counter(),
            LengthUnit::Tokens => build_tiktoken_counter()?,
        };
        Ok(Self { config, counter })
    }

    /// Split every document, preserving document order.
    pub fn split_documents(&self, documents: &[Document]) -> Vec<TextChunk> {
        let mut chunks = Vec::new();
        for document in documents {
            let text = &document.page_content;
            for window in self.split_text(text) {
                let start_index = if self.config.add_start_index {
                    window
                        .byte_start
                        .map(|byte| text[..byte].chars().count())
                } else {
                    None
                };
                let chunk_hash = compute_chunk_hash(&window.text);
                chunks.push(TextChunk {
                    text: window.text,
                    metadata: ChunkMetadata {
                        source: document.metadata.source.clone(),
                        page: document.metadata.page,
                        start_index,
                        chunk_hash,
                    },
                });
            }
        }
        tracing::debug!(
            documents = documents.len(),
            chunks = chunks.len(),
            chunk_size = self.config.chunk_size,
            chunk_overlap = self.config.chunk_overlap,
            "Documents split"
        );
        chunks
    }

    /// Split a single text into overlapping windows.
    ///
    /// Returns an empty vector when the input is all whitespace.
    pub(crate) fn split_text(&self, text: &str) -> Vec<Window> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let chunk_size = self.config.chunk_size;
        let overlap = self
            .config
            .chunk_overlap
            .min(chunk_size.saturating_sub(1));
        let segment_budget = chunk_size - overlap;

        let counter_for_splitter = self.counter.clone();
        let splitter = SemanticSplitter::new(
            segment_budget,
            Box::new(move |segment: &str| counter_for_splitter.as_ref()(segment)),
        );
        let segments = splitter.chunk(text);

        let mut windows = Vec::with_capacity(segments.len());
        let mut cursor = 0;
        let mut previous_start: Option<usize> = None;

        for segment in segments {
            if segment.trim().is_empty() {
                continue;
            }
            match text[cursor..].find(segment.as_str()) {
                Some(offset) => {
                    let start = cursor + offset;
                    let end = start + segment.len();
                    let window_start = match previous_start {
                        Some(floor) => self.overlap_start(text, floor, start, end, overlap),
                        None => start,
                    };
                    windows.push(Window {
                        text: text[window_start..end].to_string(),
                        byte_start: Some(window_start),
                    });
                    previous_start = Some(start);
                    cursor = end;
                }
                None => {
                    tracing::trace!(
                        segment_len = segment.len(),
                        "Segment not found verbatim in source; emitting without overlap"
                    );
                    windows.push(Window {
                        text: segment,
                        byte_start: None,
                    });
                    previous_start = None;
                }
            }
        }

        windows
    }

    /// Earliest byte offset in `[floor, start]` that keeps both the overlap and the whole window
    /// within budget. Leading whitespace of the overlap is dropped.
    fn overlap_start(&self, text: &str, floor: usize, start: usize, end: usize, overlap: usize) -> usize {
        if overlap == 0 {
            return start;
        }
        let count = self.counter.as_ref();
        let mut best = start;
        for (offset, _) in text[floor..start].char_indices().rev() {
            let candidate = floor + offset;
            if count(&text[candidate..start]) > overlap
                || count(&text[candidate..end]) > self.config.chunk_size
            {
                break;
            }
            best = candidate;
        }
        let tail = &text[best..start];
        best + (tail.len() - tail.trim_start().len())
    }
}

/// Compute a deterministic SHA-256 hash for the chunk text.
pub fn compute_chunk_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

fn character_counter() -> LengthCounter {
    Arc::new(|segment: &str| segment.chars().count())
}

fn build_tiktoken_counter() -> Result<LengthCounter, ChunkingError> {
    let encoding = cl100k_base().map_err(|source| ChunkingError::Tokenizer {
        encoding: "cl100k_base".to_string(),
        source,
    })?;
    let encoding = Arc::new(encoding);
    Ok(Arc::new(move |segment: &str| {
        encoding.encode_ordinary(segment).len()
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::types::DocumentMetadata;
    use std::path::PathBuf;

    const PARAGRAPH: &str = "Everyone has the right to life, liberty and security of person. \
No one shall be held in slavery or servitude. \
No one shall be subjected to torture or to cruel, inhuman or degrading treatment or punishment. \
Everyone has the right to recognition everywhere as a person before the law.";

    fn chunker(chunk_size: usize, chunk_overlap: usize) -> Chunker {
        Chunker::new(ChunkingConfig {
            chunk_size,
            chunk_overlap,
            add_start_index: true,
            length_unit: LengthUnit::Characters,
        })
        .expect("chunker")
    }

    fn page(text: &str) -> Document {
        Document {
            page_content: text.to_string(),
            metadata: DocumentMetadata {
                source: PathBuf::from("udhr.pdf"),
                page: 3,
                total_pages: 8,
            },
        }
    }

    #[test]
    fn rejects_zero_chunk_size() {
        let result = Chunker::new(ChunkingConfig {
            chunk_size: 0,
            ..ChunkingConfig::default()
        });
        assert!(matches!(result, Err(ChunkingError::InvalidChunkSize)));
    }

    #[test]
    fn whitespace_input_yields_no_chunks() {
        assert!(chunker(50, 10).split_text("   \n\t ").is_empty());
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        let windows = chunker(1000, 200).split_text("Article 1.");
        assert_eq!(
            windows,
            vec![Window {
                text: "Article 1.".into(),
                byte_start: Some(0),
            }]
        );
    }

    #[test]
    fn windows_respect_budget_and_cover_text_without_overlap() {
        let windows = chunker(60, 0).split_text(PARAGRAPH);
        assert!(windows.len() > 1);
        for window in &windows {
            assert!(window.text.chars().count() <= 60, "{:?}", window.text);
        }
        let words: Vec<&str> = windows
            .iter()
            .flat_map(|window| window.text.split_whitespace())
            .collect();
        let original: Vec<&str> = PARAGRAPH.split_whitespace().collect();
        assert_eq!(words, original);
    }

    #[test]
    fn consecutive_windows_overlap_and_are_page_slices() {
        let windows = chunker(80, 20).split_text(PARAGRAPH);
        assert!(windows.len() > 1);
        for window in &windows {
            assert!(window.text.chars().count() <= 80);
            let start = window.byte_start.expect("locatable window");
            assert_eq!(&PARAGRAPH[start..start + window.text.len()], window.text);
        }
        let overlapping = windows.windows(2).any(|pair| {
            let previous_end = pair[0].byte_start.unwrap() + pair[0].text.len();
            pair[1].byte_start.unwrap() < previous_end
        });
        assert!(overlapping, "expected at least one overlapping pair");
    }

    #[test]
    fn split_documents_records_metadata_and_start_index() {
        let text = format!("Preamble.\n\n{PARAGRAPH}");
        let chunks = chunker(80, 20).split_documents(&[page(&text)]);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert_eq!(chunk.metadata.page, 3);
            assert_eq!(chunk.metadata.source, PathBuf::from("udhr.pdf"));
            assert_eq!(chunk.metadata.chunk_hash, compute_chunk_hash(&chunk.text));
            let start = chunk.metadata.start_index.expect("start index");
            let located: String = text.chars().skip(start).take(chunk.text.chars().count()).collect();
            assert_eq!(located, chunk.text);
        }
        assert_eq!(chunks[0].metadata.start_index, Some(0));
    }

    #[test]
    fn start_index_omitted_when_disabled() {
        let chunker = Chunker::new(ChunkingConfig {
            chunk_size: 80,
            chunk_overlap: 20,
            add_start_index: false,
            length_unit: LengthUnit::Characters,
        })
        .expect("chunker");
        let chunks = chunker.split_documents(&[page(PARAGRAPH)]);
        assert!(chunks.iter().all(|chunk| chunk.metadata.start_index.is_none()));
    }

    #[test]
    fn token_budget_is_respected() {
        let chunker = Chunker::new(ChunkingConfig {
            chunk_size: 16,
            chunk_overlap: 4,
            add_start_index: true,
            length_unit: LengthUnit::Tokens,
        })
        .expect("chunker");
        let encoding = cl100k_base().expect("encoding");
        let windows = chunker.split_text(PARAGRAPH);
        assert!(windows.len() > 1);
        for window in &windows {
            assert!(encoding.encode_ordinary(&window.text).len() <= 16);
        }
    }

    #[test]
    fn chunk_hash_is_stable() {
        let first = compute_chunk_hash("Article 1");
        assert_eq!(first, compute_chunk_hash("Article 1"));
        assert_ne!(first, compute_chunk_hash("Article 2"));
        assert_eq!(first.len(), 64);
    }
}
