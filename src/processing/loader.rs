//! Stage 02a: read the PDF corpus into page documents.

use crate::config::DataConfig;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::types::{Document, DocumentMetadata, LoaderError};

/// Loads every PDF in the corpus directory, one [`Document`] per page.
pub struct DataLoader {
    pdf_dir: PathBuf,
}

impl DataLoader {
    /// Loader for the configured PDF directory.
    pub fn new(config: &DataConfig) -> Self {
        Self {
            pdf_dir: config.pdf_directory.clone(),
        }
    }

    /// Extract text from every `*.pdf` file (non-recursive, sorted by path).
    ///
    /// A file that fails to parse is logged and skipped so one corrupt download does not block
    /// the rest of the corpus.
    pub async fn load_pdfs(&self) -> Result<Vec<Document>, LoaderError> {
        let files = self.pdf_files()?;
        let mut documents = Vec::new();

        for pdf_file in files {
            match extract_pages(&pdf_file).await {
                Ok(pages) => {
                    tracing::info!(file = %pdf_file.display(), pages = pages.len(), "Successfully loaded");
                    documents.extend(pages);
                }
                Err(error) => {
                    tracing::error!(file = %pdf_file.display(), error = %error, "Error loading file");
                }
            }
        }

        Ok(documents)
    }

    fn pdf_files(&self) -> Result<Vec<PathBuf>, LoaderError> {
        let mut files = Vec::new();
        for entry in WalkDir::new(&self.pdf_dir).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|error| LoaderError::Directory {
                path: self.pdf_dir.clone(),
                message: error.to_string(),
            })?;
            if entry.file_type().is_file() && has_pdf_extension(entry.path()) {
                files.push(entry.into_path());
            }
        }
        files.sort();
        tracing::debug!(directory = %self.pdf_dir.display(), files = files.len(), "Discovered PDF files");
        Ok(files)
    }
}

fn has_pdf_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false)
}

async fn extract_pages(path: &Path) -> Result<Vec<Document>, String> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|error| format!("failed to read file: {error}"))?;
    let pages =
        tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem_by_pages(&bytes))
            .await
            .map_err(|error| format!("extraction task failed: {error}"))?
            .map_err(|error| format!("PDF extraction error: {error}"))?;
    Ok(page_documents(path, pages))
}

/// Number extracted pages from zero and drop the blank ones.
pub(crate) fn page_documents(source: &Path, pages: Vec<String>) -> Vec<Document> {
    let total_pages = pages.len();
    pages
        .into_iter()
        .enumerate()
        .filter(|(_, content)| !content.trim().is_empty())
        .map(|(page, content)| Document {
            page_content: content.trim().to_string(),
            metadata: DocumentMetadata {
                source: source.to_path_buf(),
                page,
                total_pages,
            },
        })
        .collect()
}
