//! Stage 01: download the PDF corpus.
//!
//! Each configured URL is fetched into the PDF directory under the last segment of its path.
//! Files that already exist are left alone, which makes re-running the stage cheap. A failing URL
//! is logged and reported but never stops the remaining downloads.

use crate::config::DataConfig;
use reqwest::Client;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors that prevent the ingestion stage from starting.
#[derive(Debug, Error)]
pub enum IngestionError {
    /// The PDF directory could not be created.
    #[error("Failed to create PDF directory {path}: {source}")]
    Directory {
        /// Directory path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The HTTP client could not be built.
    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// A URL that could not be downloaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedDownload {
    /// Source URL.
    pub url: String,
    /// Human-readable failure reason.
    pub reason: String,
}

/// Outcome of a download run.
#[derive(Debug, Clone, Default)]
pub struct IngestionReport {
    /// Files written during this run.
    pub downloaded: Vec<PathBuf>,
    /// Files that already existed and were skipped.
    pub skipped: Vec<PathBuf>,
    /// URLs that failed.
    pub failed: Vec<FailedDownload>,
}

/// Downloads configured PDFs into the local corpus directory.
pub struct DataIngestion {
    config: DataConfig,
    http: Client,
}

impl DataIngestion {
    /// Prepare the PDF directory and HTTP client.
    pub fn new(config: DataConfig) -> Result<Self, IngestionError> {
        std::fs::create_dir_all(&config.pdf_directory).map_err(|source| {
            IngestionError::Directory {
                path: config.pdf_directory.clone(),
                source,
            }
        })?;
        let http = Client::builder()
            .user_agent("rusty-counsel/ingest")
            .timeout(DOWNLOAD_TIMEOUT)
            .build()?;
        Ok(Self { config, http })
    }

    /// Download every configured URL that is not already present on disk.
    pub async fn download_pdfs(&self) -> IngestionReport {
        let mut report = IngestionReport::default();

        for url in &self.config.source_urls {
            let Some(file_name) = file_name_from_url(url) else {
                tracing::error!(url, "FAILED to download: URL has no file name");
                report.failed.push(FailedDownload {
                    url: url.clone(),
                    reason: "URL has no file name".into(),
                });
                continue;
            };

            let save_path = self.config.pdf_directory.join(&file_name);
            if save_path.exists() {
                tracing::info!(path = %save_path.display(), "Already downloaded. Skipping");
                report.skipped.push(save_path);
                continue;
            }

            match self.fetch(url).await {
                Ok(bytes) => match tokio::fs::write(&save_path, &bytes).await {
                    Ok(()) => {
                        tracing::info!(
                            url,
                            path = %save_path.display(),
                            bytes = bytes.len(),
                            "Successfully downloaded"
                        );
                        report.downloaded.push(save_path);
                    }
                    Err(error) => {
                        tracing::error!(url, path = %save_path.display(), error = %error, "FAILED to save download");
                        report.failed.push(FailedDownload {
                            url: url.clone(),
                            reason: error.to_string(),
                        });
                    }
                },
                Err(reason) => {
                    tracing::error!(url, error = %reason, "FAILED to download");
                    report.failed.push(FailedDownload {
                        url: url.clone(),
                        reason,
                    });
                }
            }
        }

        tracing::info!(
            downloaded = report.downloaded.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "Data ingestion finished"
        );
        report
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, String> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|error| error.to_string())?;
        let status = response.status();
        if !status.is_success() {
            return Err(format!("HTTP {status}"));
        }
        response
            .bytes()
            .await
            .map(|bytes| bytes.to_vec())
            .map_err(|error| error.to_string())
    }
}

/// Derive the local file name from the last path segment, dropping any query string.
pub(crate) fn file_name_from_url(url: &str) -> Option<String> {
    let without_fragment = url.split('#').next().unwrap_or(url);
    let without_query = without_fragment.split('?').next().unwrap_or(without_fragment);
    let name = without_query.rsplit('/').next()?.trim();
    if name.is_empty() || name.contains(':') {
        None
    } else {
        Some(name.to_string())
    }
}
