//! Size-limited document downloads.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use paperflow_shared::{PaperflowError, Result};
use reqwest::Client;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// User-Agent string for document downloads.
const USER_AGENT: &str = concat!("Paperflow/", env!("CARGO_PKG_VERSION"));

/// What happened to a single download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    Saved { bytes: u64 },
    /// The document exceeded the size limit; nothing was kept on disk.
    TooLarge { limit: u64 },
}

/// Streams documents to disk, refusing those above `max_bytes`.
#[derive(Debug, Clone)]
pub struct Downloader {
    client: Client,
    max_bytes: u64,
}

impl Downloader {
    pub fn new(timeout_secs: u64, max_file_size_mb: u64) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| PaperflowError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            max_bytes: max_file_size_mb * 1024 * 1024,
        })
    }

    #[cfg(test)]
    fn with_limit(max_bytes: u64) -> Self {
        Self {
            client: Client::new(),
            max_bytes,
        }
    }

    /// Download `url` into `dest`.
    ///
    /// The declared content length is checked first; the streamed size is
    /// checked as chunks arrive. The body goes to a `.part` sibling that is
    /// renamed into place only once complete, so `dest` never holds a
    /// truncated document.
    pub async fn download(&self, url: &str, dest: &Path) -> Result<DownloadOutcome> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| PaperflowError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PaperflowError::Network(format!("{url}: HTTP {status}")));
        }

        if let Some(len) = response.content_length() {
            if len > self.max_bytes {
                warn!(%url, len, limit = self.max_bytes, "skipping oversized document");
                return Ok(DownloadOutcome::TooLarge {
                    limit: self.max_bytes,
                });
            }
        }

        let part = partial_path(dest);
        let streamed = self.stream_to(&mut response, url, &part).await;
        match streamed {
            Ok(Some(written)) => {
                tokio::fs::rename(&part, dest)
                    .await
                    .map_err(|e| PaperflowError::io(dest, e))?;
                debug!(%url, bytes = written, path = %dest.display(), "downloaded document");
                Ok(DownloadOutcome::Saved { bytes: written })
            }
            Ok(None) => {
                discard(&part).await;
                warn!(%url, limit = self.max_bytes, "document exceeded size limit while streaming");
                Ok(DownloadOutcome::TooLarge {
                    limit: self.max_bytes,
                })
            }
            Err(e) => {
                discard(&part).await;
                Err(e)
            }
        }
    }

    /// Stream the body into `path`. `None` when the size limit was hit.
    async fn stream_to(
        &self,
        response: &mut reqwest::Response,
        url: &str,
        path: &Path,
    ) -> Result<Option<u64>> {
        let mut file = tokio::fs::File::create(path)
            .await
            .map_err(|e| PaperflowError::io(path, e))?;
        let mut written: u64 = 0;

        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| PaperflowError::Network(format!("{url}: failed to read body: {e}")))?
        {
            written += chunk.len() as u64;
            if written > self.max_bytes {
                return Ok(None);
            }
            file.write_all(&chunk)
                .await
                .map_err(|e| PaperflowError::io(path, e))?;
        }

        file.flush().await.map_err(|e| PaperflowError::io(path, e))?;
        Ok(Some(written))
    }
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().map(OsString::from).unwrap_or_default();
    name.push(".part");
    dest.with_file_name(name)
}

async fn discard(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "failed to remove partial download");
        }
    }
}
