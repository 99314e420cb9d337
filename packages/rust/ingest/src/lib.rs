//! Ingestion and extraction collaborators.
//!
//! - [`ArxivClient`]: arXiv Atom feed queries.
//! - [`Downloader`]: size-limited document downloads.
//! - [`ExtractionChain`]: native text extraction with OCR fallback.
//!
//! [`ingest`] ties the first two together and writes `Ingested` records.

pub mod arxiv;
pub mod download;
pub mod extract;

use paperflow_shared::{IngestConfig, PaperMetadata, PaperRecord, PaperflowError, Result};
use paperflow_storage::RecordDir;
use tracing::{info, instrument, warn};

pub use arxiv::{ArxivClient, MAX_PAPERS_PER_REQUEST, parse_feed};
pub use download::{DownloadOutcome, Downloader};
pub use extract::{
    CommandExtractor, DocumentExtractor, Extraction, ExtractionChain, PlainTextExtractor,
    RawExtraction, count_pages,
};

/// Counts from one ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub found: usize,
    pub downloaded: usize,
    pub skipped_too_large: usize,
    pub download_errors: usize,
}

/// Query arXiv, download each document and write its metadata record.
///
/// Metadata is written even when the download fails or is skipped; such
/// records carry no `document_file` and fail extraction later.
#[instrument(skip_all, fields(category = %category, max_results = max_results))]
pub async fn ingest(
    config: &IngestConfig,
    category: &str,
    max_results: usize,
    out: &RecordDir,
) -> Result<IngestReport> {
    let client = ArxivClient::new(config)?;
    let downloader = Downloader::new(config.download_timeout_secs, config.max_file_size_mb)?;

    let papers = client.search(category, max_results).await?;
    let mut report = IngestReport {
        found: papers.len(),
        ..IngestReport::default()
    };

    for mut paper in papers {
        fetch_document(&downloader, &mut paper, out, &mut report).await?;
        out.write(&paper)?;
    }

    info!(
        found = report.found,
        downloaded = report.downloaded,
        skipped = report.skipped_too_large,
        errors = report.download_errors,
        "ingestion finished"
    );
    Ok(report)
}

async fn fetch_document(
    downloader: &Downloader,
    paper: &mut PaperMetadata,
    out: &RecordDir,
    report: &mut IngestReport,
) -> Result<()> {
    if paper.pdf_url.is_empty() {
        warn!(paper_id = %paper.paper_id, "no document link");
        report.download_errors += 1;
        return Ok(());
    }

    let file_name = format!("{}.pdf", paper.file_stem());
    std::fs::create_dir_all(out.path()).map_err(|e| PaperflowError::io(out.path(), e))?;

    match downloader.download(&paper.pdf_url, &out.file_path(&file_name)).await {
        Ok(DownloadOutcome::Saved { .. }) => {
            paper.document_file = Some(file_name);
            report.downloaded += 1;
        }
        Ok(DownloadOutcome::TooLarge { .. }) => report.skipped_too_large += 1,
        Err(e) => {
            warn!(paper_id = %paper.paper_id, error = %e, "download failed");
            report.download_errors += 1;
        }
    }
    Ok(())
}
