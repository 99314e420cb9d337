//! The concrete pipeline stages and the directory-to-directory runner.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{error, info, instrument};

use paperflow_ingest::ExtractionChain;
use paperflow_shared::{
    EnrichedPaper, ExtractedPaper, PaperMetadata, PaperflowError, ProcessingStatus,
    QualityThresholds, Result, ValidatedPaper,
};
use paperflow_storage::RecordDir;

use crate::enrichment::EnrichmentOrchestrator;
use crate::pipeline::{BatchReport, ProgressReporter, Stage, StageOutcome, run_stage};

// ---------------------------------------------------------------------------
// Extract
// ---------------------------------------------------------------------------

/// `Ingested -> Extracted`. Reads the downloaded document next to the
/// metadata record.
pub struct ExtractStage {
    chain: ExtractionChain,
    documents: RecordDir,
}

impl ExtractStage {
    pub fn new(chain: ExtractionChain, documents: RecordDir) -> Self {
        Self { chain, documents }
    }
}

#[async_trait]
impl Stage for ExtractStage {
    type Input = PaperMetadata;
    type Output = ExtractedPaper;

    fn name(&self) -> &'static str {
        "extract"
    }
    fn input_status(&self) -> ProcessingStatus {
        ProcessingStatus::Ingested
    }
    fn output_status(&self) -> ProcessingStatus {
        ProcessingStatus::Extracted
    }

    async fn apply(&self, paper: &PaperMetadata) -> Result<(ExtractedPaper, StageOutcome)> {
        let Some(file) = paper.document_file.as_deref() else {
            return Err(PaperflowError::Extraction(format!(
                "no document downloaded for {}",
                paper.paper_id
            )));
        };

        let path = self.documents.file_path(file);
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| PaperflowError::io(&path, e))?;
        let extraction = self.chain.extract(&bytes).await?;

        let extracted = ExtractedPaper {
            paper_id: paper.paper_id.clone(),
            title: paper.title.clone(),
            authors: paper.authors.clone(),
            abstract_text: paper.abstract_text.clone(),
            char_count: extraction.text.chars().count(),
            raw_text: extraction.text,
            extraction_method: extraction.method,
            page_count: extraction.page_count,
            alphabetic_ratio: extraction.alphabetic_ratio,
            extracted_at: Utc::now(),
        };
        Ok((extracted, StageOutcome::Advanced))
    }
}

// ---------------------------------------------------------------------------
// Validate
// ---------------------------------------------------------------------------

/// `Extracted -> Validated | Failed`.
pub struct ValidateStage {
    thresholds: QualityThresholds,
}

impl ValidateStage {
    pub fn new(thresholds: QualityThresholds) -> Self {
        Self { thresholds }
    }
}

#[async_trait]
impl Stage for ValidateStage {
    type Input = ExtractedPaper;
    type Output = ValidatedPaper;

    fn name(&self) -> &'static str {
        "validate"
    }
    fn input_status(&self) -> ProcessingStatus {
        ProcessingStatus::Extracted
    }
    fn output_status(&self) -> ProcessingStatus {
        ProcessingStatus::Validated
    }

    async fn apply(&self, paper: &ExtractedPaper) -> Result<(ValidatedPaper, StageOutcome)> {
        let validation = paperflow_quality::validate(&paper.raw_text, &self.thresholds);

        let (status, outcome) = if validation.result.is_valid {
            (ProcessingStatus::Validated, StageOutcome::Advanced)
        } else {
            (
                ProcessingStatus::Failed,
                StageOutcome::Terminated(validation.result.errors.join("; ")),
            )
        };

        let validated = ValidatedPaper {
            paper_id: paper.paper_id.clone(),
            title: paper.title.clone(),
            authors: paper.authors.clone(),
            abstract_text: paper.abstract_text.clone(),
            clean_text: validation.clean_text,
            validation: validation.result,
            validated_at: Utc::now(),
            status,
        };
        Ok((validated, outcome))
    }
}

// ---------------------------------------------------------------------------
// Enrich
// ---------------------------------------------------------------------------

/// `Validated -> Enriched`.
pub struct EnrichStage {
    orchestrator: Arc<EnrichmentOrchestrator>,
}

impl EnrichStage {
    pub fn new(orchestrator: Arc<EnrichmentOrchestrator>) -> Self {
        Self { orchestrator }
    }
}

#[async_trait]
impl Stage for EnrichStage {
    type Input = ValidatedPaper;
    type Output = EnrichedPaper;

    fn name(&self) -> &'static str {
        "enrich"
    }
    fn input_status(&self) -> ProcessingStatus {
        ProcessingStatus::Validated
    }
    fn output_status(&self) -> ProcessingStatus {
        ProcessingStatus::Enriched
    }

    async fn apply(&self, paper: &ValidatedPaper) -> Result<(EnrichedPaper, StageOutcome)> {
        let enriched = self.orchestrator.enrich(paper).await?;
        Ok((enriched, StageOutcome::Advanced))
    }
}

// ---------------------------------------------------------------------------
// Directory runner
// ---------------------------------------------------------------------------

/// Load every record from `input`, run the batch, and persist each produced
/// record (advanced or terminated) into `output`.
///
/// A record that cannot be written is reported as errored.
#[instrument(skip_all, fields(stage = stage.name(), input = %input.path().display()))]
pub async fn run_dir_stage<S>(
    stage: Arc<S>,
    input: &RecordDir,
    output: &RecordDir,
    concurrency: usize,
    progress: &dyn ProgressReporter,
) -> Result<BatchReport<S::Output>>
where
    S: Stage,
    S::Input: DeserializeOwned,
    S::Output: Serialize,
{
    let loaded = input.load_all::<S::Input>()?;
    info!(
        records = loaded.records.len(),
        unreadable = loaded.failures.len(),
        "loaded stage input"
    );

    let mut report = run_stage(stage, loaded.records, concurrency, progress).await;

    let mut write_errors = Vec::new();
    for (index, (paper_id, outcome)) in report.items.iter().enumerate() {
        if let Some(record) = outcome.record() {
            if let Err(e) = output.write(record) {
                error!(%paper_id, error = %e, "failed to persist record");
                write_errors.push((index, e.to_string()));
            }
        }
    }
    for (index, message) in write_errors {
        report.mark_errored(index, message);
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrichment::tests::{FakeEmbedder, FakeSummarizer, validated};
    use crate::pipeline::{ItemOutcome, SilentProgress};
    use paperflow_ingest::PlainTextExtractor;
    use paperflow_shared::{ExtractionMethod, PaperRecord};

    fn metadata(id: &str, document_file: Option<&str>) -> PaperMetadata {
        PaperMetadata {
            paper_id: id.into(),
            title: format!("Paper {id}"),
            authors: vec!["A. Author".into()],
            abstract_text: None,
            categories: vec!["cs.AI".into()],
            pdf_url: String::new(),
            published: None,
            source: "arxiv".into(),
            document_file: document_file.map(str::to_string),
            ingested_at: Utc::now(),
        }
    }

    fn extracted(id: &str, text: &str) -> ExtractedPaper {
        ExtractedPaper {
            paper_id: id.into(),
            title: format!("Paper {id}"),
            authors: Vec::new(),
            abstract_text: None,
            raw_text: text.into(),
            extraction_method: ExtractionMethod::Native,
            page_count: 1,
            char_count: text.chars().count(),
            alphabetic_ratio: paperflow_quality::alphabetic_ratio(text),
            extracted_at: Utc::now(),
        }
    }

    fn good_text() -> String {
        "The quick brown fox jumps over the lazy dog near the river bank. ".repeat(20)
    }

    #[tokio::test]
    async fn extract_reads_document_next_to_metadata() {
        let tmp = tempfile::tempdir().unwrap();
        let raw = RecordDir::create(tmp.path().join("raw")).unwrap();
        let out = RecordDir::new(tmp.path().join("extracted"));
        std::fs::write(raw.file_path("doc.txt"), "page one\u{000C}page two").unwrap();
        raw.write(&metadata("1", Some("doc.txt"))).unwrap();
        raw.write(&metadata("2", None)).unwrap();

        let chain = ExtractionChain::new(Arc::new(PlainTextExtractor), None, 0.3);
        let stage = Arc::new(ExtractStage::new(chain, raw.clone()));
        let report = run_dir_stage(stage, &raw, &out, 2, &SilentProgress)
            .await
            .unwrap();

        assert_eq!(report.summary.advanced, 1);
        assert_eq!(report.summary.errored, 1);
        match &report.items[1].1 {
            ItemOutcome::Errored(msg) => assert!(msg.contains("no document downloaded for 2")),
            other => panic!("unexpected {}", other.label()),
        }

        let loaded = out.load_all::<ExtractedPaper>().unwrap();
        assert_eq!(loaded.records.len(), 1);
        let paper = &loaded.records[0];
        assert_eq!(paper.page_count, 2);
        assert_eq!(paper.char_count, "page one\u{000C}page two".chars().count());
        assert_eq!(paper.extraction_method, ExtractionMethod::Native);
    }

    #[tokio::test]
    async fn validate_persists_both_outcomes() {
        let tmp = tempfile::tempdir().unwrap();
        let input = RecordDir::create(tmp.path().join("extracted")).unwrap();
        let out = RecordDir::new(tmp.path().join("validated"));
        input.write(&extracted("good", &good_text())).unwrap();
        input.write(&extracted("short", "Too short.")).unwrap();

        let stage = Arc::new(ValidateStage::new(QualityThresholds::default()));
        let report = run_dir_stage(stage, &input, &out, 4, &SilentProgress)
            .await
            .unwrap();

        assert_eq!(report.summary.advanced, 1);
        assert_eq!(report.summary.failed, 1);
        assert_eq!(report.summary.errored, 0);

        let loaded = out.load_all::<ValidatedPaper>().unwrap();
        let statuses: Vec<_> = loaded
            .records
            .iter()
            .map(|p| (p.paper_id.as_str(), p.status))
            .collect();
        assert_eq!(
            statuses,
            vec![
                ("good", ProcessingStatus::Validated),
                ("short", ProcessingStatus::Failed),
            ]
        );
        let failed = &loaded.records[1];
        assert!(!failed.validation.is_valid);
        assert!(failed.validation.errors.iter().any(|e| e.starts_with("min_length")));
        // Failed papers keep the raw text.
        assert_eq!(failed.clean_text, "Too short.");
    }

    #[tokio::test]
    async fn validation_reason_lists_errors() {
        let stage = ValidateStage::new(QualityThresholds::default());
        let (paper, outcome) = stage.apply(&extracted("x", "")).await.unwrap();
        assert_eq!(paper.status, ProcessingStatus::Failed);
        match outcome {
            StageOutcome::Terminated(reason) => {
                assert!(reason.contains("min_length"));
                assert!(reason.contains("alphabetic_ratio"));
            }
            StageOutcome::Advanced => panic!("empty text must not advance"),
        }
    }

    #[tokio::test]
    async fn enrich_skips_failed_records() {
        let tmp = tempfile::tempdir().unwrap();
        let input = RecordDir::create(tmp.path().join("validated")).unwrap();
        let out = RecordDir::new(tmp.path().join("enriched"));
        input.write(&validated("ok", "clean text")).unwrap();
        let mut failed = validated("bad", "garbage");
        failed.status = ProcessingStatus::Failed;
        input.write(&failed).unwrap();

        let orchestrator = Arc::new(EnrichmentOrchestrator::new(
            Arc::new(FakeSummarizer::default()),
            Arc::new(FakeEmbedder::new(3)),
            100,
        ));
        let stage = Arc::new(EnrichStage::new(orchestrator));
        let report = run_dir_stage(stage, &input, &out, 2, &SilentProgress)
            .await
            .unwrap();

        assert_eq!(report.summary.advanced, 1);
        assert_eq!(report.summary.skipped, 1);

        let loaded = out.load_all::<EnrichedPaper>().unwrap();
        assert_eq!(loaded.records.len(), 1);
        assert_eq!(loaded.records[0].status(), ProcessingStatus::Enriched);
    }

    #[tokio::test]
    async fn unwritable_output_turns_into_errors() {
        let tmp = tempfile::tempdir().unwrap();
        let input = RecordDir::create(tmp.path().join("extracted")).unwrap();
        input.write(&extracted("good", &good_text())).unwrap();
        // A regular file where the output directory should be.
        let blocker = tmp.path().join("validated");
        std::fs::write(&blocker, "not a dir").unwrap();

        let stage = Arc::new(ValidateStage::new(QualityThresholds::default()));
        let report = run_dir_stage(stage, &input, &RecordDir::new(blocker), 1, &SilentProgress)
            .await
            .unwrap();
        assert_eq!(report.summary.advanced, 0);
        assert_eq!(report.summary.errored, 1);
    }
}
