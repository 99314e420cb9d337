//! Data contracts shared by every pipeline stage and the search service.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Maximum length of a derived record file stem.
const MAX_STEM_LEN: usize = 200;

// ---------------------------------------------------------------------------
// ProcessingStatus
// ---------------------------------------------------------------------------

/// Lifecycle state of a paper record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Ingested,
    Extracted,
    Validated,
    Enriched,
    Failed,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ingested => "ingested",
            Self::Extracted => "extracted",
            Self::Validated => "validated",
            Self::Enriched => "enriched",
            Self::Failed => "failed",
        }
    }

    /// Whether a stage may move a record from `self` to `next`.
    ///
    /// Progression is strictly forward one step at a time; `Failed` is
    /// reachable only from `Extracted` or `Validated` and is absorbing.
    pub fn can_transition_to(self, next: ProcessingStatus) -> bool {
        use ProcessingStatus::*;
        matches!(
            (self, next),
            (Ingested, Extracted)
                | (Extracted, Validated)
                | (Validated, Enriched)
                | (Extracted, Failed)
                | (Validated, Failed)
        )
    }
}

impl std::fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the text of a document was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMethod {
    Native,
    Ocr,
}

impl std::fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Native => f.write_str("native"),
            Self::Ocr => f.write_str("ocr"),
        }
    }
}

// ---------------------------------------------------------------------------
// PaperRecord
// ---------------------------------------------------------------------------

/// Common view over the per-stage record types.
pub trait PaperRecord {
    fn paper_id(&self) -> &str;
    fn title(&self) -> &str;
    fn status(&self) -> ProcessingStatus;

    /// File stem used when persisting the record. Stable across stages.
    fn file_stem(&self) -> String {
        record_stem(self.title(), self.paper_id())
    }
}

/// Derive a filesystem-safe stem from a title, falling back to the id.
pub fn record_stem(title: &str, paper_id: &str) -> String {
    let from_title = safe_filename(title);
    if !from_title.is_empty() {
        return from_title;
    }
    let from_id = safe_filename(paper_id);
    if from_id.is_empty() {
        "paper".to_string()
    } else {
        from_id
    }
}

/// Strip punctuation, join words with underscores and cap the length.
pub fn safe_filename(name: &str) -> String {
    static UNSAFE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"[^\w\s-]").expect("valid regex"));
    static SPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

    let stripped = UNSAFE_RE.replace_all(name, "");
    let joined = SPACE_RE.replace_all(&stripped, "_");
    joined
        .trim_matches('_')
        .chars()
        .take(MAX_STEM_LEN)
        .collect()
}

fn utc_now() -> DateTime<Utc> {
    Utc::now()
}

fn default_source() -> String {
    "arxiv".into()
}

// ---------------------------------------------------------------------------
// Stage records
// ---------------------------------------------------------------------------

/// A paper discovered at a source, before any text has been extracted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperMetadata {
    pub paper_id: String,
    pub title: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(rename = "abstract", default, skip_serializing_if = "Option::is_none")]
    pub abstract_text: Option<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub pdf_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<String>,
    #[serde(default = "default_source")]
    pub source: String,
    /// Name of the downloaded document, relative to the record's directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_file: Option<String>,
    #[serde(default = "utc_now")]
    pub ingested_at: DateTime<Utc>,
}

impl PaperRecord for PaperMetadata {
    fn paper_id(&self) -> &str {
        &self.paper_id
    }
    fn title(&self) -> &str {
        &self.title
    }
    fn status(&self) -> ProcessingStatus {
        ProcessingStatus::Ingested
    }
}

/// Raw text pulled out of an ingested document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedPaper {
    pub paper_id: String,
    pub title: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(rename = "abstract", default, skip_serializing_if = "Option::is_none")]
    pub abstract_text: Option<String>,
    pub raw_text: String,
    pub extraction_method: ExtractionMethod,
    pub page_count: usize,
    pub char_count: usize,
    pub alphabetic_ratio: f64,
    #[serde(default = "utc_now")]
    pub extracted_at: DateTime<Utc>,
}

impl PaperRecord for ExtractedPaper {
    fn paper_id(&self) -> &str {
        &self.paper_id
    }
    fn title(&self) -> &str {
        &self.title
    }
    fn status(&self) -> ProcessingStatus {
        ProcessingStatus::Extracted
    }
}

/// Outcome of the quality checks run on extracted text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    /// Every check is recorded, passing or not.
    pub checks: BTreeMap<String, bool>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub errors: Vec<String>,
}

/// A record that went through the quality gate, passing or failing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatedPaper {
    pub paper_id: String,
    pub title: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(rename = "abstract", default, skip_serializing_if = "Option::is_none")]
    pub abstract_text: Option<String>,
    pub clean_text: String,
    pub validation: ValidationResult,
    #[serde(default = "utc_now")]
    pub validated_at: DateTime<Utc>,
    pub status: ProcessingStatus,
}

impl PaperRecord for ValidatedPaper {
    fn paper_id(&self) -> &str {
        &self.paper_id
    }
    fn title(&self) -> &str {
        &self.title
    }
    fn status(&self) -> ProcessingStatus {
        self.status
    }
}

/// Structured AI summary of a paper. Absent fields deserialize as empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaperSummary {
    pub research_question: String,
    pub methodology: String,
    pub key_findings: Vec<String>,
    pub contributions: String,
    pub limitations: String,
}

impl PaperSummary {
    pub fn is_empty(&self) -> bool {
        self.research_question.is_empty()
            && self.methodology.is_empty()
            && self.key_findings.is_empty()
            && self.contributions.is_empty()
            && self.limitations.is_empty()
    }
}

/// A fully enriched, searchable paper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedPaper {
    pub paper_id: String,
    pub title: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(rename = "abstract", default, skip_serializing_if = "Option::is_none")]
    pub abstract_text: Option<String>,
    pub clean_text: String,
    pub summary: PaperSummary,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    /// Model that produced `embedding`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,
    #[serde(default = "utc_now")]
    pub enriched_at: DateTime<Utc>,
}

impl PaperRecord for EnrichedPaper {
    fn paper_id(&self) -> &str {
        &self.paper_id
    }
    fn title(&self) -> &str {
        &self.title
    }
    fn status(&self) -> ProcessingStatus {
        ProcessingStatus::Enriched
    }
}

/// Read-only projection returned by search queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperSearchResult {
    pub paper_id: String,
    pub title: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(rename = "abstract", default)]
    pub abstract_text: Option<String>,
    #[serde(default)]
    pub summary: Option<PaperSummary>,
    #[serde(default)]
    pub topics: Vec<String>,
    /// Backend-defined relevance; not comparable across backends.
    pub score: f32,
}

impl PaperSearchResult {
    pub fn from_paper(paper: &EnrichedPaper, score: f32) -> Self {
        Self {
            paper_id: paper.paper_id.clone(),
            title: paper.title.clone(),
            authors: paper.authors.clone(),
            abstract_text: paper.abstract_text.clone(),
            summary: Some(paper.summary.clone()),
            topics: paper.topics.clone(),
            score,
        }
    }
}
