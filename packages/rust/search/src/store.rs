//! Read-only paper store serving browse and search queries.
//!
//! Built once from the enriched directory; never reloaded or mutated.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use paperflow_providers::Embedder;
use paperflow_shared::{
    EnrichedPaper, PaperRecord, PaperSearchResult, PaperSummary, PaperflowError, ProcessingStatus,
    Result,
};
use paperflow_storage::RecordDir;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::backend::{PaperSearch, SearchBackend};
use crate::index::LocalIndex;
use crate::remote::RemoteSearch;

pub const MAX_TOP_K: usize = 50;

/// Search queries that reached a backend.
pub const SEARCH_QUERIES_TOTAL: &str = "api_search_queries_total";
/// Backend latency of successful searches, in seconds.
pub const SEARCH_DURATION_SECONDS: &str = "api_search_duration_seconds";
pub const PAPERS_LOADED: &str = "api_papers_loaded_total";
pub const INDEX_DIMENSIONS: &str = "api_index_dimensions";

/// On-disk enriched record with an optional explicit status.
#[derive(Deserialize)]
struct StoredPaper {
    #[serde(default)]
    status: Option<ProcessingStatus>,
    #[serde(flatten)]
    paper: EnrichedPaper,
}

/// Row of `list_all`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaperListing {
    pub paper_id: String,
    pub title: String,
    pub authors: Vec<String>,
    pub topics: Vec<String>,
    pub status: ProcessingStatus,
}

/// Full record minus the embedding vector.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaperView {
    pub paper_id: String,
    pub title: String,
    pub authors: Vec<String>,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    pub clean_text: String,
    pub summary: PaperSummary,
    pub topics: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,
    pub enriched_at: DateTime<Utc>,
    pub status: ProcessingStatus,
}

impl From<&EnrichedPaper> for PaperView {
    fn from(paper: &EnrichedPaper) -> Self {
        Self {
            paper_id: paper.paper_id.clone(),
            title: paper.title.clone(),
            authors: paper.authors.clone(),
            abstract_text: paper.abstract_text.clone(),
            clean_text: paper.clean_text.clone(),
            summary: paper.summary.clone(),
            topics: paper.topics.clone(),
            embedding_model: paper.embedding_model.clone(),
            enriched_at: paper.enriched_at,
            status: paper.status(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryView {
    pub paper_id: String,
    pub title: String,
    pub summary: PaperSummary,
}

pub struct PaperStore {
    papers: Vec<EnrichedPaper>,
    positions: HashMap<String, usize>,
    backend: SearchBackend,
    embedder: Arc<dyn Embedder>,
}

impl std::fmt::Debug for PaperStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaperStore")
            .field("papers", &self.papers.len())
            .field("backend", &self.backend.name())
            .field("embedder", &self.embedder.model_id())
            .finish()
    }
}

impl PaperStore {
    /// Load every `Enriched` record under `dir` and pick the backend.
    ///
    /// With `remote` set, queries go to the remote service and no local
    /// index is built.
    #[instrument(skip_all, fields(dir = %dir.path().display()))]
    pub fn load(
        dir: &RecordDir,
        embedder: Arc<dyn Embedder>,
        remote: Option<RemoteSearch>,
    ) -> Result<Self> {
        if !dir.path().exists() {
            warn!("enriched directory not found, store is empty");
        }

        let loaded = dir.load_all::<StoredPaper>()?;
        let papers = loaded
            .records
            .into_iter()
            .filter(|stored| {
                let enriched = stored.status.is_none_or(|s| s == ProcessingStatus::Enriched);
                if !enriched {
                    warn!(paper_id = %stored.paper.paper_id, "ignoring non-enriched record");
                }
                enriched
            })
            .map(|stored| stored.paper)
            .collect();

        Self::from_records(papers, embedder, remote)
    }

    /// Build from records in load order. A later duplicate id replaces the
    /// earlier record in place.
    pub fn from_records(
        records: Vec<EnrichedPaper>,
        embedder: Arc<dyn Embedder>,
        remote: Option<RemoteSearch>,
    ) -> Result<Self> {
        let mut papers: Vec<EnrichedPaper> = Vec::with_capacity(records.len());
        let mut positions = HashMap::with_capacity(records.len());
        for paper in records {
            match positions.get(&paper.paper_id) {
                Some(&pos) => {
                    warn!(paper_id = %paper.paper_id, "duplicate paper id, keeping the later record");
                    papers[pos] = paper;
                }
                None => {
                    positions.insert(paper.paper_id.clone(), papers.len());
                    papers.push(paper);
                }
            }
        }

        let backend = match remote {
            Some(remote) if remote.dimension() != embedder.dimension() => {
                return Err(PaperflowError::config(format!(
                    "remote index {} expects {}-dimensional vectors, but {} produces {}",
                    remote.index_name(),
                    remote.dimension(),
                    embedder.model_id(),
                    embedder.dimension()
                )));
            }
            Some(remote) => SearchBackend::Remote(remote),
            None => SearchBackend::Local(LocalIndex::build(
                &papers,
                embedder.dimension(),
                embedder.model_id(),
            )?),
        };

        metrics::gauge!(PAPERS_LOADED).set(papers.len() as f64);
        metrics::gauge!(INDEX_DIMENSIONS).set(embedder.dimension() as f64);
        info!(papers = papers.len(), backend = backend.name(), "paper store ready");
        Ok(Self {
            papers,
            positions,
            backend,
            embedder,
        })
    }

    pub fn len(&self) -> usize {
        self.papers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.papers.is_empty()
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn list_all(&self) -> Vec<PaperListing> {
        self.papers
            .iter()
            .map(|p| PaperListing {
                paper_id: p.paper_id.clone(),
                title: p.title.clone(),
                authors: p.authors.clone(),
                topics: p.topics.clone(),
                status: p.status(),
            })
            .collect()
    }

    fn find(&self, paper_id: &str) -> Option<&EnrichedPaper> {
        self.positions.get(paper_id).map(|&pos| &self.papers[pos])
    }

    pub fn get(&self, paper_id: &str) -> Option<PaperView> {
        self.find(paper_id).map(PaperView::from)
    }

    pub fn get_summary(&self, paper_id: &str) -> Option<SummaryView> {
        self.find(paper_id).map(|p| SummaryView {
            paper_id: p.paper_id.clone(),
            title: p.title.clone(),
            summary: p.summary.clone(),
        })
    }

    /// Semantic search. Rejects an empty query or a `top_k` outside
    /// `1..=50` before touching any backend.
    #[instrument(skip_all, fields(backend = self.backend.name(), top_k = top_k))]
    pub async fn search(&self, query: &str, top_k: usize) -> Result<Vec<PaperSearchResult>> {
        if query.trim().is_empty() {
            return Err(PaperflowError::invalid_query("query must not be empty"));
        }
        if !(1..=MAX_TOP_K).contains(&top_k) {
            return Err(PaperflowError::invalid_query(format!(
                "top_k must be between 1 and {MAX_TOP_K}, got {top_k}"
            )));
        }

        metrics::counter!(SEARCH_QUERIES_TOTAL).increment(1);
        let started = Instant::now();
        let results = self
            .backend
            .search(query, self.embedder.as_ref(), top_k)
            .await?;
        metrics::histogram!(SEARCH_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
        info!(
            results = results.len(),
            latency_ms = started.elapsed().as_millis() as u64,
            "search finished"
        );
        Ok(results)
    }
}
