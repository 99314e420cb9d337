//! Enrichment orchestrator.
//!
//! Calls the summarizer (summary + topics) and the embedder for one
//! validated paper. Summarizer responses are cached in storage keyed by
//! the clean-text hash and the summarizer model id.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument, warn};

use paperflow_providers::{Embedder, Summarizer, truncate_chars};
use paperflow_shared::{EnrichedPaper, PaperflowError, ProcessingStatus, Result, ValidatedPaper};
use paperflow_storage::{CacheKey, EnrichmentCache, content_hash};

const SUMMARY_TASK: &str = "summary";
const TOPICS_TASK: &str = "topics";

/// Cache hit/miss counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

pub struct EnrichmentOrchestrator {
    summarizer: Arc<dyn Summarizer>,
    embedder: Arc<dyn Embedder>,
    max_embed_chars: usize,
    cache: Option<Arc<EnrichmentCache>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl EnrichmentOrchestrator {
    pub fn new(
        summarizer: Arc<dyn Summarizer>,
        embedder: Arc<dyn Embedder>,
        max_embed_chars: usize,
    ) -> Self {
        Self {
            summarizer,
            embedder,
            max_embed_chars,
            cache: None,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn with_cache(mut self, cache: Arc<EnrichmentCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn cache_stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Enrich one `Validated` paper.
    ///
    /// Summary, topics and embedding run concurrently; any failure fails
    /// the whole paper.
    #[instrument(skip_all, fields(paper_id = %paper.paper_id))]
    pub async fn enrich(&self, paper: &ValidatedPaper) -> Result<EnrichedPaper> {
        if paper.status != ProcessingStatus::Validated {
            return Err(PaperflowError::InvalidTransition {
                paper_id: paper.paper_id.clone(),
                from: paper.status,
                to: ProcessingStatus::Enriched,
            });
        }

        let text = paper.clean_text.as_str();
        let hash = content_hash(text);

        let (summary, topics, embedding) = tokio::try_join!(
            self.cached(SUMMARY_TASK, &hash, &paper.paper_id, || {
                self.summarizer.summarize(text)
            }),
            self.cached(TOPICS_TASK, &hash, &paper.paper_id, || {
                self.summarizer.extract_topics(text)
            }),
            self.embed(text),
        )?;

        info!(
            topics = topics.len(),
            dims = embedding.len(),
            "paper enriched"
        );

        Ok(EnrichedPaper {
            paper_id: paper.paper_id.clone(),
            title: paper.title.clone(),
            authors: paper.authors.clone(),
            abstract_text: paper.abstract_text.clone(),
            clean_text: paper.clean_text.clone(),
            summary,
            topics,
            embedding: Some(embedding),
            embedding_model: Some(self.embedder.model_id().to_string()),
            enriched_at: Utc::now(),
        })
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let input = truncate_chars(text, self.max_embed_chars);
        let vector = self.embedder.embed(input).await?;
        let expected = self.embedder.dimension();
        if vector.len() != expected {
            return Err(PaperflowError::DimensionMismatch {
                expected,
                actual: vector.len(),
            });
        }
        Ok(vector)
    }

    /// Run `compute` unless a cached response exists. Cache read and write
    /// failures are logged and otherwise ignored.
    async fn cached<T, F, Fut>(
        &self,
        task: &str,
        hash: &str,
        paper_id: &str,
        compute: F,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let model_id = self.summarizer.model_id();
        let key = CacheKey {
            task,
            content_hash: hash,
            model_id,
        };

        if let Some(cache) = &self.cache {
            match cache.get(&key).await {
                Ok(Some(json)) => match serde_json::from_str::<T>(&json) {
                    Ok(value) => {
                        self.hits.fetch_add(1, Ordering::Relaxed);
                        debug!(task, "cache hit");
                        return Ok(value);
                    }
                    Err(e) => warn!(task, error = %e, "discarding unreadable cache entry"),
                },
                Ok(None) => {}
                Err(e) => warn!(task, error = %e, "cache read failed"),
            }
            self.misses.fetch_add(1, Ordering::Relaxed);
        }

        let value = compute().await?;

        if let Some(cache) = &self.cache {
            match serde_json::to_string(&value) {
                Ok(json) => {
                    if let Err(e) = cache.put(&key, paper_id, &json).await {
                        warn!(task, error = %e, "cache write failed");
                    }
                }
                Err(e) => warn!(task, error = %e, "failed to serialize cache entry"),
            }
        }
        Ok(value)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use paperflow_shared::{PaperSummary, ValidationResult};

    #[derive(Default)]
    pub(crate) struct FakeSummarizer {
        pub summary_calls: AtomicU64,
        pub topic_calls: AtomicU64,
        pub fail: bool,
    }

    #[async_trait]
    impl Summarizer for FakeSummarizer {
        fn model_id(&self) -> &str {
            "fake-llm"
        }

        async fn summarize(&self, text: &str) -> Result<PaperSummary> {
            self.summary_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(PaperflowError::Enrichment("llm down".into()));
            }
            Ok(PaperSummary {
                research_question: format!("about {} chars", text.chars().count()),
                key_findings: vec!["it works".into()],
                ..PaperSummary::default()
            })
        }

        async fn extract_topics(&self, _text: &str) -> Result<Vec<String>> {
            self.topic_calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec!["retrieval".into(), "quality".into()])
        }
    }

    pub(crate) struct FakeEmbedder {
        pub dimension: usize,
        pub returns: usize,
        pub seen: Mutex<Vec<String>>,
    }

    impl FakeEmbedder {
        pub fn new(dimension: usize) -> Self {
            Self {
                dimension,
                returns: dimension,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Embedder for FakeEmbedder {
        fn model_id(&self) -> &str {
            "fake-embed"
        }
        fn dimension(&self) -> usize {
            self.dimension
        }
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.seen.lock().unwrap().push(text.to_string());
            Ok(vec![0.5; self.returns])
        }
    }

    pub(crate) fn validated(id: &str, text: &str) -> ValidatedPaper {
        ValidatedPaper {
            paper_id: id.into(),
            title: format!("Paper {id}"),
            authors: vec!["A. Author".into()],
            abstract_text: Some("An abstract.".into()),
            clean_text: text.into(),
            validation: ValidationResult {
                is_valid: true,
                ..ValidationResult::default()
            },
            validated_at: Utc::now(),
            status: ProcessingStatus::Validated,
        }
    }

    #[tokio::test]
    async fn enriches_validated_paper() {
        let embedder = Arc::new(FakeEmbedder::new(4));
        let orchestrator =
            EnrichmentOrchestrator::new(Arc::new(FakeSummarizer::default()), embedder.clone(), 5);

        let enriched = orchestrator
            .enrich(&validated("p1", "héllo world"))
            .await
            .unwrap();

        assert_eq!(enriched.paper_id, "p1");
        assert_eq!(enriched.clean_text, "héllo world");
        assert_eq!(enriched.summary.key_findings, vec!["it works"]);
        assert_eq!(enriched.topics, vec!["retrieval", "quality"]);
        assert_eq!(enriched.embedding.as_deref(), Some(&[0.5; 4][..]));
        assert_eq!(enriched.embedding_model.as_deref(), Some("fake-embed"));
        // Embedding input is a character prefix.
        assert_eq!(embedder.seen.lock().unwrap().as_slice(), ["héllo"]);
    }

    #[tokio::test]
    async fn rejects_non_validated_input() {
        let summarizer = Arc::new(FakeSummarizer::default());
        let orchestrator =
            EnrichmentOrchestrator::new(summarizer.clone(), Arc::new(FakeEmbedder::new(2)), 100);
        let mut paper = validated("p1", "text");
        paper.status = ProcessingStatus::Failed;

        let err = orchestrator.enrich(&paper).await.unwrap_err();
        assert!(matches!(err, PaperflowError::InvalidTransition { .. }));
        assert_eq!(summarizer.summary_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn wrong_dimension_fails() {
        let embedder = FakeEmbedder {
            returns: 3,
            ..FakeEmbedder::new(4)
        };
        let orchestrator =
            EnrichmentOrchestrator::new(Arc::new(FakeSummarizer::default()), Arc::new(embedder), 100);

        let err = orchestrator.enrich(&validated("p1", "text")).await.unwrap_err();
        assert!(matches!(
            err,
            PaperflowError::DimensionMismatch {
                expected: 4,
                actual: 3
            }
        ));
    }

    #[tokio::test]
    async fn summarizer_failure_fails_paper() {
        let summarizer = FakeSummarizer {
            fail: true,
            ..FakeSummarizer::default()
        };
        let orchestrator =
            EnrichmentOrchestrator::new(Arc::new(summarizer), Arc::new(FakeEmbedder::new(2)), 100);
        let err = orchestrator.enrich(&validated("p1", "text")).await.unwrap_err();
        assert!(err.to_string().contains("llm down"));
    }

    #[tokio::test]
    async fn second_run_is_served_from_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(
            EnrichmentCache::open(&dir.path().join("cache.db"))
                .await
                .unwrap(),
        );
        let summarizer = Arc::new(FakeSummarizer::default());
        let orchestrator =
            EnrichmentOrchestrator::new(summarizer.clone(), Arc::new(FakeEmbedder::new(2)), 100)
                .with_cache(cache.clone());

        let paper = validated("p1", "the same text twice");
        let first = orchestrator.enrich(&paper).await.unwrap();
        let second = orchestrator.enrich(&paper).await.unwrap();

        assert_eq!(first.summary, second.summary);
        assert_eq!(first.topics, second.topics);
        assert_eq!(summarizer.summary_calls.load(Ordering::SeqCst), 1);
        assert_eq!(summarizer.topic_calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            orchestrator.cache_stats(),
            CacheStats { hits: 2, misses: 2 }
        );
        assert_eq!(cache.entry_count().await.unwrap(), 2);
    }
}
