//! In-memory cosine-similarity index.
//!
//! Rows are L2-normalized once at build time, so a query is a single pass of
//! dot products over a row-major matrix.

use paperflow_shared::{EnrichedPaper, PaperSearchResult, PaperflowError, Result};
use tracing::{debug, info};

/// Added to the query norm so a zero query vector scores 0 everywhere.
const QUERY_EPSILON: f64 = 1e-8;

/// Normalized embedding matrix plus the projections returned on a hit.
#[derive(Debug, Clone, Default)]
pub struct LocalIndex {
    entries: Vec<PaperSearchResult>,
    matrix: Vec<f32>,
    dimension: usize,
}

impl LocalIndex {
    /// Index every paper that carries a non-empty embedding.
    ///
    /// All rows must have `dimension` finite components, and papers tagged
    /// with an embedding model must match `model_id`. Any violation is fatal.
    pub fn build(papers: &[EnrichedPaper], dimension: usize, model_id: &str) -> Result<Self> {
        let mut index = Self {
            entries: Vec::new(),
            matrix: Vec::new(),
            dimension,
        };

        for paper in papers {
            let Some(embedding) = paper.embedding.as_deref().filter(|e| !e.is_empty()) else {
                continue;
            };

            if let Some(model) = paper.embedding_model.as_deref() {
                if model != model_id {
                    return Err(PaperflowError::config(format!(
                        "paper {} was embedded with {model}, but queries use {model_id}",
                        paper.paper_id
                    )));
                }
            }
            if embedding.len() != dimension {
                return Err(PaperflowError::DimensionMismatch {
                    expected: dimension,
                    actual: embedding.len(),
                });
            }

            if embedding.iter().any(|v| !v.is_finite()) {
                return Err(PaperflowError::validation(format!(
                    "paper {} has a non-finite embedding component",
                    paper.paper_id
                )));
            }

            let norm = l2_norm(embedding);
            let norm = if norm == 0.0 { 1.0 } else { norm };
            index
                .matrix
                .extend(embedding.iter().map(|&v| (f64::from(v) / norm) as f32));
            index.entries.push(PaperSearchResult::from_paper(paper, 0.0));
        }

        info!(papers = index.len(), dims = dimension, "built local index");
        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Top `top_k` rows by cosine similarity to `query`. Ties keep
    /// insertion order.
    pub fn query(&self, query: &[f32], top_k: usize) -> Result<Vec<PaperSearchResult>> {
        if self.is_empty() {
            return Ok(Vec::new());
        }
        if query.len() != self.dimension {
            return Err(PaperflowError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        if query.iter().any(|v| !v.is_finite()) {
            return Err(PaperflowError::Search(
                "query embedding has non-finite components".into(),
            ));
        }

        let qnorm = l2_norm(query) + QUERY_EPSILON;
        let mut scored: Vec<(usize, f32)> = self
            .matrix
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(i, row)| {
                let dot: f64 = row
                    .iter()
                    .zip(query)
                    .map(|(&a, &b)| f64::from(a) * f64::from(b))
                    .sum();
                let score = (dot / qnorm) as f32;
                // total_cmp puts -0.0 below 0.0; fold them so zero ties stay stable.
                (i, if score == 0.0 { 0.0 } else { score })
            })
            .collect();

        // `sort_by` is stable.
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(top_k);

        debug!(candidates = self.len(), returned = scored.len(), "local query");
        Ok(scored
            .into_iter()
            .map(|(i, score)| PaperSearchResult {
                score,
                ..self.entries[i].clone()
            })
            .collect())
    }
}

/// Accumulated in f64 so large finite components cannot overflow.
fn l2_norm(v: &[f32]) -> f64 {
    v.iter()
        .map(|&x| f64::from(x) * f64::from(x))
        .sum::<f64>()
        .sqrt()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::Utc;
    use paperflow_shared::PaperSummary;

    pub(crate) fn paper(id: &str, embedding: Option<Vec<f32>>) -> EnrichedPaper {
        EnrichedPaper {
            paper_id: id.into(),
            title: format!("Title {id}"),
            authors: vec!["Grace Hopper".into()],
            abstract_text: Some(format!("Abstract of {id}")),
            clean_text: "body".into(),
            summary: PaperSummary::default(),
            topics: vec!["compilers".into()],
            embedding,
            embedding_model: None,
            enriched_at: Utc::now(),
        }
    }

    fn ids(results: &[PaperSearchResult]) -> Vec<&str> {
        results.iter().map(|r| r.paper_id.as_str()).collect()
    }

    #[test]
    fn ranks_by_cosine_similarity() {
        let papers = vec![
            paper("doc1", Some(vec![1.0, 0.0])),
            paper("doc2", Some(vec![0.0, 1.0])),
            paper("doc3", Some(vec![0.7, 0.7])),
        ];
        let index = LocalIndex::build(&papers, 2, "m").unwrap();

        let results = index.query(&[1.0, 0.0], 3).unwrap();
        assert_eq!(ids(&results), vec!["doc1", "doc3", "doc2"]);
        assert!((results[0].score - 1.0).abs() < 1e-5);
        assert!((results[1].score - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-4);
        assert!(results[2].score.abs() < 1e-6);
    }

    #[test]
    fn top_k_is_capped_by_corpus() {
        let papers = vec![paper("a", Some(vec![1.0, 0.0])), paper("b", Some(vec![0.0, 1.0]))];
        let index = LocalIndex::build(&papers, 2, "m").unwrap();
        assert_eq!(index.query(&[0.5, 0.5], 50).unwrap().len(), 2);
        assert_eq!(index.query(&[0.5, 0.5], 1).unwrap().len(), 1);
    }

    #[test]
    fn ties_keep_insertion_order() {
        let papers = vec![
            paper("first", Some(vec![0.0, 2.0])),
            paper("second", Some(vec![0.0, 5.0])),
            paper("third", Some(vec![0.0, 1.0])),
        ];
        let index = LocalIndex::build(&papers, 2, "m").unwrap();
        let results = index.query(&[0.0, 1.0], 3).unwrap();
        assert_eq!(ids(&results), vec!["first", "second", "third"]);
    }

    #[test]
    fn zero_rows_and_missing_embeddings() {
        let papers = vec![
            paper("zero", Some(vec![0.0, 0.0])),
            paper("none", None),
            paper("empty", Some(Vec::new())),
            paper("unit", Some(vec![0.0, 3.0])),
        ];
        let index = LocalIndex::build(&papers, 2, "m").unwrap();
        assert_eq!(index.len(), 2);

        let results = index.query(&[0.0, 1.0], 5).unwrap();
        assert_eq!(ids(&results), vec!["unit", "zero"]);
        assert_eq!(results[1].score, 0.0);
    }

    #[test]
    fn zero_query_scores_zero() {
        let index = LocalIndex::build(&[paper("a", Some(vec![1.0, 1.0]))], 2, "m").unwrap();
        let results = index.query(&[0.0, 0.0], 1).unwrap();
        assert_eq!(results[0].score, 0.0);
    }

    #[test]
    fn dimension_mismatch_is_fatal() {
        let papers = vec![paper("a", Some(vec![1.0, 0.0])), paper("b", Some(vec![1.0, 0.0, 0.0]))];
        let err = LocalIndex::build(&papers, 2, "m").unwrap_err();
        assert!(matches!(
            err,
            PaperflowError::DimensionMismatch {
                expected: 2,
                actual: 3
            }
        ));

        let index = LocalIndex::build(&papers[..1], 2, "m").unwrap();
        assert!(index.query(&[1.0], 1).is_err());
    }

    #[test]
    fn foreign_embedding_model_is_fatal() {
        let mut tagged = paper("a", Some(vec![1.0, 0.0]));
        tagged.embedding_model = Some("other-model".into());
        let err = LocalIndex::build(&[tagged], 2, "query-model").unwrap_err();
        assert!(matches!(err, PaperflowError::Config { .. }));
    }

    #[test]
    fn non_finite_embedding_names_the_paper() {
        for bad in [f32::INFINITY, f32::NEG_INFINITY, f32::NAN] {
            let papers = vec![
                paper("fine", Some(vec![1.0, 0.0])),
                paper("2401.99999", Some(vec![bad, 1.0])),
            ];
            let err = LocalIndex::build(&papers, 2, "m").unwrap_err();
            assert!(matches!(err, PaperflowError::Validation { .. }));
            assert!(err.to_string().contains("2401.99999"));
        }
    }

    #[test]
    fn large_components_do_not_overflow_the_norm() {
        let papers = vec![
            paper("small", Some(vec![1.0, 0.0])),
            paper("big", Some(vec![1e20, 1e20])),
        ];
        let index = LocalIndex::build(&papers, 2, "m").unwrap();
        let results = index.query(&[1.0, 1.0], 2).unwrap();
        assert_eq!(ids(&results), vec!["big", "small"]);
        assert!((results[0].score - 1.0).abs() < 1e-5);

        let results = index.query(&[1e30, 1e30], 1).unwrap();
        assert!((results[0].score - 1.0).abs() < 1e-5);
    }

    #[test]
    fn many_zero_and_opposite_rows_sort_without_panicking() {
        let papers: Vec<_> = (0..64)
            .map(|i| {
                let embedding = match i % 3 {
                    0 => vec![0.0, 0.0],
                    1 => vec![-1.0, 0.0],
                    _ => vec![1.0, i as f32],
                };
                paper(&format!("p{i}"), Some(embedding))
            })
            .collect();
        let index = LocalIndex::build(&papers, 2, "m").unwrap();
        let results = index.query(&[1.0, 0.0], 50).unwrap();
        assert_eq!(results.len(), 50);
        assert!(results.windows(2).all(|w| w[0].score >= w[1].score));

        // Zero rows keep insertion order among themselves.
        let zeros: Vec<_> = results
            .iter()
            .filter(|r| r.score == 0.0)
            .map(|r| r.paper_id.as_str())
            .collect();
        let expected: Vec<String> = (0..64).step_by(3).map(|i| format!("p{i}")).collect();
        assert_eq!(zeros, expected.iter().map(String::as_str).collect::<Vec<_>>());
    }

    #[test]
    fn non_finite_query_is_rejected() {
        let index = LocalIndex::build(&[paper("a", Some(vec![1.0, 0.0]))], 2, "m").unwrap();
        let err = index.query(&[f32::NAN, 0.0], 1).unwrap_err();
        assert!(matches!(err, PaperflowError::Search(_)));
    }
}
