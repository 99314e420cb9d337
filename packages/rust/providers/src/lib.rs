//! AI capability contracts and their HTTP implementations.
//!
//! The pipeline only sees the [`Summarizer`] and [`Embedder`] traits; the
//! concrete clients are built once from config and injected.

mod chat;
mod embed;
mod parse;

use async_trait::async_trait;
use paperflow_shared::{PaperSummary, Result};

pub use chat::{ChatSummarizer, truncate_chars};
pub use embed::HttpEmbedder;
pub use parse::{parse_summary, parse_topics};

/// Produces structured summaries and topic lists from paper text.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Model identifier, used for cache keys.
    fn model_id(&self) -> &str;

    /// Missing fields come back empty; a non-object response is an error.
    async fn summarize(&self, text: &str) -> Result<PaperSummary>;

    /// Malformed model output yields an empty list. Transport errors propagate.
    async fn extract_topics(&self, text: &str) -> Result<Vec<String>>;
}

/// Maps text to a dense vector of a fixed dimension.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn model_id(&self) -> &str;
    fn dimension(&self) -> usize;
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}
