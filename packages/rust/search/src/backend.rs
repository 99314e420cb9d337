//! Query backends behind one trait, chosen once at store construction.

use async_trait::async_trait;
use paperflow_providers::Embedder;
use paperflow_shared::{PaperSearchResult, Result};

use crate::index::LocalIndex;
use crate::remote::RemoteSearch;

/// Answers a validated query.
#[async_trait]
pub trait PaperSearch: Send + Sync {
    fn name(&self) -> &'static str;

    /// `query` is non-empty and `top_k` already bounded.
    async fn search(
        &self,
        query: &str,
        embedder: &dyn Embedder,
        top_k: usize,
    ) -> Result<Vec<PaperSearchResult>>;
}

#[async_trait]
impl PaperSearch for LocalIndex {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn search(
        &self,
        query: &str,
        embedder: &dyn Embedder,
        top_k: usize,
    ) -> Result<Vec<PaperSearchResult>> {
        if self.is_empty() {
            return Ok(Vec::new());
        }
        let vector = embedder.embed(query).await?;
        self.query(&vector, top_k)
    }
}

#[async_trait]
impl PaperSearch for RemoteSearch {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn search(
        &self,
        query: &str,
        embedder: &dyn Embedder,
        top_k: usize,
    ) -> Result<Vec<PaperSearchResult>> {
        let vector = embedder.embed(query).await?;
        self.hybrid_search(query, &vector, top_k).await
    }
}

#[derive(Debug)]
pub enum SearchBackend {
    Local(LocalIndex),
    Remote(RemoteSearch),
}

impl SearchBackend {
    fn inner(&self) -> &dyn PaperSearch {
        match self {
            Self::Local(index) => index,
            Self::Remote(remote) => remote,
        }
    }
}

#[async_trait]
impl PaperSearch for SearchBackend {
    fn name(&self) -> &'static str {
        self.inner().name()
    }

    async fn search(
        &self,
        query: &str,
        embedder: &dyn Embedder,
        top_k: usize,
    ) -> Result<Vec<PaperSearchResult>> {
        self.inner().search(query, embedder, top_k).await
    }
}
