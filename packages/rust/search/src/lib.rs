//! Paper store and search backends.
//!
//! - [`LocalIndex`]: normalized in-memory cosine index.
//! - [`RemoteSearch`]: hybrid text + vector search on a remote service,
//!   also used to index enriched papers.
//! - [`PaperStore`]: the read-only query surface over enriched papers.

pub mod backend;
pub mod index;
pub mod remote;
pub mod store;

pub use backend::{PaperSearch, SearchBackend};
pub use index::LocalIndex;
pub use remote::{
    MAX_INDEXED_TEXT, RemoteSearch, SearchDocument, UpsertReport, sanitize_key,
};
pub use store::{
    INDEX_DIMENSIONS, MAX_TOP_K, PAPERS_LOADED, PaperListing, PaperStore, PaperView,
    SEARCH_DURATION_SECONDS, SEARCH_QUERIES_TOTAL, SummaryView,
};
