//! Persistence for Paperflow.
//!
//! - [`RecordDir`]: one pretty JSON file per document per stage.
//! - [`EnrichmentCache`]: libSQL (offline mode) cache for summarizer output.

mod cache;
mod records;

pub use cache::{CacheKey, EnrichmentCache, content_hash};
pub use records::{LoadFailure, Loaded, RecordDir};
