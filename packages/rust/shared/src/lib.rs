//! Shared types, error model, and configuration for Paperflow.
//!
//! This crate is the foundation depended on by all other Paperflow crates.
//! It provides:
//! - [`PaperflowError`]: the unified error type
//! - Stage records ([`PaperMetadata`], [`ExtractedPaper`], [`ValidatedPaper`],
//!   [`EnrichedPaper`]) and the [`ProcessingStatus`] lifecycle
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CacheConfig, EmbeddingConfig, ExtractionConfig, IngestConfig, LlmConfig,
    PathsConfig, PipelineConfig, QualityThresholds, RemoteCredentials, SearchConfig, ServerConfig,
    config_dir, config_file_path, init_config, init_config_at, load_config, load_config_from,
    require_env, validate_api_key,
};
pub use error::{PaperflowError, Result};
pub use types::{
    EnrichedPaper, ExtractedPaper, ExtractionMethod, PaperMetadata, PaperRecord,
    PaperSearchResult, PaperSummary, ProcessingStatus, ValidatedPaper, ValidationResult,
    record_stem, safe_filename,
};
