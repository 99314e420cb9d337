//! Core pipeline orchestration for Paperflow.
//!
//! This crate ties ingestion, the quality gate, and AI enrichment into
//! status-checked stages that run directory to directory.

pub mod enrichment;
pub mod pipeline;
pub mod stages;

pub use enrichment::{CacheStats, EnrichmentOrchestrator};
pub use pipeline::{
    BatchReport, BatchSummary, ItemOutcome, ProgressReporter, SilentProgress, Stage, StageOutcome,
    run_stage,
};
pub use stages::{EnrichStage, ExtractStage, ValidateStage, run_dir_stage};
