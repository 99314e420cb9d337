//! Error types for Paperflow.
//!
//! Library crates use [`PaperflowError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

use crate::types::ProcessingStatus;

/// Top-level error type for all Paperflow operations.
#[derive(Debug, thiserror::Error)]
pub enum PaperflowError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error talking to an external service.
    #[error("network error: {0}")]
    Network(String),

    /// Malformed JSON, XML or collaborator output.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Record directory or cache database error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Summarizer or embedder failure.
    #[error("enrichment error: {0}")]
    Enrichment(String),

    /// Document text extraction failure.
    #[error("extraction error: {0}")]
    Extraction(String),

    /// Search backend failure (remote service or local index).
    #[error("search error: {0}")]
    Search(String),

    /// A query rejected before reaching any backend.
    #[error("invalid query: {message}")]
    InvalidQuery { message: String },

    /// A stage tried to move a record along an illegal status edge.
    #[error("invalid transition for {paper_id}: {from} -> {to}")]
    InvalidTransition {
        paper_id: String,
        from: ProcessingStatus,
        to: ProcessingStatus,
    },

    /// Embedding dimension disagreement between index and query time.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (schema mismatch, invalid format, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, PaperflowError>;

impl PaperflowError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create an invalid-query error from any displayable message.
    pub fn invalid_query(msg: impl Into<String>) -> Self {
        Self::InvalidQuery {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = PaperflowError::config("missing API key");
        assert_eq!(err.to_string(), "config error: missing API key");

        let err = PaperflowError::DimensionMismatch {
            expected: 384,
            actual: 1536,
        };
        assert!(err.to_string().contains("expected 384, got 1536"));
    }

    #[test]
    fn transition_error_names_both_states() {
        let err = PaperflowError::InvalidTransition {
            paper_id: "2401.00001".into(),
            from: ProcessingStatus::Failed,
            to: ProcessingStatus::Enriched,
        };
        assert_eq!(
            err.to_string(),
            "invalid transition for 2401.00001: failed -> enriched"
        );
    }
}
