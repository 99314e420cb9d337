//! Text quality gate for extracted papers.
//!
//! `validate` runs every check, sorts failures into errors (critical checks)
//! and warnings (everything else), and cleans the text only when it passed.

pub mod checks;
pub mod clean;

use std::collections::BTreeMap;

use paperflow_shared::{QualityThresholds, ValidationResult};

pub use checks::{CRITICAL_CHECKS, CheckReport, alphabetic_ratio, is_critical};
pub use clean::clean_text;

/// Result of running the quality gate on one text.
#[derive(Debug, Clone, PartialEq)]
pub struct Validation {
    pub result: ValidationResult,
    /// Cleaned text when valid, otherwise the raw input unchanged.
    pub clean_text: String,
}

/// Run all checks against `raw_text`.
pub fn validate(raw_text: &str, thresholds: &QualityThresholds) -> Validation {
    let reports: Vec<CheckReport> = checks::ALL_CHECKS
        .iter()
        .map(|check| check(raw_text, thresholds))
        .collect();

    let result = summarize(&reports);

    let clean_text = if result.is_valid {
        clean_text(raw_text)
    } else {
        raw_text.to_string()
    };

    tracing::debug!(
        is_valid = result.is_valid,
        errors = result.errors.len(),
        warnings = result.warnings.len(),
        "validated text"
    );

    Validation { result, clean_text }
}

/// Fold check reports into a [`ValidationResult`].
pub fn summarize(reports: &[CheckReport]) -> ValidationResult {
    let mut checks = BTreeMap::new();
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    for report in reports {
        checks.insert(report.name.to_string(), report.passed);
        if report.passed {
            continue;
        }
        let line = format!("{}: {}", report.name, report.message);
        if is_critical(report.name) {
            errors.push(line);
        } else {
            warnings.push(line);
        }
    }

    ValidationResult {
        is_valid: errors.is_empty(),
        checks,
        warnings,
        errors,
    }
}
