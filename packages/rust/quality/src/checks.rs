//! Individual quality checks.
//!
//! Each check is a function `(&str, &QualityThresholds) -> CheckReport`.
//! Checks never short-circuit each other; every one of them runs on every
//! input so the full picture is recorded.

use std::sync::LazyLock;

use paperflow_shared::QualityThresholds;
use regex::Regex;

/// Outcome of a single named check.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckReport {
    pub name: &'static str,
    pub passed: bool,
    pub message: String,
}

impl CheckReport {
    fn new(name: &'static str, passed: bool, message: impl Into<String>) -> Self {
        Self {
            name,
            passed,
            message: message.into(),
        }
    }
}

pub const MIN_LENGTH: &str = "min_length";
pub const MAX_LENGTH: &str = "max_length";
pub const ALPHABETIC_RATIO: &str = "alphabetic_ratio";
pub const WORD_COUNT: &str = "word_count";
pub const REPEATED_CHARACTERS: &str = "repeated_characters";
pub const HAS_SENTENCES: &str = "has_sentences";

/// Checks whose failure alone invalidates a document.
pub const CRITICAL_CHECKS: [&str; 2] = [MIN_LENGTH, ALPHABETIC_RATIO];

pub fn is_critical(name: &str) -> bool {
    CRITICAL_CHECKS.contains(&name)
}

type CheckFn = fn(&str, &QualityThresholds) -> CheckReport;

/// All checks, in the order they are reported.
pub(crate) const ALL_CHECKS: [CheckFn; 6] = [
    check_min_length,
    check_max_length,
    check_alphabetic_ratio,
    check_word_count,
    check_repeated_characters,
    check_has_sentences,
];

/// Fraction of characters that are alphabetic. `0.0` for empty text.
pub fn alphabetic_ratio(text: &str) -> f64 {
    let total = text.chars().count();
    if total == 0 {
        return 0.0;
    }
    let alpha = text.chars().filter(|c| c.is_alphabetic()).count();
    alpha as f64 / total as f64
}

/// Fraction of characters that sit inside a run of at least `min_run`
/// identical consecutive characters.
pub fn repeated_char_ratio(text: &str, min_run: usize) -> f64 {
    let mut total = 0usize;
    let mut in_runs = 0usize;
    let mut prev: Option<char> = None;
    let mut run = 0usize;

    for c in text.chars() {
        total += 1;
        if prev == Some(c) {
            run += 1;
        } else {
            if run >= min_run {
                in_runs += run;
            }
            prev = Some(c);
            run = 1;
        }
    }
    if run >= min_run {
        in_runs += run;
    }

    if total == 0 {
        0.0
    } else {
        in_runs as f64 / total as f64
    }
}

/// Number of sentence segments with at least `min_words` words.
pub fn count_sentences(text: &str, min_words: usize) -> usize {
    static SENTENCE_END_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"[.!?]+").expect("valid regex"));

    SENTENCE_END_RE
        .split(text)
        .filter(|segment| segment.split_whitespace().count() >= min_words)
        .count()
}

fn cmp_label(ok: bool, pass: &'static str, fail: &'static str) -> &'static str {
    if ok { pass } else { fail }
}

// ---------------------------------------------------------------------------
// Checks
// ---------------------------------------------------------------------------

fn check_min_length(text: &str, t: &QualityThresholds) -> CheckReport {
    let count = text.chars().count();
    let ok = count >= t.min_chars;
    CheckReport::new(
        MIN_LENGTH,
        ok,
        format!("Char count {count} {} min {}", cmp_label(ok, ">=", "<"), t.min_chars),
    )
}

fn check_max_length(text: &str, t: &QualityThresholds) -> CheckReport {
    let count = text.chars().count();
    let ok = count <= t.max_chars;
    CheckReport::new(
        MAX_LENGTH,
        ok,
        format!("Char count {count} {} max {}", cmp_label(ok, "<=", ">"), t.max_chars),
    )
}

fn check_alphabetic_ratio(text: &str, t: &QualityThresholds) -> CheckReport {
    if text.is_empty() {
        return CheckReport::new(ALPHABETIC_RATIO, false, "Empty text");
    }
    let ratio = alphabetic_ratio(text);
    let ok = ratio >= t.min_alpha_ratio;
    CheckReport::new(
        ALPHABETIC_RATIO,
        ok,
        format!(
            "Alpha ratio {ratio:.2} {} min {}",
            cmp_label(ok, ">=", "<"),
            t.min_alpha_ratio
        ),
    )
}

fn check_word_count(text: &str, t: &QualityThresholds) -> CheckReport {
    let count = text.split_whitespace().count();
    let ok = count >= t.min_words;
    CheckReport::new(
        WORD_COUNT,
        ok,
        format!("Word count {count} {} min {}", cmp_label(ok, ">=", "<"), t.min_words),
    )
}

fn check_repeated_characters(text: &str, t: &QualityThresholds) -> CheckReport {
    if text.is_empty() {
        return CheckReport::new(REPEATED_CHARACTERS, false, "Empty text");
    }
    let ratio = repeated_char_ratio(text, t.repeat_run_len);
    let ok = ratio <= t.max_repeat_ratio;
    CheckReport::new(
        REPEATED_CHARACTERS,
        ok,
        format!(
            "Repeat ratio {ratio:.4} {} max {}",
            cmp_label(ok, "<=", ">"),
            t.max_repeat_ratio
        ),
    )
}

fn check_has_sentences(text: &str, t: &QualityThresholds) -> CheckReport {
    let found = count_sentences(text, t.min_sentence_words);
    let ok = found >= t.min_sentences;
    CheckReport::new(
        HAS_SENTENCES,
        ok,
        format!(
            "Found {found} sentences with {}+ words (need {})",
            t.min_sentence_words, t.min_sentences
        ),
    )
}
