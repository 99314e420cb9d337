//! Whitespace normalization for text that passed the quality gate.

use std::sync::LazyLock;

use regex::Regex;

/// Collapse runs of 3+ newlines to 2, runs of 2+ spaces to 1, then trim.
///
/// Idempotent: `clean_text(&clean_text(x)) == clean_text(x)`.
pub fn clean_text(text: &str) -> String {
    let mut result = collapse_newlines(text);
    result = collapse_spaces(&result);
    result.trim().to_string()
}

fn collapse_newlines(text: &str) -> String {
    static MULTI_NEWLINE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

    MULTI_NEWLINE_RE.replace_all(text, "\n\n").to_string()
}

fn collapse_spaces(text: &str) -> String {
    static MULTI_SPACE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r" {2,}").expect("valid regex"));

    MULTI_SPACE_RE.replace_all(text, " ").to_string()
}
