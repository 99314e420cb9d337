//! Lenient parsing of model output.

use paperflow_shared::{PaperSummary, PaperflowError, Result};
use serde_json::Value;
use tracing::warn;

/// Strip a surrounding Markdown code fence, if the model added one.
fn strip_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    // Drop an info string such as `json` on the opening fence line.
    match rest.split_once('\n') {
        Some((first, body)) if !first.trim().contains(' ') => body.trim(),
        _ => rest.trim(),
    }
}

fn as_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn as_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect(),
        Some(Value::String(s)) if !s.is_empty() => vec![s.clone()],
        _ => Vec::new(),
    }
}

/// Parse a summary response. Absent fields become empty.
pub fn parse_summary(raw: &str) -> Result<PaperSummary> {
    let value: Value = serde_json::from_str(strip_fence(raw))
        .map_err(|e| PaperflowError::parse(format!("summary is not valid JSON: {e}")))?;

    let Value::Object(map) = value else {
        return Err(PaperflowError::parse("summary response is not a JSON object"));
    };

    Ok(PaperSummary {
        research_question: as_text(map.get("research_question")),
        methodology: as_text(map.get("methodology")),
        key_findings: as_list(map.get("key_findings")),
        contributions: as_text(map.get("contributions")),
        limitations: as_text(map.get("limitations")),
    })
}

/// Parse a topics response. Anything but a JSON array of strings (or an
/// object with a `topics` array) yields an empty list.
pub fn parse_topics(raw: &str) -> Vec<String> {
    let parsed = serde_json::from_str::<Value>(strip_fence(raw));
    let items = match parsed {
        Ok(Value::Array(items)) => items,
        Ok(Value::Object(mut map)) => match map.remove("topics") {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => {
            let preview: String = raw.chars().take(200).collect();
            warn!(%preview, "failed to parse topics response");
            return Vec::new();
        }
    };

    items
        .into_iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .filter(|s| !s.is_empty())
        .collect()
}
