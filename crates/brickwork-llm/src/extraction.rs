//! Soft-Strict structured-output extraction.
//!
//! Models are prompted to reason in prose and commit their answer in a fenced
//! YAML block. Extraction tries, in order:
//!
//! 1. a fenced ```` ```yaml ```` (or ```` ```yml ````, or unlabeled) block
//! 2. a JSON array
//! 3. a JSON object containing the expected field
//!
//! and otherwise returns `{data: None, format: None}`. It never errors.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Fenced block, optionally labelled yaml/yml. Other labels (json, text) do not match.
static FENCED_YAML: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(yaml|yml)?[ \t]*\r?\n(.*?)```").unwrap());

/// Which strategy produced the data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionFormat {
    Yaml,
    Json,
}

/// Outcome of the Soft-Strict chain; `data == None` means total failure.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionResult<T> {
    pub data: Option<T>,
    pub format: Option<ExtractionFormat>,
}

impl<T> ExtractionResult<T> {
    #[must_use]
    pub fn none() -> Self {
        Self {
            data: None,
            format: None,
        }
    }

    fn found(data: T, format: ExtractionFormat) -> Self {
        Self {
            data: Some(data),
            format: Some(format),
        }
    }

    #[must_use]
    pub fn is_some(&self) -> bool {
        self.data.is_some()
    }

    pub fn into_data(self) -> Option<T> {
        self.data
    }
}

/// Run the Soft-Strict chain over a model response.
///
/// When `expected_field` is given and a parsed candidate is a mapping holding
/// that field, the field's value is tried before the whole mapping, so
/// `tasks: [...]` can be read directly as a `Vec<Task>`.
///
/// # Example
///
/// ```rust
/// use brickwork_llm::extraction::{ExtractionFormat, extract_structured};
///
/// let text = "Thinking...\n```yaml\ntasks:\n  - a\n  - b\n```";
/// let result = extract_structured::<Vec<String>>(text, Some("tasks"));
/// assert_eq!(result.format, Some(ExtractionFormat::Yaml));
/// assert_eq!(result.data.unwrap(), vec!["a", "b"]);
/// ```
pub fn extract_structured<T: DeserializeOwned>(
    text: &str,
    expected_field: Option<&str>,
) -> ExtractionResult<T> {
    for captures in FENCED_YAML.captures_iter(text) {
        let Some(body) = captures.get(2).map(|m| m.as_str()) else {
            continue;
        };
        let labelled = captures.get(1).is_some();
        let trimmed = body.trim_start();
        // Unlabelled fences that hold JSON belong to the JSON tiers.
        if !labelled && (trimmed.starts_with('{') || trimmed.starts_with('[')) {
            continue;
        }
        if let Ok(value) = serde_yaml::from_str::<Value>(body)
            && let Some(data) = from_candidate(value, expected_field)
        {
            debug!(format = "yaml", "Structured extraction succeeded");
            return ExtractionResult::found(data, ExtractionFormat::Yaml);
        }
    }

    for span in balanced_spans(text, '[', ']')
        .into_iter()
        .chain(outer_span(text, '[', ']'))
    {
        if let Ok(value @ Value::Array(_)) = serde_json::from_str::<Value>(span)
            && let Some(data) = from_candidate(value, expected_field)
        {
            debug!(format = "json", strategy = "array", "Structured extraction succeeded");
            return ExtractionResult::found(data, ExtractionFormat::Json);
        }
    }

    for span in balanced_spans(text, '{', '}')
        .into_iter()
        .chain(outer_span(text, '{', '}'))
    {
        let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(span) else {
            continue;
        };
        let has_field = expected_field.is_none_or(|field| value.get(field).is_some());
        if has_field && let Some(data) = from_candidate(value, expected_field) {
            debug!(format = "json", strategy = "object", "Structured extraction succeeded");
            return ExtractionResult::found(data, ExtractionFormat::Json);
        }
    }

    debug!(
        response_chars = text.len(),
        "Structured extraction failed on every strategy"
    );
    ExtractionResult::none()
}

fn from_candidate<T: DeserializeOwned>(value: Value, expected_field: Option<&str>) -> Option<T> {
    if let Some(field) = expected_field
        && let Some(inner) = value.get(field)
        && let Ok(data) = serde_json::from_value::<T>(inner.clone())
    {
        return Some(data);
    }
    serde_json::from_value::<T>(value).ok()
}

/// Upper bound on candidate start positions examined per delimiter
const MAX_CANDIDATES: usize = 64;

/// Balanced `open..close` spans, one per start position, outermost first.
///
/// Delimiters inside JSON strings are ignored. A start whose span never closes
/// is skipped so a stray bracket in prose does not hide a later valid block.
fn balanced_spans(text: &str, open: char, close: char) -> Vec<&str> {
    text.char_indices()
        .filter(|(_, ch)| *ch == open)
        .take(MAX_CANDIDATES)
        .filter_map(|(start, _)| matching_close(text, start, open, close))
        .collect()
}

fn matching_close(text: &str, start: usize, open: char, close: char) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            c if c == open => depth += 1,
            c if c == close => {
                depth -= 1;
                if depth == 0 {
                    let end = start + offset + c.len_utf8();
                    return Some(&text[start..end]);
                }
            }
            _ => {}
        }
    }

    None
}

/// Span from the first `open` to the last `close`.
fn outer_span(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    (end > start).then(|| &text[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Classification {
        domain: String,
        confidence: f64,
    }

    #[test]
    fn test_fenced_yaml_wins() {
        let text = "Let me think.\n```yaml\ndomain: Security\nconfidence: 0.9\n```\nand {\"domain\":\"x\",\"confidence\":1}";
        let result = extract_structured::<Classification>(text, Some("domain"));
        assert_eq!(result.format, Some(ExtractionFormat::Yaml));
        assert_eq!(result.data.unwrap().domain, "Security");
    }

    #[test]
    fn test_yml_label_and_unlabelled_fence() {
        let text = "```yml\n- one\n- two\n```";
        let result = extract_structured::<Vec<String>>(text, None);
        assert_eq!(result.format, Some(ExtractionFormat::Yaml));

        let text = "```\ndomain: Legal\nconfidence: 0.7\n```";
        let result = extract_structured::<Classification>(text, None);
        assert_eq!(result.format, Some(ExtractionFormat::Yaml));
    }

    #[test]
    fn test_expected_field_unwraps_mapping() {
        let text = "```yaml\ntasks:\n  - alpha\n  - beta\nreasoning: because\n```";
        let result = extract_structured::<Vec<String>>(text, Some("tasks"));
        assert_eq!(result.data.unwrap(), vec!["alpha", "beta"]);
    }

    #[test]
    fn test_invalid_yaml_falls_back_to_json_array() {
        let text = "```yaml\n: : bad: [\n```\nHere: [\"a\", \"b\"]";
        let result = extract_structured::<Vec<String>>(text, None);
        assert_eq!(result.format, Some(ExtractionFormat::Json));
        assert_eq!(result.data.unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn test_json_only_reports_json() {
        let text = "Sure! {\"domain\": \"Research\", \"confidence\": 0.8} Hope that helps.";
        let result = extract_structured::<Classification>(text, Some("domain"));
        assert_eq!(result.format, Some(ExtractionFormat::Json));
        assert_eq!(
            result.data.unwrap(),
            Classification {
                domain: "Research".into(),
                confidence: 0.8
            }
        );
    }

    #[test]
    fn test_json_fence_is_json_not_yaml() {
        let text = "```json\n[{\"domain\":\"A\",\"confidence\":0.1}]\n```";
        let result = extract_structured::<Vec<Classification>>(text, None);
        assert_eq!(result.format, Some(ExtractionFormat::Json));
    }

    #[test]
    fn test_object_without_expected_field_is_skipped() {
        let text = "{\"other\": 1} then {\"domain\": \"X\", \"confidence\": 0.5}";
        let result = extract_structured::<Classification>(text, Some("domain"));
        assert_eq!(result.data.unwrap().domain, "X");
    }

    #[test]
    fn test_brackets_inside_strings_do_not_confuse_spans() {
        let text = r#"{"domain": "a } b", "confidence": 0.3}"#;
        let result = extract_structured::<Classification>(text, Some("domain"));
        assert_eq!(result.data.unwrap().domain, "a } b");
    }

    #[test]
    fn test_total_failure_returns_none() {
        let result = extract_structured::<Classification>("I cannot help with that.", Some("domain"));
        assert!(result.data.is_none());
        assert!(result.format.is_none());
        assert!(!result.is_some());
    }
}
