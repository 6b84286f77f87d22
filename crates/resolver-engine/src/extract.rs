use std::sync::LazyLock;

use regex::Regex;
use resolver_core::ResolverError;

/// From the first opening bracket to the last closing one, across lines.
static JSON_SPAN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)[\[{].*[\]}]").expect("static regex is valid")
});

/// Recover a JSON document from a model response.
///
/// The whole text is tried first. If that fails, the span from the first `[`
/// or `{` to the last `]` or `}` is tried, which strips surrounding prose and
/// markdown fences. When several sibling documents are present the span covers
/// all of them and usually fails to parse.
///
/// # Errors
///
/// Returns [`ResolverError::Extraction`] carrying the original text when
/// neither attempt yields valid JSON.
///
/// # Examples
///
/// ```
/// use resolver_engine::extract::extract;
///
/// let raw = "Sure, here:\n```json\n[{\"path\": \"a.rs\"}]\n```\nEnjoy.";
/// let value = extract(raw).unwrap();
/// assert_eq!(value[0]["path"], "a.rs");
///
/// assert!(extract("no json here").is_err());
/// ```
pub fn extract(raw: &str) -> Result<serde_json::Value, ResolverError> {
    if let Ok(value) = serde_json::from_str(raw) {
        return Ok(value);
    }

    if let Some(span) = JSON_SPAN.find(raw) {
        if let Ok(value) = serde_json::from_str(span.as_str()) {
            return Ok(value);
        }
    }

    Err(ResolverError::Extraction {
        raw: raw.to_string(),
    })
}
