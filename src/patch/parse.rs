//! Locate the structured object inside a raw model response.
//!
//! Models often wrap the object in prose ("Here is the patch: ...") even when
//! told not to. Either the response already is the object, or we take the
//! widest `{ ... }` span.

use regex::Regex;
use std::sync::OnceLock;

/// Return the substring most likely to be a single JSON object.
///
/// - Text whose first non-whitespace character is `{` is returned unchanged.
/// - Otherwise the first `{` through the last `}` (spanning newlines).
/// - Otherwise an empty string, meaning "no parseable patch".
pub fn extract_json_object(text: &str) -> &str {
    if text.trim_start().starts_with('{') {
        return text;
    }
    first_object_span(text).unwrap_or("")
}

fn first_object_span(text: &str) -> Option<&str> {
    static SPAN: OnceLock<Option<Regex>> = OnceLock::new();
    let re = SPAN.get_or_init(|| Regex::new(r"(?s)\{.*\}").ok()).as_ref()?;
    re.find(text).map(|m| m.as_str())
}
