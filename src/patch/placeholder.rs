//! Placeholder detection for generated file content.
//!
//! A generated file that still contains stub markers is incomplete, even when
//! the patch itself is structurally valid.

use super::Patch;

/// Punctuation markers, matched case-sensitively.
///
/// The bracketed forms `<...>` and `[...]` contain `...` and are listed for
/// the repair prompt rather than for matching.
pub const PUNCTUATION_MARKERS: &[&str] = &["...", "\u{2026}", "<...>", "[...]"];

/// Alphabetic markers, matched case-insensitively.
pub const WORD_MARKERS: &[&str] = &["TODO", "TBD"];

/// True if `content` contains any stub marker anywhere.
pub fn contains_placeholders(content: &str) -> bool {
    if PUNCTUATION_MARKERS
        .iter()
        .any(|marker| content.contains(marker))
    {
        return true;
    }
    let upper = content.to_uppercase();
    WORD_MARKERS.iter().any(|marker| upper.contains(marker))
}

/// Paths of create/update changes whose content carries a placeholder marker.
pub fn offending_paths(patch: &Patch) -> Vec<String> {
    patch
        .changes
        .iter()
        .filter(|change| change.action.writes_content())
        .filter(|change| {
            change
                .content
                .as_deref()
                .is_some_and(contains_placeholders)
        })
        .map(|change| change.path.clone())
        .collect()
}

/// Human-readable marker list for prompts.
pub fn marker_list() -> String {
    PUNCTUATION_MARKERS
        .iter()
        .chain(WORD_MARKERS.iter())
        .map(|marker| format!("\"{}\"", marker))
        .collect::<Vec<_>>()
        .join(", ")
}
