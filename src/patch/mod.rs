//! Structured patches proposed by the model
//!
//! A patch is a summary plus an ordered list of whole-file changes. The model
//! produces it as a single JSON object; this module owns the data model and the
//! decoding rules that decide whether a response is usable at all.

pub mod apply;
pub mod parse;
pub mod placeholder;

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// What a change does to its path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    Create,
    Update,
    Delete,
}

impl ChangeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeAction::Create => "create",
            ChangeAction::Update => "update",
            ChangeAction::Delete => "delete",
        }
    }

    /// Create and update carry the full new file content.
    pub fn writes_content(&self) -> bool {
        matches!(self, ChangeAction::Create | ChangeAction::Update)
    }
}

/// One file-level change, always a full overwrite or a removal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub path: String,
    pub action: ChangeAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl Change {
    pub fn write(path: impl Into<String>, action: ChangeAction, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            action,
            content: Some(content.into()),
        }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            action: ChangeAction::Delete,
            content: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patch {
    #[serde(default)]
    pub summary: String,
    /// `null` reads the same as a missing list.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub changes: Vec<Change>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<Change>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<Change>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Why a raw response could not be turned into a [`Patch`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// No JSON object could be located in the response.
    #[error("no JSON object found in response")]
    NoObject,
    /// An object was found but does not match the wire format.
    #[error("malformed patch object: {0}")]
    Malformed(String),
    /// A create/update change arrived without content.
    #[error("missing content for {} {path}", .action.as_str())]
    MissingContent { path: String, action: ChangeAction },
    /// The object decoded but `changes` is missing, null or empty.
    #[error("patch contains no changes")]
    NoChanges,
}

impl DecodeError {
    /// Whether the response counts as "no usable structured output".
    ///
    /// Empty `changes` is a well-formed answer that there is nothing to do,
    /// so it is not repairable.
    pub fn is_unparseable(&self) -> bool {
        !matches!(self, DecodeError::NoChanges)
    }
}

/// Decode raw model text into a patch.
///
/// Extraction is tolerant of prose around the object; the object itself must
/// match the wire format exactly.
pub fn decode_patch(raw: &str) -> Result<Patch, DecodeError> {
    let json_text = parse::extract_json_object(raw);
    if json_text.is_empty() {
        return Err(DecodeError::NoObject);
    }

    let patch: Patch =
        serde_json::from_str(json_text).map_err(|e| DecodeError::Malformed(e.to_string()))?;

    if patch.changes.is_empty() {
        return Err(DecodeError::NoChanges);
    }

    for change in &patch.changes {
        if change.action.writes_content() && change.content.is_none() {
            return Err(DecodeError::MissingContent {
                path: change.path.clone(),
                action: change.action,
            });
        }
    }

    Ok(patch)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_wire_format() {
        let raw = r#"{"summary":"add readme section","changes":[{"path":"README.md","action":"update","content":"hello"},{"path":"old.txt","action":"delete"}]}"#;
        let patch = decode_patch(raw).unwrap();
        assert_eq!(patch.summary, "add readme section");
        assert_eq!(
            patch.changes,
            vec![
                Change::write("README.md", ChangeAction::Update, "hello"),
                Change::delete("old.txt"),
            ]
        );
    }

    #[test]
    fn decodes_object_surrounded_by_prose() {
        let raw = "Here is the patch:\n{\"summary\":\"s\",\"changes\":[{\"path\":\"a\",\"action\":\"create\",\"content\":\"x\"}]}\nThanks!";
        let patch = decode_patch(raw).unwrap();
        assert_eq!(patch.changes.len(), 1);
    }

    #[test]
    fn empty_changes_is_not_repairable() {
        let err = decode_patch(r#"{"summary":"nothing","changes":[]}"#).unwrap_err();
        assert_eq!(err, DecodeError::NoChanges);
        assert!(!err.is_unparseable());

        let err = decode_patch(r#"{"summary":"nothing"}"#).unwrap_err();
        assert_eq!(err, DecodeError::NoChanges);

        let err = decode_patch(r#"{"summary":"nothing","changes":null}"#).unwrap_err();
        assert_eq!(err, DecodeError::NoChanges);
    }

    #[test]
    fn null_content_on_write_is_rejected() {
        let raw = r#"{"summary":"s","changes":[{"path":"a.rs","action":"create","content":null}]}"#;
        let err = decode_patch(raw).unwrap_err();
        assert_eq!(
            err,
            DecodeError::MissingContent {
                path: "a.rs".to_string(),
                action: ChangeAction::Create
            }
        );
        assert!(err.is_unparseable());
    }

    #[test]
    fn errors_display_and_chain_as_std_errors() {
        let err = DecodeError::MissingContent {
            path: "src/lib.rs".to_string(),
            action: ChangeAction::Update,
        };
        assert_eq!(err.to_string(), "missing content for update src/lib.rs");

        let wrapped = anyhow::Error::new(DecodeError::NoObject).context("initial stage");
        assert_eq!(
            format!("{:#}", wrapped),
            "initial stage: no JSON object found in response"
        );
    }

    #[test]
    fn unknown_action_is_malformed() {
        let raw = r#"{"summary":"s","changes":[{"path":"a","action":"rename","content":"x"}]}"#;
        assert!(matches!(
            decode_patch(raw).unwrap_err(),
            DecodeError::Malformed(_)
        ));
    }

    #[test]
    fn prose_without_object_has_no_object() {
        assert_eq!(
            decode_patch("I could not do that.").unwrap_err(),
            DecodeError::NoObject
        );
    }
}
