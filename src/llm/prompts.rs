// ═══════════════════════════════════════════════════════════════════════════════
// SHARED BUILDING BLOCKS
// ═══════════════════════════════════════════════════════════════════════════════

use crate::context::CiFailure;
use crate::patch::placeholder::marker_list;

/// Wire format the model must answer with.
const PATCH_FORMAT: &str = r#"{
  "summary": "short description of what was done",
  "changes": [
    {"path": "path/to/file", "action": "create|update|delete", "content": "full file text (for create/update)"}
  ]
}"#;

/// File-writing rules shared by every generation prompt.
const CONTENT_RULES: &str = r#"CONTENT RULES:
- Every create/update carries the COMPLETE new file content. Never a diff, never a fragment.
- Omit "content" for delete.
- Paths are relative to the repository root.
- Write concrete commands and steps, not general descriptions.
- When rewriting README.md, rewrite the whole file and keep it self-contained."#;

pub const PATCH_SYSTEM: &str =
    "You are a software engineering agent. Respond with valid JSON only, no explanations.";

/// The task description block reused by every prompt in a run.
#[derive(Debug, Clone, Default)]
pub struct TaskContext {
    pub title: String,
    pub body: String,
    /// Latest reviewer report, verbatim (iteration mode only).
    pub review_notes: String,
    /// Failing checks on the pull request head (iteration mode only).
    pub ci_failures: Vec<CiFailure>,
}

impl TaskContext {
    pub fn is_iteration(&self) -> bool {
        !self.review_notes.trim().is_empty() || !self.ci_failures.is_empty()
    }

    fn render(&self) -> String {
        let mut out = format!("TASK (issue):\nTITLE: {}\nBODY:\n{}\n", self.title, self.body);

        if !self.review_notes.trim().is_empty() {
            out.push_str("\nREVIEWER NOTES (address every point):\n");
            out.push_str(&self.review_notes);
            out.push('\n');
        }

        if !self.ci_failures.is_empty() {
            out.push_str("\nFAILING CI CHECKS (make them pass):\n");
            out.push_str(&format_ci_failures(&self.ci_failures));
        }

        out
    }
}

/// Render failing checks as a prompt block; details are kept verbatim.
pub fn format_ci_failures(failures: &[CiFailure]) -> String {
    let mut out = String::new();
    for failure in failures {
        out.push_str(&format!("### {}\n{}\n\n", failure.name, failure.detail));
    }
    out
}

fn forbidden_markers_rule() -> String {
    format!("- Placeholders are forbidden: {}.", marker_list())
}

// ═══════════════════════════════════════════════════════════════════════════════
// PROMPTS
// ═══════════════════════════════════════════════════════════════════════════════

/// First request of a run.
pub fn primary_prompt(task: &TaskContext) -> String {
    let mut prompt = task.render();
    if task.is_iteration() {
        prompt.push_str(
            "\nThis is a follow-up iteration on an open pull request. \
             Produce the changes that resolve the reviewer notes and CI failures above.\n",
        );
    } else {
        prompt.push_str("\nGenerate the repository changes that complete this task.\n");
    }
    prompt.push_str("Return JSON strictly in this format:\n");
    prompt.push_str(PATCH_FORMAT);
    prompt.push_str("\n\nRULES (strict):\n");
    prompt.push_str(&forbidden_markers_rule());
    prompt.push_str("\n- No text outside the JSON object.\n\n");
    prompt.push_str(CONTENT_RULES);
    prompt
}

/// Second request after a response that contained no usable JSON object.
pub fn json_repair_prompt(task: &TaskContext) -> String {
    let mut prompt = String::from(
        "Your previous answer was not valid JSON. Return ONLY a valid JSON object, \
         with no text before or after it.\nFormat:\n",
    );
    prompt.push_str(PATCH_FORMAT);
    prompt.push_str("\n\n");
    prompt.push_str(&forbidden_markers_rule());
    prompt.push_str("\n\n");
    prompt.push_str(&task.render());
    prompt
}

/// Request after a patch whose files contained stub markers.
pub fn placeholder_repair_prompt(task: &TaskContext, offending: &[String]) -> String {
    let files = offending
        .iter()
        .map(|path| format!("\"{}\"", path))
        .collect::<Vec<_>>()
        .join(", ");
    let mut prompt = format!(
        "Your previous answer contained placeholders in these files: [{}].\n\
         Rewrite their content completely WITHOUT placeholders ({}).\n\n\
         Return ONLY a valid JSON object in this format:\n",
        files,
        marker_list()
    );
    prompt.push_str(PATCH_FORMAT);
    prompt.push_str("\n\n");
    prompt.push_str(CONTENT_RULES);
    prompt.push_str("\n\n");
    prompt.push_str(&task.render());
    prompt
}
