//! Reviewer Verdict Engine
//!
//! One pass over a pull request: changed files, combined CI status of the
//! latest commit and the description. The verdict is written back only as a
//! report comment and a label transition.

use crate::context::REVIEW_REPORT_MARKER;
use crate::coordinator::{SUMMARY_SECTION, VERIFY_SECTION};
use crate::github::{latest_commit_sha, CombinedStatus, RepoHost};
use crate::labels::{LabelSet, LabelStateMachine, ReviewLabel, Verdict};
use anyhow::{Context, Result};
use std::fmt::Write as _;
use tracing::info;

/// Verdict plus the human-readable reasons behind it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewDecision {
    pub verdict: Verdict,
    pub notes: Vec<String>,
}

/// Apply the review rules in order; the first match wins.
///
/// 1. No changed files.
/// 2. CI not green (reported before any content check).
/// 3. Both description sections present.
/// 4. Sections missing.
pub fn decide(changed_files: usize, status: &CombinedStatus, body: &str) -> ReviewDecision {
    if changed_files == 0 {
        return ReviewDecision {
            verdict: Verdict::ChangesRequested,
            notes: vec!["No changes present in this pull request.".to_string()],
        };
    }

    if !status.is_success() {
        let mut notes = vec![format!("Combined CI status is `{}`.", status.state)];
        let failing: Vec<String> = status
            .statuses
            .iter()
            .filter(|s| s.state != "success")
            .map(|s| match s.description.as_deref().filter(|d| !d.is_empty()) {
                Some(description) => {
                    format!("`{}` is `{}`: {}", s.context, s.state, description)
                }
                None => format!("`{}` is `{}`.", s.context, s.state),
            })
            .collect();
        if failing.is_empty() {
            notes.push("No individual statuses have reported yet.".to_string());
        }
        notes.extend(failing);
        return ReviewDecision {
            verdict: Verdict::ChangesRequested,
            notes,
        };
    }

    let lower = body.to_lowercase();
    let has_summary = lower.contains(&SUMMARY_SECTION.to_lowercase());
    let has_verify = lower.contains(&VERIFY_SECTION.to_lowercase());
    if has_summary && has_verify {
        return ReviewDecision {
            verdict: Verdict::Approved,
            notes: vec![format!(
                "CI is green and the description has both `{}` and `{}` sections.",
                SUMMARY_SECTION, VERIFY_SECTION
            )],
        };
    }

    let missing: Vec<&str> = [(has_summary, SUMMARY_SECTION), (has_verify, VERIFY_SECTION)]
        .into_iter()
        .filter(|(present, _)| !present)
        .map(|(_, name)| name)
        .collect();
    ReviewDecision {
        verdict: Verdict::ChangesRequested,
        notes: vec![format!(
            "CI is green, but the description is missing: {}. Please add both `{}` and `{}` sections.",
            missing.join(", "),
            SUMMARY_SECTION,
            VERIFY_SECTION
        )],
    }
}

/// Markdown report posted on the pull request.
pub fn render_report(
    decision: &ReviewDecision,
    labels: &LabelSet,
    changed_files: usize,
    head_sha: &str,
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "## 🤖 {}\n", REVIEW_REPORT_MARKER);
    let banner = match decision.verdict {
        Verdict::Approved => "✅ **Approved**",
        Verdict::ChangesRequested => "❌ **Changes requested**",
    };
    let _ = writeln!(out, "{}\n", banner);
    let _ = writeln!(
        out,
        "Inspected {} changed file(s) at commit `{}`.\n",
        changed_files, head_sha
    );
    out.push_str("### Notes\n");
    for note in &decision.notes {
        let _ = writeln!(out, "- {}", note);
    }
    let _ = write!(
        out,
        "\n---\n_The code agent sets `{}` after every push. This review replaces it with `{}` or `{}`. \
         The next agent run resets it to `{}`._\n",
        labels.name(ReviewLabel::ReviewRequested),
        labels.name(ReviewLabel::Approved),
        labels.name(ReviewLabel::ChangesRequested),
        labels.name(ReviewLabel::ReviewRequested),
    );
    out
}

/// Result of one review pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewOutcome {
    pub decision: ReviewDecision,
    pub changed_files: usize,
    pub head_sha: String,
}

pub struct Reviewer<'a> {
    host: &'a dyn RepoHost,
    labels: LabelStateMachine<'a>,
}

impl<'a> Reviewer<'a> {
    pub fn new(host: &'a dyn RepoHost, labels: &'a LabelSet) -> Self {
        Self {
            host,
            labels: LabelStateMachine::new(host, labels),
        }
    }

    pub fn review(&self, pr_number: u64) -> Result<ReviewOutcome> {
        self.labels.ensure_labels()?;
        let pr = self
            .host
            .get_pull(pr_number)
            .with_context(|| format!("Failed to load pull request #{}", pr_number))?;
        let changed_files = self
            .host
            .list_pull_files(pr_number)
            .context("Failed to list changed files")?
            .len();
        let head_sha = latest_commit_sha(self.host, &pr)?;
        let status = self
            .host
            .combined_status(&head_sha)
            .with_context(|| format!("Failed to read CI status for {}", head_sha))?;

        let decision = decide(changed_files, &status, pr.body_text());
        info!(
            pr = pr_number,
            verdict = ?decision.verdict,
            changed_files,
            ci = %status.state,
            "review verdict"
        );

        let report = render_report(&decision, self.labels.labels(), changed_files, &head_sha);
        self.host
            .create_issue_comment(pr_number, &report)
            .context("Failed to post review report")?;
        self.labels.on_verdict(pr_number, decision.verdict)?;

        Ok(ReviewOutcome {
            decision,
            changed_files,
            head_sha,
        })
    }
}
