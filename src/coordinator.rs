//! Branch/PR Coordinator
//!
//! Decides which branch a run works on and keeps at most one open pull
//! request per branch: an existing one is found by head ref and edited in
//! place, never recreated.

use crate::git_ops::{Checkout, WorkTree};
use crate::github::{NewPullRequest, PullRequest, RepoHost};
use crate::patch::Patch;
use anyhow::{bail, Context, Result};
use std::fmt::Write as _;
use tracing::info;

pub const ISSUE_BRANCH_PREFIX: &str = "agent/issue-";

/// Section headers the reviewer looks for in a pull request body.
pub const SUMMARY_SECTION: &str = "Agent summary";
pub const VERIFY_SECTION: &str = "How to verify";

pub fn issue_branch(issue_number: u64) -> String {
    format!("{}{}", ISSUE_BRANCH_PREFIX, issue_number)
}

/// What started the run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunRequest {
    pub issue_number: Option<u64>,
    /// Open pull request to iterate on.
    pub pr_number: Option<u64>,
    pub title: Option<String>,
    pub body: Option<String>,
}

/// Resolved branch and task text for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub branch: String,
    pub title: String,
    pub body: String,
    pub issue_number: Option<u64>,
    /// Set in iteration mode.
    pub pull: Option<PullRequest>,
}

impl Target {
    pub fn is_iteration(&self) -> bool {
        self.pull.is_some()
    }

    pub fn commit_message(&self) -> String {
        match (self.issue_number, &self.pull) {
            (Some(issue), _) => format!("chore: agent update for issue #{}", issue),
            (None, Some(pr)) => format!("chore: agent update for PR #{}", pr.number),
            (None, None) => "chore: agent update".to_string(),
        }
    }

    pub fn pull_title(&self) -> String {
        match (self.issue_number, &self.pull) {
            (Some(issue), _) => format!("Auto-fix for issue #{}", issue),
            (None, Some(pr)) => pr.title.clone(),
            (None, None) => format!("Auto-fix on {}", self.branch),
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

const ISSUE_BODY_HEADER: &str = "### Issue body\n";
const NO_DESCRIPTION: &str = "_No description provided._";

/// Task text from a pull request body, without the sections a previous run
/// rendered around it.
///
/// Bodies written by [`render_pull_body`] keep the issue text under
/// `### Issue body`; anything else is cut at the first agent section.
pub fn task_text_from_body(body: &str) -> &str {
    let summary_header = format!("### {}", SUMMARY_SECTION);
    let text = match body.find(ISSUE_BODY_HEADER) {
        Some(start) => {
            let rest = &body[start + ISSUE_BODY_HEADER.len()..];
            rest.find(&summary_header).map_or(rest, |end| &rest[..end])
        }
        None => body
            .find(&summary_header)
            .map_or(body, |end| &body[..end]),
    };
    let text = text.trim();
    if text == NO_DESCRIPTION {
        ""
    } else {
        text
    }
}

/// Pull request body with the sections the reviewer requires.
pub fn render_pull_body(target: &Target, patch: &Patch) -> String {
    let mut body = String::new();
    if let Some(issue) = target.issue_number {
        let _ = writeln!(body, "Automated PR for issue #{}\n", issue);
    }
    let _ = writeln!(body, "### Issue title\n{}\n", target.title.trim());
    let issue_body = if target.body.trim().is_empty() {
        NO_DESCRIPTION
    } else {
        target.body.trim()
    };
    let _ = writeln!(body, "{}{}\n", ISSUE_BODY_HEADER, issue_body);
    let summary = if patch.summary.trim().is_empty() {
        "_No summary provided._"
    } else {
        patch.summary.trim()
    };
    let _ = writeln!(body, "### {}\n{}\n", SUMMARY_SECTION, summary);
    let _ = writeln!(body, "### {}", VERIFY_SECTION);
    for change in &patch.changes {
        let _ = writeln!(body, "- `{}` ({})", change.path, change.action.as_str());
    }
    body.push_str("- Confirm CI passes on this pull request.\n");
    body
}

pub struct Coordinator<'a> {
    host: &'a dyn RepoHost,
    base: &'a str,
}

impl<'a> Coordinator<'a> {
    pub fn new(host: &'a dyn RepoHost, base: &'a str) -> Self {
        Self { host, base }
    }

    /// Work out the branch and task text.
    ///
    /// In iteration mode the branch is the pull request's head ref and a
    /// blank title or body falls back to the pull request's own. A body
    /// rendered by an earlier run contributes only its task text.
    pub fn resolve(&self, request: &RunRequest) -> Result<Target> {
        if let Some(pr_number) = request.pr_number {
            let pull = self
                .host
                .get_pull(pr_number)
                .with_context(|| format!("Failed to load pull request #{}", pr_number))?;
            let target = Target {
                branch: pull.head.ref_name.clone(),
                title: non_empty(&request.title)
                    .unwrap_or(&pull.title)
                    .to_string(),
                body: non_empty(&request.body)
                    .unwrap_or_else(|| task_text_from_body(pull.body_text()))
                    .to_string(),
                issue_number: request.issue_number,
                pull: Some(pull),
            };
            info!(pr = pr_number, branch = %target.branch, "iterating on pull request");
            return Ok(target);
        }

        let Some(issue) = request.issue_number else {
            bail!("Either an issue number or a pull request number is required");
        };
        let target = Target {
            branch: issue_branch(issue),
            title: request.title.clone().unwrap_or_default(),
            body: request.body.clone().unwrap_or_default(),
            issue_number: Some(issue),
            pull: None,
        };
        info!(issue, branch = %target.branch, "working on issue");
        Ok(target)
    }

    pub fn checkout(&self, tree: &mut dyn WorkTree, target: &Target) -> Result<Checkout> {
        tree.checkout_branch(&target.branch)
            .with_context(|| format!("Failed to check out {}", target.branch))
    }

    /// Open pull request against the base whose head is `branch`.
    pub fn find_open_pull(&self, branch: &str) -> Result<Option<PullRequest>> {
        let pulls = self
            .host
            .list_open_pulls(self.base)
            .context("Failed to list open pull requests")?;
        Ok(pulls.into_iter().find(|pr| pr.head.ref_name == branch))
    }

    /// Update the branch's open pull request in place, or create one.
    ///
    /// In iteration mode the pull request being iterated is the one updated,
    /// whatever its base.
    pub fn upsert_pull_request(&self, target: &Target, body: &str) -> Result<PullRequest> {
        let existing = match &target.pull {
            Some(pull) => Some(pull.clone()),
            None => self.find_open_pull(&target.branch)?,
        };
        if let Some(mut existing) = existing {
            self.host
                .update_pull_body(existing.number, body)
                .with_context(|| format!("Failed to update pull request #{}", existing.number))?;
            existing.body = Some(body.to_string());
            info!(pr = existing.number, url = %existing.html_url, "updated existing pull request");
            return Ok(existing);
        }

        let created = self
            .host
            .create_pull(&NewPullRequest {
                title: target.pull_title(),
                body: body.to_string(),
                head: target.branch.clone(),
                base: self.base.to_string(),
            })
            .with_context(|| format!("Failed to open pull request for {}", target.branch))?;
        info!(pr = created.number, url = %created.html_url, "created pull request");
        Ok(created)
    }
}
