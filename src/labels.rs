//! Three-label review protocol.
//!
//! Agent and reviewer coordinate through exactly one of three labels on a
//! pull request. The host does not enforce exclusivity, so every transition
//! here removes the other two before adding its target. This module is the
//! only place that mutates those labels.

use crate::github::RepoHost;
use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::info;

/// Protocol state carried by a pull request label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReviewLabel {
    ReviewRequested,
    ChangesRequested,
    Approved,
}

impl ReviewLabel {
    pub const ALL: [ReviewLabel; 3] = [
        ReviewLabel::ReviewRequested,
        ReviewLabel::ChangesRequested,
        ReviewLabel::Approved,
    ];
}

/// Reviewer outcome for one pass over a pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Approved,
    ChangesRequested,
}

impl Verdict {
    pub fn label(&self) -> ReviewLabel {
        match self {
            Verdict::Approved => ReviewLabel::Approved,
            Verdict::ChangesRequested => ReviewLabel::ChangesRequested,
        }
    }
}

/// Name and color of one protocol label.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LabelSpec {
    pub name: String,
    pub color: String,
}

/// Concrete label names and colors for the three states.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LabelSet {
    pub review_requested: LabelSpec,
    pub changes_requested: LabelSpec,
    pub approved: LabelSpec,
}

impl Default for LabelSet {
    fn default() -> Self {
        Self {
            review_requested: LabelSpec {
                name: "ai-review-requested".to_string(),
                color: "cfd3d7".to_string(),
            },
            changes_requested: LabelSpec {
                name: "ai-changes-requested".to_string(),
                color: "fbca04".to_string(),
            },
            approved: LabelSpec {
                name: "ai-approved".to_string(),
                color: "0e8a16".to_string(),
            },
        }
    }
}

impl LabelSet {
    pub fn spec(&self, label: ReviewLabel) -> &LabelSpec {
        match label {
            ReviewLabel::ReviewRequested => &self.review_requested,
            ReviewLabel::ChangesRequested => &self.changes_requested,
            ReviewLabel::Approved => &self.approved,
        }
    }

    pub fn name(&self, label: ReviewLabel) -> &str {
        &self.spec(label).name
    }
}

pub struct LabelStateMachine<'a> {
    host: &'a dyn RepoHost,
    labels: &'a LabelSet,
}

impl<'a> LabelStateMachine<'a> {
    pub fn new(host: &'a dyn RepoHost, labels: &'a LabelSet) -> Self {
        Self { host, labels }
    }

    pub fn labels(&self) -> &LabelSet {
        self.labels
    }

    /// Create any missing protocol labels with their fixed colors.
    pub fn ensure_labels(&self) -> Result<()> {
        for label in ReviewLabel::ALL {
            let spec = self.labels.spec(label);
            if !self.host.label_exists(&spec.name)? {
                info!(label = %spec.name, "creating label");
                self.host
                    .create_label(&spec.name, &spec.color)
                    .with_context(|| format!("Failed to create label '{}'", spec.name))?;
            }
        }
        Ok(())
    }

    /// A new agent attempt invalidates any previous review outcome.
    pub fn on_agent_run(&self, pr_number: u64) -> Result<()> {
        self.transition(pr_number, ReviewLabel::ReviewRequested)
    }

    pub fn on_verdict(&self, pr_number: u64, verdict: Verdict) -> Result<()> {
        self.transition(pr_number, verdict.label())
    }

    /// Protocol state currently on the pull request, if any.
    ///
    /// When several protocol labels are present (manual edits), the first in
    /// [`ReviewLabel::ALL`] order wins.
    #[cfg(test)]
    pub fn current(&self, pr_number: u64) -> Result<Option<ReviewLabel>> {
        let present = self.host.list_issue_labels(pr_number)?;
        Ok(ReviewLabel::ALL
            .into_iter()
            .find(|label| present.iter().any(|n| n == self.labels.name(*label))))
    }

    fn transition(&self, pr_number: u64, target: ReviewLabel) -> Result<()> {
        self.ensure_labels()?;
        let present = self
            .host
            .list_issue_labels(pr_number)
            .context("Failed to read pull request labels")?;
        let has = |label: ReviewLabel| present.iter().any(|n| n == self.labels.name(label));

        for other in ReviewLabel::ALL.into_iter().filter(|l| *l != target) {
            if has(other) {
                let name = self.labels.name(other);
                info!(pr = pr_number, label = name, "removing label");
                self.host
                    .remove_issue_label(pr_number, name)
                    .with_context(|| format!("Failed to remove label '{}'", name))?;
            }
        }

        if !has(target) {
            let name = self.labels.name(target);
            info!(pr = pr_number, label = name, "adding label");
            self.host
                .add_issue_label(pr_number, name)
                .with_context(|| format!("Failed to add label '{}'", name))?;
        }
        Ok(())
    }
}
