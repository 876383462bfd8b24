//! One code-agent run, from issue or pull request to pushed branch.
//!
//! Order matters for consistency: labels and the marker comment are only
//! touched after the commit, the push and the pull request upsert have all
//! succeeded.

use crate::context::ContextFetcher;
use crate::coordinator::{render_pull_body, Coordinator, RunRequest};
use crate::git_ops::WorkTree;
use crate::github::{PullRequest, RepoHost};
use crate::labels::{LabelSet, LabelStateMachine, ReviewLabel};
use crate::llm::prompts::TaskContext;
use crate::llm::ModelClient;
use crate::patch::apply::{apply_patch, FileSink};
use crate::requester::{LadderSettings, PatchRequester};
use anyhow::{Context, Result};
use tracing::{info, warn};

/// Tunables for a run.
#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub base: String,
    pub ladder: LadderSettings,
    /// Author of reviewer report comments; `None` accepts any author.
    pub reviewer_login: Option<String>,
    pub ci_detail_cap: usize,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            base: "main".to_string(),
            ladder: LadderSettings::default(),
            reviewer_login: Some("github-actions[bot]".to_string()),
            ci_detail_cap: crate::context::DEFAULT_DETAIL_CAP,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The patch left the tree identical to the branch tip.
    NoChanges { branch: String },
    Pushed {
        pull: PullRequest,
        commit: String,
        files_changed: usize,
    },
}

pub struct Agent<'a, M> {
    host: &'a dyn RepoHost,
    model: M,
    labels: &'a LabelSet,
    settings: AgentSettings,
}

impl<'a, M: ModelClient> Agent<'a, M> {
    pub fn new(host: &'a dyn RepoHost, model: M, labels: &'a LabelSet, settings: AgentSettings) -> Self {
        Self {
            host,
            model,
            labels,
            settings,
        }
    }

    pub fn run(
        &self,
        request: &RunRequest,
        tree: &mut dyn WorkTree,
        sink: &mut dyn FileSink,
    ) -> Result<RunOutcome> {
        let machine = LabelStateMachine::new(self.host, self.labels);
        machine.ensure_labels()?;

        let coordinator = Coordinator::new(self.host, &self.settings.base);
        let target = coordinator.resolve(request)?;
        coordinator.checkout(tree, &target)?;

        let mut task = TaskContext {
            title: target.title.clone(),
            body: target.body.clone(),
            ..Default::default()
        };
        if let Some(pull) = &target.pull {
            let fetcher = ContextFetcher::new(
                self.host,
                self.settings.reviewer_login.as_deref(),
                self.settings.ci_detail_cap,
            );
            let context = fetcher.fetch(pull)?;
            task.review_notes = context.review_notes;
            task.ci_failures = context.ci_failures;
        }

        let requester = PatchRequester::new(&self.model, self.settings.ladder);
        let outcome = requester.request_patch(&task)?;
        if !outcome.unresolved_placeholders.is_empty() {
            warn!(files = ?outcome.unresolved_placeholders, "committing patch with placeholders left after repair");
        }
        let patch = outcome.patch;

        let effects = apply_patch(&patch, sink).context("Failed to apply patch")?;
        info!(effects = effects.len(), "applied patch to working tree");

        if !tree.stage_all().context("Failed to stage changes")? {
            info!(branch = %target.branch, "no staged changes, exiting without commit or push");
            return Ok(RunOutcome::NoChanges {
                branch: target.branch,
            });
        }

        let commit = tree.commit(&target.commit_message())?;
        tree.push(&target.branch)
            .with_context(|| format!("Failed to push {}", target.branch))?;

        let body = render_pull_body(&target, &patch);
        let pull = coordinator.upsert_pull_request(&target, &body)?;

        machine.on_agent_run(pull.number)?;
        self.host
            .create_issue_comment(pull.number, &self.marker_comment())
            .context("Failed to post review request comment")?;
        info!(pr = pull.number, url = %pull.html_url, "review requested");

        Ok(RunOutcome::Pushed {
            pull,
            commit,
            files_changed: effects.len(),
        })
    }

    fn marker_comment(&self) -> String {
        format!(
            "🤖 Code Agent: changes pushed, requesting AI review (`{}`).",
            self.labels.name(ReviewLabel::ReviewRequested)
        )
    }
}
