//! In-memory fakes for the model, the repository host, the working tree and
//! the file sink.

use crate::git_ops::{Checkout, WorkTree};
use crate::github::{
    CheckRun, CombinedStatus, CommentAuthor, CommitInfo, CommitStatus, GitRef, IssueComment,
    NewPullRequest, PullRequest, PullRequestFile, RepoHost,
};
use crate::llm::{CompletionOptions, ModelClient};
use crate::patch::apply::FileSink;
use anyhow::{anyhow, bail, Result};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub system: String,
    pub user: String,
    pub options: CompletionOptions,
}

/// Returns queued responses in order and records every prompt.
#[derive(Default)]
pub struct ScriptedModel {
    responses: RefCell<VecDeque<Result<String, String>>>,
    calls: RefCell<Vec<RecordedCall>>,
}

impl ScriptedModel {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: RefCell::new(responses.into_iter().map(|r| Ok(r.into())).collect()),
            calls: RefCell::default(),
        }
    }

    /// A model whose first call fails with a transport error.
    pub fn failing(message: &str) -> Self {
        Self {
            responses: RefCell::new(VecDeque::from([Err(message.to_string())])),
            calls: RefCell::default(),
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.borrow().clone()
    }
}

impl ModelClient for ScriptedModel {
    fn complete(&self, system: &str, user: &str, options: CompletionOptions) -> Result<String> {
        self.calls.borrow_mut().push(RecordedCall {
            system: system.to_string(),
            user: user.to_string(),
            options,
        });
        match self.responses.borrow_mut().pop_front() {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(anyhow!(message)),
            None => bail!("scripted model has no more responses"),
        }
    }
}

// ---------------------------------------------------------------------------
// Repository host
// ---------------------------------------------------------------------------

struct FakePull {
    pr: PullRequest,
    open: bool,
    labels: Vec<String>,
    files: Vec<PullRequestFile>,
    commits: Vec<CommitInfo>,
}

#[derive(Default)]
struct HostState {
    pulls: BTreeMap<u64, FakePull>,
    last_number: u64,
    repo_labels: BTreeSet<String>,
    created_labels: Vec<(String, String)>,
    label_mutations: usize,
    comments: HashMap<u64, Vec<IssueComment>>,
    last_comment_id: u64,
    check_runs: HashMap<String, Vec<CheckRun>>,
    statuses: HashMap<String, CombinedStatus>,
    created_pulls: usize,
    body_updates: usize,
}

impl HostState {
    fn pull_mut(&mut self, number: u64) -> Result<&mut FakePull> {
        self.pulls
            .get_mut(&number)
            .ok_or_else(|| anyhow!("pull request #{} not found", number))
    }

    fn insert_pull(&mut self, head: &str, base: &str, title: &str, body: &str) -> u64 {
        self.last_number += 1;
        let number = self.last_number;
        let pr = PullRequest {
            number,
            title: title.to_string(),
            body: Some(body.to_string()),
            html_url: format!("https://github.com/owner/repo/pull/{}", number),
            head: GitRef {
                ref_name: head.to_string(),
                sha: format!("head-{}", number),
            },
            base: GitRef {
                ref_name: base.to_string(),
                sha: "base".to_string(),
            },
        };
        self.pulls.insert(
            number,
            FakePull {
                pr,
                open: true,
                labels: Vec::new(),
                files: Vec::new(),
                commits: Vec::new(),
            },
        );
        number
    }
}

/// In-memory repository host.
#[derive(Default)]
pub struct FakeHost {
    state: RefCell<HostState>,
}

impl FakeHost {
    /// Add an open pull request and return its number.
    pub fn seed_pull(&self, head: &str, base: &str, body: &str) -> u64 {
        let title = format!("Work on {}", head);
        self.state
            .borrow_mut()
            .insert_pull(head, base, &title, body)
    }

    pub fn set_title(&self, number: u64, title: &str) {
        if let Ok(pull) = self.state.borrow_mut().pull_mut(number) {
            pull.pr.title = title.to_string();
        }
    }

    pub fn close_pull(&self, number: u64) {
        if let Ok(pull) = self.state.borrow_mut().pull_mut(number) {
            pull.open = false;
        }
    }

    pub fn pull(&self, number: u64) -> PullRequest {
        self.state.borrow().pulls[&number].pr.clone()
    }

    pub fn head_sha(&self, number: u64) -> String {
        self.pull(number).head.sha
    }

    pub fn open_pull_count(&self) -> usize {
        self.state.borrow().pulls.values().filter(|p| p.open).count()
    }

    pub fn created_pull_count(&self) -> usize {
        self.state.borrow().created_pulls
    }

    pub fn body_update_count(&self) -> usize {
        self.state.borrow().body_updates
    }

    pub fn set_files(&self, number: u64, filenames: &[&str]) {
        if let Ok(pull) = self.state.borrow_mut().pull_mut(number) {
            pull.files = filenames
                .iter()
                .map(|f| PullRequestFile {
                    filename: f.to_string(),
                    status: "modified".to_string(),
                })
                .collect();
        }
    }

    pub fn push_commit(&self, number: u64, sha: &str) {
        if let Ok(pull) = self.state.borrow_mut().pull_mut(number) {
            pull.commits.push(CommitInfo {
                sha: sha.to_string(),
            });
        }
    }

    pub fn set_check_runs(&self, sha: &str, runs: Vec<CheckRun>) {
        self.state
            .borrow_mut()
            .check_runs
            .insert(sha.to_string(), runs);
    }

    /// Record a combined status; `statuses` are `(context, state)` pairs.
    pub fn set_status(&self, sha: &str, state: &str, statuses: &[(&str, &str)]) {
        let combined = CombinedStatus {
            state: state.to_string(),
            statuses: statuses
                .iter()
                .map(|(context, state)| CommitStatus {
                    context: context.to_string(),
                    state: state.to_string(),
                    description: None,
                })
                .collect(),
        };
        self.state
            .borrow_mut()
            .statuses
            .insert(sha.to_string(), combined);
    }

    /// Attach a label directly, bypassing the protocol (a manual edit).
    pub fn attach_label(&self, number: u64, name: &str) {
        if let Ok(pull) = self.state.borrow_mut().pull_mut(number) {
            if !pull.labels.iter().any(|l| l == name) {
                pull.labels.push(name.to_string());
            }
        }
    }

    pub fn labels_on(&self, number: u64) -> Vec<String> {
        self.state
            .borrow()
            .pulls
            .get(&number)
            .map(|p| p.labels.clone())
            .unwrap_or_default()
    }

    /// Labels created through the host, in creation order.
    pub fn created_labels(&self) -> Vec<(String, String)> {
        self.state.borrow().created_labels.clone()
    }

    /// Number of add/remove calls on issue labels.
    pub fn label_mutations(&self) -> usize {
        self.state.borrow().label_mutations
    }

    pub fn add_comment_as(&self, number: u64, login: &str, body: &str) {
        let mut state = self.state.borrow_mut();
        state.last_comment_id += 1;
        let id = state.last_comment_id;
        state.comments.entry(number).or_default().push(IssueComment {
            id,
            body: body.to_string(),
            user: CommentAuthor {
                login: login.to_string(),
            },
            created_at: format!("2024-01-01T00:00:{:02}Z", id % 60),
        });
    }

    pub fn comments_on(&self, number: u64) -> Vec<String> {
        self.state
            .borrow()
            .comments
            .get(&number)
            .map(|c| c.iter().map(|c| c.body.clone()).collect())
            .unwrap_or_default()
    }
}

impl RepoHost for FakeHost {
    fn label_exists(&self, name: &str) -> Result<bool> {
        Ok(self.state.borrow().repo_labels.contains(name))
    }

    fn create_label(&self, name: &str, color: &str) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if !state.repo_labels.insert(name.to_string()) {
            bail!("label '{}' already exists", name);
        }
        state
            .created_labels
            .push((name.to_string(), color.to_string()));
        Ok(())
    }

    fn get_pull(&self, number: u64) -> Result<PullRequest> {
        let mut state = self.state.borrow_mut();
        Ok(state.pull_mut(number)?.pr.clone())
    }

    fn list_open_pulls(&self, base: &str) -> Result<Vec<PullRequest>> {
        Ok(self
            .state
            .borrow()
            .pulls
            .values()
            .filter(|p| p.open && p.pr.base.ref_name == base)
            .map(|p| p.pr.clone())
            .collect())
    }

    fn create_pull(&self, request: &NewPullRequest) -> Result<PullRequest> {
        let mut state = self.state.borrow_mut();
        let number =
            state.insert_pull(&request.head, &request.base, &request.title, &request.body);
        state.created_pulls += 1;
        Ok(state.pull_mut(number)?.pr.clone())
    }

    fn update_pull_body(&self, number: u64, body: &str) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.pull_mut(number)?.pr.body = Some(body.to_string());
        state.body_updates += 1;
        Ok(())
    }

    fn list_pull_files(&self, number: u64) -> Result<Vec<PullRequestFile>> {
        let mut state = self.state.borrow_mut();
        Ok(state.pull_mut(number)?.files.clone())
    }

    fn list_pull_commits(&self, number: u64) -> Result<Vec<CommitInfo>> {
        let mut state = self.state.borrow_mut();
        Ok(state.pull_mut(number)?.commits.clone())
    }

    fn list_check_runs(&self, sha: &str) -> Result<Vec<CheckRun>> {
        Ok(self
            .state
            .borrow()
            .check_runs
            .get(sha)
            .cloned()
            .unwrap_or_default())
    }

    fn combined_status(&self, sha: &str) -> Result<CombinedStatus> {
        Ok(self
            .state
            .borrow()
            .statuses
            .get(sha)
            .cloned()
            .unwrap_or_else(|| CombinedStatus {
                state: "pending".to_string(),
                statuses: Vec::new(),
            }))
    }

    fn list_issue_labels(&self, number: u64) -> Result<Vec<String>> {
        let mut state = self.state.borrow_mut();
        Ok(state.pull_mut(number)?.labels.clone())
    }

    fn add_issue_label(&self, number: u64, name: &str) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.label_mutations += 1;
        let pull = state.pull_mut(number)?;
        if !pull.labels.iter().any(|l| l == name) {
            pull.labels.push(name.to_string());
        }
        Ok(())
    }

    fn remove_issue_label(&self, number: u64, name: &str) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.label_mutations += 1;
        state.pull_mut(number)?.labels.retain(|l| l != name);
        Ok(())
    }

    fn list_issue_comments(&self, number: u64) -> Result<Vec<IssueComment>> {
        Ok(self
            .state
            .borrow()
            .comments
            .get(&number)
            .cloned()
            .unwrap_or_default())
    }

    fn create_issue_comment(&self, number: u64, body: &str) -> Result<()> {
        self.add_comment_as(number, "github-actions[bot]", body);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Working tree and file sink
// ---------------------------------------------------------------------------

/// Records git operations; `has_changes` decides what staging reports.
#[derive(Debug, Default)]
pub struct FakeWorkTree {
    pub has_changes: bool,
    pub local_branches: BTreeSet<String>,
    pub checkouts: Vec<String>,
    pub commits: Vec<String>,
    pub pushes: Vec<String>,
}

impl FakeWorkTree {
    pub fn with_changes() -> Self {
        Self {
            has_changes: true,
            ..Default::default()
        }
    }
}

impl WorkTree for FakeWorkTree {
    fn checkout_branch(&mut self, name: &str) -> Result<Checkout> {
        self.checkouts.push(name.to_string());
        if self.local_branches.insert(name.to_string()) {
            Ok(Checkout::Created)
        } else {
            Ok(Checkout::Existing)
        }
    }

    fn stage_all(&mut self) -> Result<bool> {
        Ok(self.has_changes)
    }

    fn commit(&mut self, message: &str) -> Result<String> {
        self.commits.push(message.to_string());
        Ok(format!("commit-{}", self.commits.len()))
    }

    fn push(&mut self, branch: &str) -> Result<()> {
        self.pushes.push(branch.to_string());
        Ok(())
    }
}

/// File sink backed by a map.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub files: BTreeMap<PathBuf, String>,
    pub removed: Vec<PathBuf>,
}

impl FileSink for MemorySink {
    fn write_file(&mut self, path: &Path, content: &str) -> Result<()> {
        self.files.insert(path.to_path_buf(), content.to_string());
        Ok(())
    }

    fn remove_file(&mut self, path: &Path) -> Result<()> {
        self.files.remove(path);
        self.removed.push(path.to_path_buf());
        Ok(())
    }
}
