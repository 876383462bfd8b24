//! Repository host capability.
//!
//! [`RepoHost`] is the narrow slice of the GitHub API the agent and reviewer
//! need. [`client::GitHubClient`] implements it over REST; tests use an
//! in-memory fake.

pub mod client;

use anyhow::Result;
use serde::Deserialize;

/// An open (or just-created) pull request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub html_url: String,
    pub head: GitRef,
    pub base: GitRef,
}

impl PullRequest {
    pub fn body_text(&self) -> &str {
        self.body.as_deref().unwrap_or("")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GitRef {
    #[serde(rename = "ref")]
    pub ref_name: String,
    #[serde(default)]
    pub sha: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PullRequestFile {
    pub filename: String,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CommitInfo {
    pub sha: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CheckRunOutput {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CheckRun {
    pub name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub conclusion: Option<String>,
    #[serde(default)]
    pub output: CheckRunOutput,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CommitStatus {
    pub context: String,
    pub state: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Aggregate of all commit statuses on one ref.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CombinedStatus {
    pub state: String,
    #[serde(default)]
    pub statuses: Vec<CommitStatus>,
}

impl CombinedStatus {
    pub fn is_success(&self) -> bool {
        self.state == "success"
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CommentAuthor {
    pub login: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IssueComment {
    pub id: u64,
    #[serde(default)]
    pub body: String,
    pub user: CommentAuthor,
    #[serde(default)]
    pub created_at: String,
}

/// Fields for a new pull request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPullRequest {
    pub title: String,
    pub body: String,
    pub head: String,
    pub base: String,
}

/// Blocking access to one repository on the host.
pub trait RepoHost {
    fn label_exists(&self, name: &str) -> Result<bool>;
    fn create_label(&self, name: &str, color: &str) -> Result<()>;

    fn get_pull(&self, number: u64) -> Result<PullRequest>;
    fn list_open_pulls(&self, base: &str) -> Result<Vec<PullRequest>>;
    fn create_pull(&self, request: &NewPullRequest) -> Result<PullRequest>;
    fn update_pull_body(&self, number: u64, body: &str) -> Result<()>;
    fn list_pull_files(&self, number: u64) -> Result<Vec<PullRequestFile>>;
    fn list_pull_commits(&self, number: u64) -> Result<Vec<CommitInfo>>;

    fn list_check_runs(&self, sha: &str) -> Result<Vec<CheckRun>>;
    fn combined_status(&self, sha: &str) -> Result<CombinedStatus>;

    /// Label names currently attached to an issue or pull request.
    fn list_issue_labels(&self, number: u64) -> Result<Vec<String>>;
    fn add_issue_label(&self, number: u64, name: &str) -> Result<()>;
    fn remove_issue_label(&self, number: u64, name: &str) -> Result<()>;

    /// Comments in creation order.
    fn list_issue_comments(&self, number: u64) -> Result<Vec<IssueComment>>;
    fn create_issue_comment(&self, number: u64, body: &str) -> Result<()>;
}

/// SHA of the most recent commit on a pull request.
///
/// Prefers the last entry of the commit list and falls back to the head ref.
pub fn latest_commit_sha(host: &dyn RepoHost, pr: &PullRequest) -> Result<String> {
    let commits = host.list_pull_commits(pr.number)?;
    Ok(commits
        .last()
        .map(|c| c.sha.clone())
        .unwrap_or_else(|| pr.head.sha.clone()))
}
