//! GitHub REST implementation of [`RepoHost`].

use super::{
    CheckRun, CombinedStatus, CommitInfo, IssueComment, NewPullRequest, PullRequest,
    PullRequestFile, RepoHost,
};
use crate::util::sanitize_error_body;
use anyhow::{anyhow, bail, Context, Result};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

pub const DEFAULT_API_URL: &str = "https://api.github.com";

const API_TIMEOUT_SECS: u64 = 60;
const PER_PAGE: usize = 100;
const USER_AGENT: &str = "patchpilot";

#[derive(Serialize)]
struct CreatePrRequest<'a> {
    title: &'a str,
    body: &'a str,
    head: &'a str,
    base: &'a str,
}

#[derive(Serialize)]
struct UpdatePrBodyRequest<'a> {
    body: &'a str,
}

#[derive(Serialize)]
struct CreateLabelRequest<'a> {
    name: &'a str,
    color: &'a str,
}

#[derive(Serialize)]
struct AddLabelsRequest<'a> {
    labels: [&'a str; 1],
}

#[derive(Serialize)]
struct CommentRequest<'a> {
    body: &'a str,
}

#[derive(Deserialize)]
struct LabelResponse {
    name: String,
}

#[derive(Deserialize)]
struct CheckRunsResponse {
    #[serde(default)]
    check_runs: Vec<CheckRun>,
}

#[derive(Deserialize)]
struct ApiErrorResponse {
    message: String,
    #[serde(default)]
    errors: Vec<ApiErrorDetail>,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: Option<String>,
}

/// Parse `owner/repo`.
pub fn parse_repo_slug(raw: &str) -> Result<(String, String)> {
    let trimmed = raw.trim();
    let (owner, name) = trimmed
        .split_once('/')
        .ok_or_else(|| anyhow!("invalid repository '{}', expected owner/repo", raw))?;
    let owner = owner.trim();
    let name = name.trim();
    if owner.is_empty() || name.is_empty() || name.contains('/') {
        bail!("invalid repository '{}', expected owner/repo", raw);
    }
    Ok((owner.to_string(), name.to_string()))
}

pub struct GitHubClient {
    http: Client,
    api_base: Url,
    owner: String,
    repo: String,
    token: String,
}

impl GitHubClient {
    pub fn new(api_base: &str, repo_slug: &str, token: &str) -> Result<Self> {
        let (owner, repo) = parse_repo_slug(repo_slug)?;
        let api_base = Url::parse(api_base)
            .with_context(|| format!("Invalid GitHub API URL '{}'", api_base))?;
        let http = Client::builder()
            .timeout(Duration::from_secs(API_TIMEOUT_SECS))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            http,
            api_base,
            owner,
            repo,
            token: token.to_string(),
        })
    }

    /// `{api}/repos/{owner}/{repo}/{segments...}` with each segment escaped.
    fn repo_url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.api_base.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| anyhow!("GitHub API URL cannot be a base"))?;
            path.pop_if_empty();
            path.push("repos").push(&self.owner).push(&self.repo);
            path.extend(segments);
        }
        Ok(url)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("Accept", "application/vnd.github+json")
            .header("Authorization", format!("Bearer {}", self.token))
            .header("User-Agent", USER_AGENT)
            .header("X-GitHub-Api-Version", "2022-11-28")
    }

    fn send(&self, builder: RequestBuilder, what: &str) -> Result<Response> {
        let resp = self
            .authorized(builder)
            .send()
            .with_context(|| format!("Failed to send {} request", what))?;
        if resp.status().is_success() {
            return Ok(resp);
        }
        let status = resp.status();
        let body = resp.text().unwrap_or_default();
        Err(api_error(what, status, &body))
    }

    fn get_json<T: DeserializeOwned>(&self, url: Url, what: &str) -> Result<T> {
        self.send(self.http.get(url), what)?
            .json()
            .with_context(|| format!("Failed to parse {} response", what))
    }

    /// Every page of a list endpoint whose body is a JSON array.
    fn get_paginated<T: DeserializeOwned>(&self, url: Url, what: &str) -> Result<Vec<T>> {
        self.get_paginated_with(url, what, |batch: Vec<T>| batch)
    }

    /// Every page of a list endpoint; `items` pulls the list out of one page.
    fn get_paginated_with<P, T>(
        &self,
        url: Url,
        what: &str,
        items: impl Fn(P) -> Vec<T>,
    ) -> Result<Vec<T>>
    where
        P: DeserializeOwned,
    {
        let base_query: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        collect_pages(|page| {
            let mut url = url.clone();
            url.query_pairs_mut()
                .clear()
                .extend_pairs(base_query.iter().map(|(k, v)| (k.as_str(), v.as_str())))
                .append_pair("per_page", &PER_PAGE.to_string())
                .append_pair("page", &page.to_string());
            self.get_json(url, what).map(&items)
        })
    }
}

/// Request pages starting at 1 until a short page comes back.
fn collect_pages<T>(mut fetch: impl FnMut(usize) -> Result<Vec<T>>) -> Result<Vec<T>> {
    let mut out = Vec::new();
    for page in 1.. {
        let batch = fetch(page)?;
        let len = batch.len();
        out.extend(batch);
        if len < PER_PAGE {
            break;
        }
    }
    Ok(out)
}

fn api_error(what: &str, status: StatusCode, body: &str) -> anyhow::Error {
    if let Ok(api_error) = serde_json::from_str::<ApiErrorResponse>(body) {
        let detail = api_error
            .errors
            .first()
            .and_then(|e| e.message.clone())
            .unwrap_or_default();
        let msg = if detail.is_empty() {
            api_error.message
        } else {
            format!("{}: {}", api_error.message, detail)
        };
        return anyhow!("GitHub API error during {} ({}): {}", what, status, msg);
    }
    anyhow!(
        "GitHub API error during {} ({}): {}",
        what,
        status,
        sanitize_error_body(body)
    )
}

impl RepoHost for GitHubClient {
    fn label_exists(&self, name: &str) -> Result<bool> {
        let url = self.repo_url(&["labels", name])?;
        let resp = self
            .authorized(self.http.get(url))
            .send()
            .context("Failed to send label lookup request")?;
        match resp.status() {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => {
                let body = resp.text().unwrap_or_default();
                Err(api_error("label lookup", status, &body))
            }
        }
    }

    fn create_label(&self, name: &str, color: &str) -> Result<()> {
        let url = self.repo_url(&["labels"])?;
        self.send(
            self.http
                .post(url)
                .json(&CreateLabelRequest { name, color }),
            "label creation",
        )?;
        Ok(())
    }

    fn get_pull(&self, number: u64) -> Result<PullRequest> {
        let url = self.repo_url(&["pulls", &number.to_string()])?;
        self.get_json(url, "pull request lookup")
    }

    fn list_open_pulls(&self, base: &str) -> Result<Vec<PullRequest>> {
        let mut url = self.repo_url(&["pulls"])?;
        url.query_pairs_mut()
            .append_pair("state", "open")
            .append_pair("base", base);
        self.get_paginated(url, "pull request search")
    }

    fn create_pull(&self, request: &NewPullRequest) -> Result<PullRequest> {
        let url = self.repo_url(&["pulls"])?;
        let body = CreatePrRequest {
            title: &request.title,
            body: &request.body,
            head: &request.head,
            base: &request.base,
        };
        self.send(self.http.post(url).json(&body), "pull request creation")?
            .json()
            .context("Failed to parse PR response")
    }

    fn update_pull_body(&self, number: u64, body: &str) -> Result<()> {
        let url = self.repo_url(&["pulls", &number.to_string()])?;
        self.send(
            self.http.patch(url).json(&UpdatePrBodyRequest { body }),
            "pull request update",
        )?;
        Ok(())
    }

    fn list_pull_files(&self, number: u64) -> Result<Vec<PullRequestFile>> {
        let url = self.repo_url(&["pulls", &number.to_string(), "files"])?;
        self.get_paginated(url, "pull request files")
    }

    fn list_pull_commits(&self, number: u64) -> Result<Vec<CommitInfo>> {
        let url = self.repo_url(&["pulls", &number.to_string(), "commits"])?;
        self.get_paginated(url, "pull request commits")
    }

    fn list_check_runs(&self, sha: &str) -> Result<Vec<CheckRun>> {
        let url = self.repo_url(&["commits", sha, "check-runs"])?;
        let runs = self.get_paginated_with(url, "check runs", |resp: CheckRunsResponse| {
            resp.check_runs
        })?;
        debug!(sha, count = runs.len(), "fetched check runs");
        Ok(runs)
    }

    fn combined_status(&self, sha: &str) -> Result<CombinedStatus> {
        let url = self.repo_url(&["commits", sha, "status"])?;
        self.get_json(url, "combined status")
    }

    fn list_issue_labels(&self, number: u64) -> Result<Vec<String>> {
        let url = self.repo_url(&["issues", &number.to_string(), "labels"])?;
        let labels: Vec<LabelResponse> = self.get_paginated(url, "issue labels")?;
        Ok(labels.into_iter().map(|l| l.name).collect())
    }

    fn add_issue_label(&self, number: u64, name: &str) -> Result<()> {
        let url = self.repo_url(&["issues", &number.to_string(), "labels"])?;
        self.send(
            self.http
                .post(url)
                .json(&AddLabelsRequest { labels: [name] }),
            "label add",
        )?;
        Ok(())
    }

    fn remove_issue_label(&self, number: u64, name: &str) -> Result<()> {
        let url = self.repo_url(&["issues", &number.to_string(), "labels", name])?;
        let resp = self
            .authorized(self.http.delete(url))
            .send()
            .context("Failed to send label removal request")?;
        match resp.status() {
            // Already gone: removal is idempotent.
            s if s.is_success() || s == StatusCode::NOT_FOUND => Ok(()),
            status => {
                let body = resp.text().unwrap_or_default();
                Err(api_error("label removal", status, &body))
            }
        }
    }

    fn list_issue_comments(&self, number: u64) -> Result<Vec<IssueComment>> {
        let url = self.repo_url(&["issues", &number.to_string(), "comments"])?;
        self.get_paginated(url, "issue comments")
    }

    fn create_issue_comment(&self, number: u64, body: &str) -> Result<()> {
        let url = self.repo_url(&["issues", &number.to_string(), "comments"])?;
        self.send(
            self.http.post(url).json(&CommentRequest { body }),
            "comment creation",
        )?;
        Ok(())
    }
}
