//! Iteration context: what the reviewer and CI said about the last attempt.

use crate::github::{latest_commit_sha, CheckRun, PullRequest, RepoHost};
use crate::util::truncate_with_marker;
use anyhow::{Context, Result};
use tracing::info;

/// Marker that identifies the reviewer's report comment.
pub const REVIEW_REPORT_MARKER: &str = "AI Reviewer report";

/// Check-run conclusions that count as failures.
pub const FAILING_CONCLUSIONS: &[&str] = &["failure", "cancelled", "timed_out", "action_required"];

/// Default cap for a single failure's detail text, in characters.
pub const DEFAULT_DETAIL_CAP: usize = 2000;

pub const TRUNCATION_MARKER: &str = "\n[truncated]";

/// One failing check on the pull request head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CiFailure {
    pub name: String,
    pub detail: String,
}

/// Reviewer notes and CI failures for one pull request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IterationContext {
    pub review_notes: String,
    pub ci_failures: Vec<CiFailure>,
}

pub struct ContextFetcher<'a> {
    host: &'a dyn RepoHost,
    /// Login of the reviewing automation; `None` accepts any author.
    reviewer_login: Option<&'a str>,
    detail_cap: usize,
}

impl<'a> ContextFetcher<'a> {
    pub fn new(host: &'a dyn RepoHost, reviewer_login: Option<&'a str>, detail_cap: usize) -> Self {
        Self {
            host,
            reviewer_login,
            detail_cap,
        }
    }

    pub fn fetch(&self, pr: &PullRequest) -> Result<IterationContext> {
        let review_notes = self.latest_review_report(pr.number)?;
        let ci_failures = self.ci_failures(pr)?;
        info!(
            pr = pr.number,
            has_review_notes = !review_notes.is_empty(),
            ci_failures = ci_failures.len(),
            "collected iteration context"
        );
        Ok(IterationContext {
            review_notes,
            ci_failures,
        })
    }

    /// Body of the newest reviewer report comment, or an empty string.
    pub fn latest_review_report(&self, pr_number: u64) -> Result<String> {
        let comments = self
            .host
            .list_issue_comments(pr_number)
            .context("Failed to list pull request comments")?;
        Ok(comments
            .iter()
            .rev()
            .find(|c| {
                c.body.contains(REVIEW_REPORT_MARKER)
                    && self
                        .reviewer_login
                        .is_none_or(|login| c.user.login == login)
            })
            .map(|c| c.body.clone())
            .unwrap_or_default())
    }

    /// Failing check runs on the pull request's latest commit.
    pub fn ci_failures(&self, pr: &PullRequest) -> Result<Vec<CiFailure>> {
        let sha = latest_commit_sha(self.host, pr)?;
        let runs = self
            .host
            .list_check_runs(&sha)
            .with_context(|| format!("Failed to list check runs for {}", sha))?;
        Ok(runs
            .iter()
            .filter(|run| is_failing(run))
            .map(|run| CiFailure {
                name: run.name.clone(),
                detail: failure_detail(run, self.detail_cap),
            })
            .collect())
    }
}

fn is_failing(run: &CheckRun) -> bool {
    run.conclusion
        .as_deref()
        .is_some_and(|c| FAILING_CONCLUSIONS.contains(&c))
}

/// Title, summary and text of a check run's output, capped.
pub fn failure_detail(run: &CheckRun, cap: usize) -> String {
    let parts: Vec<&str> = [&run.output.title, &run.output.summary, &run.output.text]
        .into_iter()
        .filter_map(|part| part.as_deref())
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect();

    if parts.is_empty() {
        return format!("{} failed (no output text available).", run.name);
    }
    truncate_with_marker(&parts.join("\n"), cap, TRUNCATION_MARKER)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::CheckRunOutput;
    use crate::test_support::FakeHost;

    fn run(name: &str, conclusion: Option<&str>, output: CheckRunOutput) -> CheckRun {
        CheckRun {
            name: name.to_string(),
            status: "completed".to_string(),
            conclusion: conclusion.map(str::to_string),
            output,
        }
    }

    #[test]
    fn empty_output_gets_generic_detail() {
        let r = run("lint", Some("failure"), CheckRunOutput::default());
        assert_eq!(
            failure_detail(&r, DEFAULT_DETAIL_CAP),
            "lint failed (no output text available)."
        );
    }

    #[test]
    fn detail_joins_output_fields_and_truncates() {
        let r = run(
            "tests",
            Some("failure"),
            CheckRunOutput {
                title: Some("2 failed".to_string()),
                summary: Some("  ".to_string()),
                text: Some("x".repeat(50)),
            },
        );
        let detail = failure_detail(&r, 20);
        assert!(detail.starts_with("2 failed\nxxxxxxxxxxx"));
        assert!(detail.ends_with(TRUNCATION_MARKER));
        assert_eq!(detail.chars().count(), 20 + TRUNCATION_MARKER.chars().count());
    }

    #[test]
    fn only_failing_conclusions_are_kept() {
        let host = FakeHost::default();
        let pr_number = host.seed_pull("agent/issue-5", "main", "body");
        let sha = host.head_sha(pr_number);
        host.set_check_runs(
            &sha,
            vec![
                run("build", Some("success"), CheckRunOutput::default()),
                run("lint", Some("failure"), CheckRunOutput::default()),
                run("e2e", Some("timed_out"), CheckRunOutput::default()),
                run("deploy", Some("cancelled"), CheckRunOutput::default()),
                run("manual", Some("action_required"), CheckRunOutput::default()),
                run("skipped", Some("skipped"), CheckRunOutput::default()),
                run("pending", None, CheckRunOutput::default()),
            ],
        );
        let pr = host.pull(pr_number);
        let fetcher = ContextFetcher::new(&host, None, DEFAULT_DETAIL_CAP);
        let names: Vec<String> = fetcher
            .ci_failures(&pr)
            .unwrap()
            .into_iter()
            .map(|f| f.name)
            .collect();
        assert_eq!(names, vec!["lint", "e2e", "deploy", "manual"]);
    }

    #[test]
    fn latest_reviewer_report_wins() {
        let host = FakeHost::default();
        let pr = host.seed_pull("agent/issue-6", "main", "body");
        host.add_comment_as(pr, "github-actions[bot]", "## AI Reviewer report\nfirst");
        host.add_comment_as(pr, "someone", "## AI Reviewer report\nforged");
        host.add_comment_as(pr, "github-actions[bot]", "## AI Reviewer report\nsecond");
        host.add_comment_as(pr, "github-actions[bot]", "unrelated bot chatter");

        let fetcher = ContextFetcher::new(&host, Some("github-actions[bot]"), DEFAULT_DETAIL_CAP);
        assert_eq!(
            fetcher.latest_review_report(pr).unwrap(),
            "## AI Reviewer report\nsecond"
        );

        host.add_comment_as(pr, "someone", "## AI Reviewer report\nforged later");
        assert!(fetcher.latest_review_report(pr).unwrap().ends_with("second"));

        let any_author = ContextFetcher::new(&host, None, DEFAULT_DETAIL_CAP);
        assert!(any_author
            .latest_review_report(pr)
            .unwrap()
            .ends_with("forged later"));
    }

    #[test]
    fn missing_report_is_empty() {
        let host = FakeHost::default();
        let pr = host.seed_pull("agent/issue-8", "main", "body");
        let fetcher = ContextFetcher::new(&host, None, DEFAULT_DETAIL_CAP);
        assert_eq!(fetcher.latest_review_report(pr).unwrap(), "");
    }
}
