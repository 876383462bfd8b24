//! Git operations for an agent run
//!
//! Branch checkout (local, fetched or fresh), staging, commit and push.

use crate::util::redact;
use anyhow::{bail, Context, Result};
use git2::{build::CheckoutBuilder, BranchType, IndexAddOption, Repository, Signature};
use serde::Deserialize;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info};

const NETWORK_TIMEOUT: Duration = Duration::from_secs(120);
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How a branch came to be checked out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checkout {
    /// The local branch already existed.
    Existing,
    /// Created locally from the remote branch of the same name.
    FromRemote,
    /// Created from the current HEAD.
    Created,
}

/// Local repository capability used by the agent.
pub trait WorkTree {
    /// Check out `name`, creating it if needed.
    fn checkout_branch(&mut self, name: &str) -> Result<Checkout>;
    /// Stage every modification, addition and deletion.
    ///
    /// Returns false when the index matches the branch tip.
    fn stage_all(&mut self) -> Result<bool>;
    /// Commit the index on HEAD and return the new commit id.
    fn commit(&mut self, message: &str) -> Result<String>;
    fn push(&mut self, branch: &str) -> Result<()>;
}

/// Author and committer for agent commits.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommitIdentity {
    pub name: String,
    pub email: String,
}

impl Default for CommitIdentity {
    fn default() -> Self {
        Self {
            name: "code-agent".to_string(),
            email: "code-agent@users.noreply.github.com".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
enum Remote {
    Origin,
    Authenticated { url: String, token: String },
}

impl Remote {
    fn target(&self) -> &str {
        match self {
            Remote::Origin => "origin",
            Remote::Authenticated { url, .. } => url,
        }
    }

    fn scrub(&self, text: &str) -> String {
        match self {
            Remote::Origin => text.to_string(),
            Remote::Authenticated { token, .. } => redact(text, token),
        }
    }
}

/// Run `git` in `root` and return its stdout.
///
/// The process is killed once `timeout` elapses. Arguments and stderr pass
/// through `remote.scrub` before they reach an error message.
fn run_git(root: &Path, remote: &Remote, args: &[&str], timeout: Duration) -> Result<String> {
    let shown = remote.scrub(&args.join(" "));
    let mut child = Command::new("git")
        .current_dir(root)
        .args(args)
        .env("GIT_TERMINAL_PROMPT", "0")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("Failed to start git {}", shown))?;

    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());
    let deadline = Instant::now() + timeout;
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            bail!("git {} timed out after {}s", shown, timeout.as_secs());
        }
        thread::sleep(POLL_INTERVAL);
    };

    let stdout = stdout.join().unwrap_or_default();
    let stderr = stderr.join().unwrap_or_default();
    if !status.success() {
        bail!("git {} failed: {}", shown, remote.scrub(stderr.trim()));
    }
    Ok(stdout)
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut bytes = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut bytes);
        }
        String::from_utf8_lossy(&bytes).into_owned()
    })
}

/// Token-authenticated HTTPS remote for `owner/repo`.
pub fn authenticated_remote_url(repo_slug: &str, token: &str) -> String {
    format!(
        "https://x-access-token:{}@github.com/{}.git",
        token, repo_slug
    )
}

pub struct GitWorkTree {
    repo: Repository,
    root: PathBuf,
    identity: CommitIdentity,
    remote: Remote,
}

impl GitWorkTree {
    pub fn open(root: &Path, identity: CommitIdentity) -> Result<Self> {
        let repo = Repository::open(root)
            .with_context(|| format!("Failed to open git repository at {}", root.display()))?;
        Ok(Self {
            repo,
            root: root.to_path_buf(),
            identity,
            remote: Remote::Origin,
        })
    }

    /// Fetch and push through a token-authenticated URL instead of `origin`.
    pub fn with_token(mut self, repo_slug: &str, token: &str) -> Self {
        if !token.is_empty() {
            self.remote = Remote::Authenticated {
                url: authenticated_remote_url(repo_slug, token),
                token: token.to_string(),
            };
        }
        self
    }

    fn has_remote(&self) -> bool {
        match self.remote {
            Remote::Origin => self.repo.find_remote("origin").is_ok(),
            Remote::Authenticated { .. } => true,
        }
    }

    fn git(&self, args: &[&str]) -> Result<String> {
        run_git(&self.root, &self.remote, args, NETWORK_TIMEOUT)
    }

    /// Bring `refs/remotes/origin/<name>` up to date; false if the remote has no such branch.
    fn fetch_remote_branch(&self, name: &str) -> bool {
        if !self.has_remote() {
            return false;
        }
        let refspec = format!("+refs/heads/{0}:refs/remotes/origin/{0}", name);
        match self.git(&["fetch", "--quiet", self.remote.target(), &refspec]) {
            Ok(_) => true,
            Err(err) => {
                debug!(branch = name, error = %err, "remote branch not fetched");
                false
            }
        }
    }

    fn switch_to(&self, name: &str) -> Result<()> {
        let refname = format!("refs/heads/{}", name);
        let target = self
            .repo
            .revparse_single(&refname)
            .with_context(|| format!("Branch '{}' not found", name))?;
        let mut opts = CheckoutBuilder::new();
        opts.safe();
        self.repo
            .checkout_tree(&target, Some(&mut opts))
            .with_context(|| format!("Failed to check out '{}'", name))?;
        self.repo.set_head(&refname)?;
        Ok(())
    }
}

impl WorkTree for GitWorkTree {
    fn checkout_branch(&mut self, name: &str) -> Result<Checkout> {
        let origin = if self.repo.find_branch(name, BranchType::Local).is_ok() {
            Checkout::Existing
        } else if self.fetch_remote_branch(name) {
            let remote_ref = format!("refs/remotes/origin/{}", name);
            let commit = self
                .repo
                .find_reference(&remote_ref)
                .and_then(|r| r.peel_to_commit())
                .with_context(|| format!("Fetched branch '{}' has no commit", name))?;
            self.repo
                .branch(name, &commit, false)
                .with_context(|| format!("Failed to create branch '{}' from remote", name))?;
            Checkout::FromRemote
        } else {
            let head = self
                .repo
                .head()
                .and_then(|h| h.peel_to_commit())
                .context("Failed to resolve HEAD commit")?;
            self.repo
                .branch(name, &head, false)
                .with_context(|| format!("Failed to create branch '{}'", name))?;
            Checkout::Created
        };
        self.switch_to(name)?;
        info!(branch = name, origin = ?origin, "checked out branch");
        Ok(origin)
    }

    fn stage_all(&mut self) -> Result<bool> {
        let mut index = self.repo.index()?;
        index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None)?;
        index.update_all(["*"].iter(), None)?;
        index.write()?;

        let head_tree = self.repo.head()?.peel_to_tree()?;
        let diff = self
            .repo
            .diff_tree_to_index(Some(&head_tree), Some(&index), None)?;
        let changed = diff.deltas().len();
        debug!(changed, "staged working tree");
        Ok(changed > 0)
    }

    fn commit(&mut self, message: &str) -> Result<String> {
        let mut index = self.repo.index()?;
        let tree_id = index.write_tree()?;
        let tree = self.repo.find_tree(tree_id)?;
        let parent = self.repo.head()?.peel_to_commit()?;

        let sig = Signature::now(&self.identity.name, &self.identity.email)?;
        let oid = self
            .repo
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &[&parent])
            .context("Failed to create commit")?;
        info!(commit = %oid, "committed changes");
        Ok(oid.to_string())
    }

    fn push(&mut self, branch: &str) -> Result<()> {
        let refspec = format!("HEAD:refs/heads/{}", branch);
        self.git(&["push", self.remote.target(), &refspec])?;
        info!(branch, "pushed branch");
        Ok(())
    }
}
