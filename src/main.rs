use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use patchpilot::agent::{Agent, AgentSettings, RunOutcome};
use patchpilot::config::{pick_token, FileConfig, Settings};
use patchpilot::coordinator::RunRequest;
use patchpilot::git_ops::GitWorkTree;
use patchpilot::github::client::{GitHubClient, DEFAULT_API_URL};
use patchpilot::llm::yandex::{YandexGptClient, YandexSettings, YANDEX_ENDPOINT};
use patchpilot::logging;
use patchpilot::patch::apply::FsSink;
use patchpilot::reviewer::Reviewer;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "patchpilot",
    about = "Issue-to-PR code agent and its reviewer",
    version
)]
struct Cli {
    /// Log at debug level (includes raw model responses)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a patch for an issue or an open pull request and push it
    Run(RunArgs),
    /// Review a pull request and move its labels
    Review(ReviewArgs),
}

#[derive(Args, Debug)]
struct HostArgs {
    /// Repository as owner/name
    #[arg(long, env = "GITHUB_REPOSITORY")]
    repo: String,

    #[arg(long, env = "GITHUB_API_URL", default_value = DEFAULT_API_URL)]
    api_url: String,

    /// Token for API calls (falls back to the git token)
    #[arg(long, env = "GH_API_TOKEN", hide_env_values = true)]
    api_token: Option<String>,

    /// Token for git push and API fallback
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    git_token: Option<String>,

    /// Settings file (defaults to .patchpilot.toml in the working tree)
    #[arg(long)]
    config: Option<PathBuf>,
}

impl HostArgs {
    fn client(&self) -> Result<GitHubClient> {
        let token = pick_token(
            "GitHub API token",
            &[
                ("--api-token / GH_API_TOKEN", self.api_token.as_deref()),
                ("--git-token / GITHUB_TOKEN", self.git_token.as_deref()),
            ],
        )?;
        GitHubClient::new(&self.api_url, &self.repo, &token)
    }

    fn settings(&self, workdir: &std::path::Path) -> Result<Settings> {
        Settings::from_file(FileConfig::load(self.config.as_deref(), workdir)?)
    }
}

#[derive(Args, Debug)]
struct RunArgs {
    #[command(flatten)]
    host: HostArgs,

    #[arg(long = "issue", env = "ISSUE_NUMBER")]
    issue_number: Option<String>,

    /// Iterate on this open pull request instead of a fresh branch
    #[arg(long = "pr", env = "PR_NUMBER")]
    pr_number: Option<String>,

    #[arg(long, env = "ISSUE_TITLE")]
    title: Option<String>,

    #[arg(long, env = "ISSUE_BODY")]
    body: Option<String>,

    #[arg(long, default_value = "main")]
    base: String,

    #[arg(long, env = "YANDEX_IAM_TOKEN", hide_env_values = true)]
    yandex_iam_token: Option<String>,

    #[arg(long, env = "YANDEX_FOLDER_ID")]
    yandex_folder_id: Option<String>,

    /// Model id (overrides the config file)
    #[arg(long, env = "YANDEX_MODEL")]
    model: Option<String>,

    /// Working tree to patch
    #[arg(long, default_value = ".")]
    workdir: PathBuf,
}

#[derive(Args, Debug)]
struct ReviewArgs {
    #[command(flatten)]
    host: HostArgs,

    #[arg(long = "pr", env = "PR_NUMBER")]
    pr_number: Option<String>,
}

/// Parse an optional numeric input; CI often passes blank variables.
fn parse_number(name: &str, value: Option<&str>) -> Result<Option<u64>> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(v) => v
            .parse()
            .map(Some)
            .with_context(|| format!("{} must be a number, got '{}'", name, v)),
    }
}

fn run_agent(args: RunArgs) -> Result<()> {
    let issue_number = parse_number("ISSUE_NUMBER", args.issue_number.as_deref())?;
    let pr_number = parse_number("PR_NUMBER", args.pr_number.as_deref())?;
    if issue_number.is_none() && pr_number.is_none() {
        bail!("Nothing to do: pass --issue / ISSUE_NUMBER or --pr / PR_NUMBER");
    }

    let workdir = args
        .workdir
        .canonicalize()
        .with_context(|| format!("Working tree {} not found", args.workdir.display()))?;
    let mut settings = args.host.settings(&workdir)?;
    if let Some(model) = args.model.as_deref().filter(|m| !m.trim().is_empty()) {
        settings.model_id = model.trim().to_string();
    }

    let host = args.host.client()?;
    let model = YandexGptClient::new(YandexSettings {
        iam_token: pick_token(
            "YandexGPT IAM token",
            &[("--yandex-iam-token / YANDEX_IAM_TOKEN", args.yandex_iam_token.as_deref())],
        )?,
        folder_id: pick_token(
            "YandexGPT folder id",
            &[("--yandex-folder-id / YANDEX_FOLDER_ID", args.yandex_folder_id.as_deref())],
        )?,
        model: settings.model_id.clone(),
        endpoint: YANDEX_ENDPOINT.to_string(),
    })?;

    let mut tree = GitWorkTree::open(&workdir, settings.commit_identity.clone())?;
    if let Some(token) = args.host.git_token.as_deref() {
        tree = tree.with_token(&args.host.repo, token.trim());
    }
    let mut sink = FsSink::new(&workdir);

    let agent = Agent::new(
        &host,
        model,
        &settings.labels,
        AgentSettings {
            base: args.base,
            ladder: settings.ladder,
            reviewer_login: settings.reviewer_login.clone(),
            ci_detail_cap: settings.ci_detail_cap,
        },
    );
    let request = RunRequest {
        issue_number,
        pr_number,
        title: args.title,
        body: args.body,
    };

    match agent.run(&request, &mut tree, &mut sink)? {
        RunOutcome::NoChanges { branch } => {
            println!("No staged changes on {}. Nothing pushed.", branch);
        }
        RunOutcome::Pushed { pull, .. } => {
            println!("{}", pull.html_url);
        }
    }
    Ok(())
}

fn run_review(args: ReviewArgs) -> Result<()> {
    let Some(pr_number) = parse_number("PR_NUMBER", args.pr_number.as_deref())? else {
        bail!("Missing pull request: pass --pr or set PR_NUMBER");
    };
    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    let settings = args.host.settings(&cwd)?;
    let host = args.host.client()?;

    let outcome = Reviewer::new(&host, &settings.labels).review(pr_number)?;
    println!(
        "PR #{}: {}",
        pr_number,
        settings.labels.name(outcome.decision.verdict.label())
    );
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let result = match cli.command {
        Command::Run(args) => run_agent(args),
        Command::Review(args) => run_review(args),
    };
    if let Err(err) = result {
        eprintln!("Error: {:#}", err);
        std::process::exit(1);
    }
}
