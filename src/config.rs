//! Run configuration
//!
//! Command-line flags and environment variables carry the per-run inputs
//! (see `main.rs`). An optional TOML file (`.patchpilot.toml` by default)
//! overrides the repository-level defaults below.

use crate::context::DEFAULT_DETAIL_CAP;
use crate::git_ops::CommitIdentity;
use crate::labels::LabelSet;
use crate::llm::yandex::DEFAULT_MODEL;
use crate::requester::LadderSettings;
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = ".patchpilot.toml";
pub const DEFAULT_REVIEWER_LOGIN: &str = "github-actions[bot]";

/// Extra tokens granted to each repair stage over the previous one.
const REPAIR_BUDGET_STEP: u32 = 200;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelSection {
    pub id: Option<String>,
    pub temperature: Option<f32>,
    /// Budget for the first request; repair stages get a little more.
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CiSection {
    pub detail_cap: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReviewerSection {
    /// Login that authors reviewer reports. An empty string accepts anyone.
    pub login: Option<String>,
}

/// Contents of `.patchpilot.toml`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub labels: LabelSet,
    pub model: ModelSection,
    pub ci: CiSection,
    pub reviewer: ReviewerSection,
    pub commit: Option<CommitIdentity>,
}

impl FileConfig {
    pub fn parse(text: &str) -> Result<Self> {
        toml::from_str(text).context("Invalid configuration file")
    }

    /// Read `explicit`, or the default file in `dir` if it exists.
    ///
    /// An explicit path that does not exist is an error; a missing default
    /// file just means defaults.
    pub fn load(explicit: Option<&Path>, dir: &Path) -> Result<Self> {
        let path: PathBuf = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let candidate = dir.join(DEFAULT_CONFIG_FILE);
                if !candidate.exists() {
                    return Ok(Self::default());
                }
                candidate
            }
        };
        let text = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("In {}", path.display()))
    }
}

/// Effective settings after applying file overrides to defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub labels: LabelSet,
    pub model_id: String,
    pub ladder: LadderSettings,
    pub ci_detail_cap: usize,
    pub reviewer_login: Option<String>,
    pub commit_identity: CommitIdentity,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            labels: LabelSet::default(),
            model_id: DEFAULT_MODEL.to_string(),
            ladder: LadderSettings::default(),
            ci_detail_cap: DEFAULT_DETAIL_CAP,
            reviewer_login: Some(DEFAULT_REVIEWER_LOGIN.to_string()),
            commit_identity: CommitIdentity::default(),
        }
    }
}

impl Settings {
    pub fn from_file(file: FileConfig) -> Result<Self> {
        let mut settings = Self {
            labels: file.labels,
            ..Self::default()
        };

        if let Some(id) = file.model.id.filter(|id| !id.trim().is_empty()) {
            settings.model_id = id;
        }
        if let Some(temperature) = file.model.temperature {
            if !(0.0..=1.0).contains(&temperature) {
                bail!("model.temperature must be between 0 and 1, got {}", temperature);
            }
            settings.ladder.temperature = temperature;
        }
        if let Some(base) = file.model.max_tokens {
            if base == 0 {
                bail!("model.max_tokens must be positive");
            }
            settings.ladder.initial_max_tokens = base;
            settings.ladder.json_repair_max_tokens = base.saturating_add(REPAIR_BUDGET_STEP);
            settings.ladder.placeholder_repair_max_tokens =
                base.saturating_add(2 * REPAIR_BUDGET_STEP);
        }
        if let Some(cap) = file.ci.detail_cap {
            if cap == 0 {
                bail!("ci.detail_cap must be positive");
            }
            settings.ci_detail_cap = cap;
        }
        if let Some(login) = file.reviewer.login {
            let login = login.trim().to_string();
            settings.reviewer_login = (!login.is_empty()).then_some(login);
        }
        if let Some(identity) = file.commit {
            settings.commit_identity = identity;
        }

        let names: Vec<&str> = [
            &settings.labels.review_requested,
            &settings.labels.changes_requested,
            &settings.labels.approved,
        ]
        .iter()
        .map(|spec| spec.name.as_str())
        .collect();
        if names.iter().any(|n| n.trim().is_empty()) {
            bail!("Label names must not be empty");
        }
        if names[0] == names[1] || names[0] == names[2] || names[1] == names[2] {
            bail!("Label names must be distinct");
        }

        Ok(settings)
    }
}

/// First non-blank credential among `sources`, in order.
///
/// `sources` pairs a human-readable origin (flag or variable name) with its
/// value; the origins are listed in the error when nothing is set.
pub fn pick_token(what: &str, sources: &[(&str, Option<&str>)]) -> Result<String> {
    sources
        .iter()
        .find_map(|(_, value)| value.map(str::trim).filter(|v| !v.is_empty()))
        .map(str::to_string)
        .ok_or_else(|| {
            let origins: Vec<&str> = sources.iter().map(|(origin, _)| *origin).collect();
            anyhow::anyhow!("Missing {}: set {}", what, origins.join(" or "))
        })
}
