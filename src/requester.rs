//! Patch Requester: obtain one usable patch from the model.
//!
//! The request is a bounded retry ladder:
//!
//! ```text
//! Initial ──unparseable──▶ JsonRepair ──unparseable──▶ Failed
//!    │                        │
//!    └──patch──▶ placeholder check ◀──patch──┘
//!                  │            │
//!               clean        markers
//!                  ▼            ▼
//!               Success   PlaceholderRepair ──patch──▶ Success (no re-check)
//!                                   └──unparseable──▶ Failed
//! ```
//!
//! An empty `changes` list is fatal at every stage. The placeholder repair is
//! attempted once and its result is accepted as-is; any markers that survive
//! are reported on the outcome, not retried.

use crate::llm::prompts::{
    json_repair_prompt, placeholder_repair_prompt, primary_prompt, TaskContext, PATCH_SYSTEM,
};
use crate::llm::{CompletionOptions, ModelClient};
use crate::patch::placeholder::offending_paths;
use crate::patch::{decode_patch, DecodeError, Patch};
use crate::util::{char_prefix, log_preview};
use std::fmt;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Length of the raw-response prefix carried by fatal errors.
pub const RAW_PREFIX_LEN: usize = 200;

/// A stage that issues one model call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Initial,
    JsonRepair,
    PlaceholderRepair,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Initial => "initial",
            Stage::JsonRepair => "json-repair",
            Stage::PlaceholderRepair => "placeholder-repair",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum PatchRequestError {
    #[error("model did not return usable structured output ({stage} stage: {reason}). Raw: {raw_prefix}")]
    NoStructuredOutput {
        stage: Stage,
        reason: String,
        raw_prefix: String,
    },
    #[error("model returned no changes ({stage} stage). Raw: {raw_prefix}")]
    NoChanges { stage: Stage, raw_prefix: String },
    #[error("model request failed ({stage} stage): {message}")]
    Model { stage: Stage, message: String },
}

/// Sampling settings per stage. Budgets grow to fit the extra instructions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LadderSettings {
    pub temperature: f32,
    pub initial_max_tokens: u32,
    pub json_repair_max_tokens: u32,
    pub placeholder_repair_max_tokens: u32,
}

impl Default for LadderSettings {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            initial_max_tokens: 1800,
            json_repair_max_tokens: 2000,
            placeholder_repair_max_tokens: 2200,
        }
    }
}

impl LadderSettings {
    pub fn options_for(&self, stage: Stage) -> CompletionOptions {
        let max_tokens = match stage {
            Stage::Initial => self.initial_max_tokens,
            Stage::JsonRepair => self.json_repair_max_tokens,
            Stage::PlaceholderRepair => self.placeholder_repair_max_tokens,
        };
        CompletionOptions {
            temperature: self.temperature,
            max_tokens,
        }
    }
}

/// Ladder position between model calls.
#[derive(Debug)]
pub enum LadderState {
    Initial,
    JsonRepair,
    PlaceholderRepair { offending: Vec<String> },
    Success(Patch),
    Failed(PatchRequestError),
}

impl LadderState {
    /// Next state after `stage` received `raw`.
    pub fn after_response(stage: Stage, raw: &str) -> LadderState {
        let decoded = decode_patch(raw);
        match (stage, decoded) {
            (_, Err(DecodeError::NoChanges)) => LadderState::Failed(PatchRequestError::NoChanges {
                stage,
                raw_prefix: char_prefix(raw, RAW_PREFIX_LEN),
            }),
            (Stage::Initial, Err(_)) => LadderState::JsonRepair,
            (_, Err(err)) => LadderState::Failed(PatchRequestError::NoStructuredOutput {
                stage,
                reason: err.to_string(),
                raw_prefix: char_prefix(raw, RAW_PREFIX_LEN),
            }),
            (Stage::PlaceholderRepair, Ok(patch)) => LadderState::Success(patch),
            (_, Ok(patch)) => Self::after_validation(patch),
        }
    }

    fn after_validation(patch: Patch) -> LadderState {
        let offending = offending_paths(&patch);
        if offending.is_empty() {
            LadderState::Success(patch)
        } else {
            LadderState::PlaceholderRepair { offending }
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, LadderState::Success(_) | LadderState::Failed(_))
    }
}

/// A patch accepted by the ladder.
#[derive(Debug, Clone)]
pub struct PatchOutcome {
    pub patch: Patch,
    /// Stages that issued a model call, in order.
    pub stages: Vec<Stage>,
    /// Paths that still carry markers after the single placeholder repair.
    pub unresolved_placeholders: Vec<String>,
}

impl PatchOutcome {
    pub fn model_calls(&self) -> usize {
        self.stages.len()
    }
}

pub struct PatchRequester<M> {
    model: M,
    settings: LadderSettings,
}

impl<M: ModelClient> PatchRequester<M> {
    pub fn new(model: M, settings: LadderSettings) -> Self {
        Self { model, settings }
    }

    /// Drive the ladder to a terminal state.
    pub fn request_patch(&self, task: &TaskContext) -> Result<PatchOutcome, PatchRequestError> {
        let mut state = LadderState::Initial;
        let mut stages = Vec::new();

        loop {
            let (stage, prompt) = match state {
                LadderState::Initial => (Stage::Initial, primary_prompt(task)),
                LadderState::JsonRepair => (Stage::JsonRepair, json_repair_prompt(task)),
                LadderState::PlaceholderRepair { ref offending } => {
                    warn!(files = ?offending, "placeholders in generated content, requesting repair");
                    (
                        Stage::PlaceholderRepair,
                        placeholder_repair_prompt(task, offending),
                    )
                }
                LadderState::Success(patch) => {
                    let unresolved = if stages.last() == Some(&Stage::PlaceholderRepair) {
                        offending_paths(&patch)
                    } else {
                        Vec::new()
                    };
                    if !unresolved.is_empty() {
                        warn!(files = ?unresolved, "placeholders remain after repair, accepting patch");
                    }
                    info!(
                        changes = patch.changes.len(),
                        calls = stages.len(),
                        "patch accepted"
                    );
                    return Ok(PatchOutcome {
                        patch,
                        stages,
                        unresolved_placeholders: unresolved,
                    });
                }
                LadderState::Failed(err) => return Err(err),
            };

            info!(stage = %stage, "requesting patch from model");
            stages.push(stage);
            state = match self.model.complete(
                PATCH_SYSTEM,
                &prompt,
                self.settings.options_for(stage),
            ) {
                Ok(raw) => {
                    let raw = raw.trim();
                    debug!(stage = %stage, raw = %log_preview(raw, RAW_PREFIX_LEN), "model response");
                    LadderState::after_response(stage, raw)
                }
                Err(err) => LadderState::Failed(PatchRequestError::Model {
                    stage,
                    message: format!("{:#}", err),
                }),
            };
        }
    }
}
