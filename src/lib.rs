//! patchpilot library crate
//!
//! A code agent that turns an issue (or review feedback on its own pull
//! request) into a pushed patch, and a reviewer that judges the result. The
//! two coordinate through three pull request labels.

pub mod agent;
pub mod config;
pub mod context;
pub mod coordinator;
pub mod git_ops;
pub mod github;
pub mod labels;
pub mod llm;
pub mod logging;
pub mod patch;
pub mod requester;
pub mod reviewer;
pub mod util;

#[cfg(test)]
mod test_support;
