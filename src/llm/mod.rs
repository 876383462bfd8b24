//! Language-model capability.
//!
//! The rest of the crate only needs "system + user prompt in, text out";
//! [`ModelClient`] is that seam, and [`yandex::YandexGptClient`] is the
//! production backend.

pub mod prompts;
pub mod yandex;

use anyhow::Result;

/// Sampling options for a single completion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletionOptions {
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Blocking text completion.
pub trait ModelClient {
    /// Return the model's text answer, or a transport/shape error.
    fn complete(&self, system: &str, user: &str, options: CompletionOptions) -> Result<String>;
}

impl<T: ModelClient + ?Sized> ModelClient for &T {
    fn complete(&self, system: &str, user: &str, options: CompletionOptions) -> Result<String> {
        (**self).complete(system, user, options)
    }
}
