//! YandexGPT foundation-models completion backend.

use super::{CompletionOptions, ModelClient};
use crate::util::sanitize_error_body;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Completion endpoint of the foundation-models API.
pub const YANDEX_ENDPOINT: &str = "https://llm.api.cloud.yandex.net/foundationModels/v1/completion";

/// Model used when none is configured.
pub const DEFAULT_MODEL: &str = "yandexgpt-lite";

pub(crate) const REQUEST_TIMEOUT_SECS: u64 = 60;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CompletionRequest<'a> {
    model_uri: String,
    completion_options: RequestOptions,
    messages: [Message<'a>; 2],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RequestOptions {
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    text: &'a str,
}

#[derive(Deserialize)]
struct CompletionResponse {
    result: CompletionResult,
}

#[derive(Deserialize)]
struct CompletionResult {
    #[serde(default)]
    alternatives: Vec<Alternative>,
}

#[derive(Deserialize)]
struct Alternative {
    message: AlternativeMessage,
}

#[derive(Deserialize)]
struct AlternativeMessage {
    text: String,
}

/// Credentials and model selection for YandexGPT.
#[derive(Debug, Clone)]
pub struct YandexSettings {
    pub iam_token: String,
    pub folder_id: String,
    pub model: String,
    pub endpoint: String,
}

pub struct YandexGptClient {
    settings: YandexSettings,
    http: reqwest::blocking::Client,
}

impl YandexGptClient {
    pub fn new(settings: YandexSettings) -> Result<Self> {
        if settings.iam_token.is_empty() {
            return Err(anyhow!("Missing YANDEX_IAM_TOKEN"));
        }
        if settings.folder_id.is_empty() {
            return Err(anyhow!("Missing YANDEX_FOLDER_ID"));
        }
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { settings, http })
    }

    fn model_uri(&self) -> String {
        format!("gpt://{}/{}", self.settings.folder_id, self.settings.model)
    }
}

impl ModelClient for YandexGptClient {
    fn complete(&self, system: &str, user: &str, options: CompletionOptions) -> Result<String> {
        let request = CompletionRequest {
            model_uri: self.model_uri(),
            completion_options: RequestOptions {
                temperature: options.temperature,
                max_tokens: options.max_tokens,
            },
            messages: [
                Message {
                    role: "system",
                    text: system,
                },
                Message { role: "user", text: user },
            ],
        };

        debug!(
            model = %self.settings.model,
            max_tokens = options.max_tokens,
            "sending completion request"
        );

        let resp = self
            .http
            .post(&self.settings.endpoint)
            .header("Authorization", format!("Bearer {}", self.settings.iam_token))
            .header("x-folder-id", &self.settings.folder_id)
            .json(&request)
            .send()
            .context("Failed to send completion request")?;

        let status = resp.status();
        let body = resp.text().context("Failed to read completion response")?;
        if !status.is_success() {
            return Err(anyhow!(
                "YandexGPT API error ({}): {}",
                status,
                sanitize_error_body(&body)
            ));
        }

        extract_text(&body)
    }
}

/// Pull `result.alternatives[0].message.text` out of a response body.
fn extract_text(body: &str) -> Result<String> {
    let parsed: CompletionResponse = serde_json::from_str(body).map_err(|e| {
        anyhow!(
            "Unexpected YandexGPT response shape ({}): {}",
            e,
            sanitize_error_body(body)
        )
    })?;
    parsed
        .result
        .alternatives
        .into_iter()
        .next()
        .map(|alt| alt.message.text)
        .ok_or_else(|| {
            anyhow!(
                "Unexpected YandexGPT response shape: no alternatives in {}",
                sanitize_error_body(body)
            )
        })
}
