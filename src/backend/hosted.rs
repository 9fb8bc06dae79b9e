#[cfg(test)]
#[path = "hosted_test.rs"]
mod tests;

use crate::backend::utils::{
    REASONING_TITLE_MAX_TOKENS, clean_title, title_options, title_prompt,
};
use crate::backend::{Provider, TextStream};
use crate::config::{
    ProviderConfig,
    constants::{DEFAULT_HOSTED_ENDPOINT, DEFAULT_MODEL, FALLBACK_TITLE},
    user_agent,
};
use crate::models::{CompletionOptions, PromptMessage, Role};
use async_trait::async_trait;
use eyre::{Context, Result};
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use std::{fmt::Display, time};
use thiserror::Error;
use tokio::io::AsyncBufReadExt;
use tokio_util::io::StreamReader;

/// Reasoning-tier models that reject the "system" role
const REASONING_MODELS: &[&str] = &["o1", "o3", "o3-mini", "o4-mini"];

const REASONING_SYSTEM_ROLE: &str = "developer";

const REASONING_SYSTEM_PREFIX: &str = "Formatting re-enabled\n";

/// An OpenAI-compatible chat completion API.
pub struct Hosted {
    alias: String,
    endpoint: String,
    api_key: Option<String>,
    timeout: Option<time::Duration>,
    model: String,
}

#[async_trait]
impl Provider for Hosted {
    fn name(&self) -> &str {
        &self.alias
    }

    async fn complete(
        &self,
        messages: Vec<PromptMessage>,
        options: CompletionOptions,
    ) -> Result<String> {
        let res = self.chat_completion(&messages, &options, false).await?;
        let res = res
            .json::<CompletionResponse>()
            .await
            .wrap_err("parsing completion response")?;

        Ok(res
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }

    async fn complete_stream(
        &self,
        messages: Vec<PromptMessage>,
        options: CompletionOptions,
    ) -> Result<TextStream> {
        let res = self.chat_completion(&messages, &options, true).await?;

        let stream = res.bytes_stream().map_err(|e| {
            let err_msg = e.to_string();
            std::io::Error::new(std::io::ErrorKind::Interrupted, err_msg)
        });
        let lines = StreamReader::new(stream).lines();

        let deltas = futures::stream::try_unfold(lines, |mut lines| async move {
            while let Some(line) = lines
                .next_line()
                .await
                .wrap_err("reading completion stream")?
            {
                let line = line.trim();
                log::trace!("streaming response: {}", line);
                let data = match line.strip_prefix("data:") {
                    Some(data) => data.trim_start(),
                    None => continue,
                };

                if data == "[DONE]" {
                    return Ok(None);
                }

                let chunk = serde_json::from_str::<CompletionChunk>(data)
                    .wrap_err(format!("parsing completion response line: {}", data))?;

                let text = match chunk.choices.into_iter().next().and_then(|c| c.delta.content) {
                    Some(text) => text,
                    None => continue,
                };
                return Ok(Some((text, lines)));
            }
            Ok::<_, eyre::Report>(None)
        });

        Ok(Box::pin(deltas))
    }

    fn supports_moderation(&self) -> bool {
        true
    }

    async fn moderate(&self, text: String) -> bool {
        match self.moderation(&text).await {
            Ok(flagged) => flagged,
            Err(err) => {
                log::warn!("Moderation check failed, allowing message: {:#}", err);
                false
            }
        }
    }

    fn supports_titles(&self) -> bool {
        true
    }

    async fn generate_title(&self, first_message: String) -> String {
        match self
            .complete(title_prompt(&first_message), self.title_request_options())
            .await
        {
            Ok(raw) => clean_title(&raw),
            Err(err) => {
                log::warn!("Title generation failed: {:#}", err);
                FALLBACK_TITLE.to_string()
            }
        }
    }
}

impl From<&ProviderConfig> for Hosted {
    fn from(value: &ProviderConfig) -> Self {
        let mut hosted = Hosted::default()
            .with_endpoint(value.endpoint())
            .with_model(&value.model);

        if let Some(api_key) = value.api_key.as_deref() {
            hosted = hosted.with_api_key(api_key);
        }

        if let Some(timeout) = value.timeout() {
            hosted = hosted.with_timeout(timeout);
        }
        hosted
    }
}

impl Hosted {
    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.trim_end_matches('/').to_string();
        self
    }

    pub fn with_api_key(mut self, api_key: &str) -> Self {
        self.api_key = Some(api_key.to_string());
        self
    }

    pub fn with_timeout(mut self, timeout: time::Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    fn title_request_options(&self) -> CompletionOptions {
        match is_reasoning_model(&self.model) {
            true => title_options().with_max_response_tokens(REASONING_TITLE_MAX_TOKENS),
            false => title_options(),
        }
    }

    fn request(&self, path: &str) -> reqwest::RequestBuilder {
        let mut req = reqwest::Client::new()
            .post(format!("{}{}", self.endpoint, path))
            .header("Content-Type", "application/json")
            .header("User-Agent", user_agent());

        if let Some(timeout) = self.timeout {
            req = req.timeout(timeout);
        }

        if let Some(token) = &self.api_key {
            req = req.bearer_auth(token);
        }
        req
    }

    async fn chat_completion(
        &self,
        messages: &[PromptMessage],
        options: &CompletionOptions,
        stream: bool,
    ) -> Result<reqwest::Response> {
        let completion_req = self.completion_request(messages, options, stream);
        log::trace!("Sending completion request: {:?}", completion_req);

        let res = self
            .request("/v1/chat/completions")
            .json(&completion_req)
            .send()
            .await
            .wrap_err("sending completion request")?;

        if !res.status().is_success() {
            return Err(error_from_response(res).await.into());
        }
        Ok(res)
    }

    fn completion_request(
        &self,
        messages: &[PromptMessage],
        options: &CompletionOptions,
        stream: bool,
    ) -> CompletionRequest {
        // Reasoning models only accept the default temperature.
        let temperature = match is_reasoning_model(&self.model) {
            true => None,
            false => options.temperature,
        };
        CompletionRequest {
            model: self.model.clone(),
            messages: to_message_requests(&self.model, messages),
            stream,
            max_completion_tokens: options.max_response_tokens,
            temperature,
        }
    }

    async fn moderation(&self, text: &str) -> Result<bool> {
        let res = self
            .request("/v1/moderations")
            .json(&ModerationRequest { input: text })
            .send()
            .await
            .wrap_err("sending moderation request")?;

        if !res.status().is_success() {
            return Err(error_from_response(res).await.into());
        }

        let res = res
            .json::<ModerationResponse>()
            .await
            .wrap_err("parsing moderation response")?;
        Ok(res.results.iter().any(|r| r.flagged))
    }
}

impl Default for Hosted {
    fn default() -> Self {
        Self {
            alias: "Hosted".to_string(),
            endpoint: DEFAULT_HOSTED_ENDPOINT.to_string(),
            api_key: None,
            timeout: None,
            model: DEFAULT_MODEL.to_string(),
        }
    }
}

/// Matches the reasoning-tier ids and their dated snapshots, e.g.
/// "o3-mini-2025-01-31".
pub(crate) fn is_reasoning_model(model: &str) -> bool {
    REASONING_MODELS.iter().any(|base| {
        model == *base
            || model
                .strip_prefix(base)
                .and_then(|rest| rest.strip_prefix('-'))
                .is_some_and(|rest| rest.starts_with("20"))
    })
}

fn to_message_requests(model: &str, messages: &[PromptMessage]) -> Vec<MessageRequest> {
    let reasoning = is_reasoning_model(model);
    messages
        .iter()
        .map(|msg| match msg.role {
            Role::System if reasoning => MessageRequest {
                role: REASONING_SYSTEM_ROLE.to_string(),
                content: format!("{}{}", REASONING_SYSTEM_PREFIX, msg.content),
            },
            role => MessageRequest {
                role: role.as_str().to_string(),
                content: msg.content.clone(),
            },
        })
        .collect()
}

async fn error_from_response(res: reqwest::Response) -> HostedError {
    let http_code = res.status().as_u16();
    let body = res.text().await.unwrap_or_default();
    log::error!("Error response: {}", body);
    let mut err = serde_json::from_str::<ErrorResponse>(&body)
        .map(|e| e.error)
        .unwrap_or_else(|_| HostedError {
            message: body,
            ..Default::default()
        });
    err.http_code = http_code;
    err
}

#[derive(Default, Debug, Clone, Serialize, Deserialize)]
struct MessageRequest {
    role: String,
    content: String,
}

#[derive(Default, Debug, Serialize, Deserialize)]
struct CompletionRequest {
    model: String,
    messages: Vec<MessageRequest>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Default, Debug, Serialize, Deserialize)]
struct CompletionMessageResponse {
    content: Option<String>,
}

#[derive(Default, Debug, Serialize, Deserialize)]
struct CompletionChoiceResponse {
    message: CompletionMessageResponse,
}

#[derive(Default, Debug, Serialize, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoiceResponse>,
}

#[derive(Default, Debug, Serialize, Deserialize)]
struct CompletionDeltaResponse {
    content: Option<String>,
}

#[derive(Default, Debug, Serialize, Deserialize)]
struct CompletionChunkChoice {
    delta: CompletionDeltaResponse,
    finish_reason: Option<String>,
}

#[derive(Default, Debug, Serialize, Deserialize)]
struct CompletionChunk {
    choices: Vec<CompletionChunkChoice>,
}

#[derive(Debug, Serialize)]
struct ModerationRequest<'a> {
    input: &'a str,
}

#[derive(Default, Debug, Serialize, Deserialize)]
struct ModerationResult {
    flagged: bool,
}

#[derive(Default, Debug, Serialize, Deserialize)]
struct ModerationResponse {
    results: Vec<ModerationResult>,
}

#[derive(Default, Debug, Serialize, Deserialize)]
struct ErrorResponse {
    error: HostedError,
}

#[derive(Default, Error, Debug, Serialize, Deserialize)]
pub struct HostedError {
    #[serde(skip)]
    pub http_code: u16,
    pub message: String,
    #[serde(rename = "type", default)]
    pub err_type: Option<String>,
    #[serde(default)]
    pub param: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
}

impl Display for HostedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "hosted provider error ({}): {}", self.http_code, self.message)
    }
}
