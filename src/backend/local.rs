#[cfg(test)]
#[path = "local_test.rs"]
mod tests;

use crate::backend::utils::{clean_title, flatten_prompt, title_options, title_prompt};
use crate::backend::{Provider, TextStream};
use crate::config::{
    ProviderConfig,
    constants::{DEFAULT_LOCAL_ENDPOINT, DEFAULT_MODEL, FALLBACK_TITLE},
    user_agent,
};
use crate::models::{CompletionOptions, PromptMessage};
use async_trait::async_trait;
use eyre::{Context, Result, bail};
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use std::time;
use tokio::io::AsyncBufReadExt;
use tokio_util::io::StreamReader;

/// A locally hosted model server speaking the Ollama generate API.
///
/// Streaming responses are newline-delimited JSON objects, one per fragment,
/// the last one carrying `"done": true`.
pub struct Local {
    alias: String,
    endpoint: String,
    timeout: Option<time::Duration>,
    model: String,
}

#[async_trait]
impl Provider for Local {
    fn name(&self) -> &str {
        &self.alias
    }

    async fn complete(
        &self,
        messages: Vec<PromptMessage>,
        options: CompletionOptions,
    ) -> Result<String> {
        let res = self.generate(&messages, &options, false).await?;
        let res = res
            .json::<GenerateResponse>()
            .await
            .wrap_err("parsing generate response")?;

        if let Some(err) = res.error {
            bail!("local provider error: {}", err);
        }
        Ok(res.response)
    }

    async fn complete_stream(
        &self,
        messages: Vec<PromptMessage>,
        options: CompletionOptions,
    ) -> Result<TextStream> {
        let res = self.generate(&messages, &options, true).await?;

        let stream = res.bytes_stream().map_err(|e| {
            let err_msg = e.to_string();
            std::io::Error::new(std::io::ErrorKind::Interrupted, err_msg)
        });
        let lines = StreamReader::new(stream).lines();

        let fragments = futures::stream::try_unfold(lines, |mut lines| async move {
            while let Some(line) = lines
                .next_line()
                .await
                .wrap_err("reading generate stream")?
            {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                log::trace!("streaming response: {}", line);

                let chunk = serde_json::from_str::<GenerateResponse>(line)
                    .wrap_err(format!("parsing generate response line: {}", line))?;
                if let Some(err) = chunk.error {
                    bail!("local provider error: {}", err);
                }
                if chunk.done && chunk.response.is_empty() {
                    return Ok(None);
                }
                if chunk.response.is_empty() {
                    continue;
                }
                return Ok(Some((chunk.response, lines)));
            }
            Ok::<_, eyre::Report>(None)
        });

        Ok(Box::pin(fragments))
    }

    fn supports_titles(&self) -> bool {
        true
    }

    async fn generate_title(&self, first_message: String) -> String {
        match self
            .complete(title_prompt(&first_message), title_options())
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

impl From<&ProviderConfig> for Local {
    fn from(value: &ProviderConfig) -> Self {
        let mut local = Local::default()
            .with_endpoint(value.endpoint())
            .with_model(&value.model);

        if let Some(timeout) = value.timeout() {
            local = local.with_timeout(timeout);
        }
        local
    }
}

impl Local {
    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.trim_end_matches('/').to_string();
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

    async fn generate(
        &self,
        messages: &[PromptMessage],
        options: &CompletionOptions,
        stream: bool,
    ) -> Result<reqwest::Response> {
        let generate_req = GenerateRequest {
            model: self.model.clone(),
            prompt: flatten_prompt(messages),
            stream,
            options: GenerateOptions {
                num_predict: options.max_response_tokens,
                temperature: options.temperature,
            },
        };
        log::trace!("Sending generate request: {:?}", generate_req);

        let mut req = reqwest::Client::new()
            .post(format!("{}/api/generate", self.endpoint))
            .header("Content-Type", "application/json")
            .header("User-Agent", user_agent());

        if let Some(timeout) = self.timeout {
            req = req.timeout(timeout);
        }

        let res = req
            .json(&generate_req)
            .send()
            .await
            .wrap_err("sending generate request")?;

        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            log::error!("Error response: {}", body);
            let message = serde_json::from_str::<GenerateResponse>(&body)
                .ok()
                .and_then(|r| r.error)
                .unwrap_or(body);
            bail!("local provider error ({}): {}", status.as_u16(), message);
        }
        Ok(res)
    }
}

impl Default for Local {
    fn default() -> Self {
        Self {
            alias: "Local".to_string(),
            endpoint: DEFAULT_LOCAL_ENDPOINT.to_string(),
            timeout: None,
            model: DEFAULT_MODEL.to_string(),
        }
    }
}

#[derive(Default, Debug, Serialize, Deserialize)]
struct GenerateOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Default, Debug, Serialize, Deserialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Default, Debug, Serialize, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}
