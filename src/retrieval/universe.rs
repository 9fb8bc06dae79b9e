#[cfg(test)]
#[path = "universe_test.rs"]
mod tests;

use std::time;

use async_trait::async_trait;
use eyre::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    config::{RetrievalConfig, constants::RETRIEVAL_TIMEOUT_SECS, user_agent},
    models::Passage,
    retrieval::Retriever,
};

/// Client of the Universe knowledge-search service.
pub struct Universe {
    endpoint: String,
    universe: String,
    token: Option<String>,
    timeout: time::Duration,
}

#[async_trait]
impl Retriever for Universe {
    async fn retrieve(&self, query: String, reach: usize) -> Vec<Passage> {
        match self.resonate(&query, reach).await {
            Ok(passages) => {
                log::debug!("Universe returned {} passages", passages.len());
                passages
            }
            Err(err) => {
                log::warn!("Retrieval failed, continuing without context: {:#}", err);
                vec![]
            }
        }
    }
}

impl From<&RetrievalConfig> for Universe {
    fn from(value: &RetrievalConfig) -> Self {
        let mut universe = Universe::default()
            .with_endpoint(value.url.as_deref().unwrap_or_default())
            .with_universe(&value.universe)
            .with_timeout(value.timeout());

        if let Some(token) = value.token.as_deref() {
            universe = universe.with_token(token);
        }
        universe
    }
}

impl Universe {
    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.trim_end_matches('/').to_string();
        self
    }

    pub fn with_universe(mut self, universe: &str) -> Self {
        self.universe = universe.to_string();
        self
    }

    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }

    pub fn with_timeout(mut self, timeout: time::Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn resonate(&self, query: &str, reach: usize) -> Result<Vec<Passage>> {
        let body = ResonateRequest {
            universe: &self.universe,
            thing: query,
            reach,
        };

        let mut req = reqwest::Client::new()
            .post(format!("{}/resonate", self.endpoint))
            .header("User-Agent", user_agent())
            .timeout(self.timeout);

        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }

        log::trace!("Sending resonate request: {:?}", body);

        let res = req
            .json(&body)
            .send()
            .await
            .wrap_err("sending resonate request")?;

        if !res.status().is_success() {
            let http_code = res.status().as_u16();
            let text = res.text().await.unwrap_or_default();
            bail!("universe responded with {}: {}", http_code, text);
        }

        let res = res
            .json::<ResonateResponse>()
            .await
            .wrap_err("parsing resonate response")?;

        if !res.status.as_ref().is_some_and(is_success) {
            bail!("universe reported failure status: {:?}", res.status);
        }

        let results = match res.results {
            Some(Value::Array(results)) => results,
            other => bail!("universe results is not a list: {:?}", other),
        };

        Ok(results
            .iter()
            .filter_map(|item| item.get("thing").and_then(Value::as_str))
            .filter(|text| !text.trim().is_empty())
            .enumerate()
            .map(|(rank, text)| Passage::new(text, rank))
            .collect())
    }
}

impl Default for Universe {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            universe: String::new(),
            token: None,
            timeout: time::Duration::from_secs(RETRIEVAL_TIMEOUT_SECS),
        }
    }
}

fn is_success(status: &Value) -> bool {
    match status {
        Value::Bool(ok) => *ok,
        Value::String(status) => status.eq_ignore_ascii_case("success"),
        _ => false,
    }
}

#[derive(Debug, Serialize)]
struct ResonateRequest<'a> {
    universe: &'a str,
    thing: &'a str,
    reach: usize,
}

#[derive(Debug, Default, Deserialize)]
struct ResonateResponse {
    #[serde(default)]
    status: Option<Value>,
    #[serde(default)]
    results: Option<Value>,
}
