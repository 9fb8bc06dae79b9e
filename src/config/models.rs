use serde::{Deserialize, Serialize};
use std::{fmt::Display, time};

use super::constants::{
    DEFAULT_HOSTED_ENDPOINT, DEFAULT_LOCAL_ENDPOINT, DEFAULT_REACH, DEFAULT_RESPONSE_TOKENS,
    MODEL_MAX_TOKENS, RETRIEVAL_TIMEOUT_SECS,
};
use super::defaults::*;

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct Configuration {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub log: LogConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub provider: ProviderConfig,

    #[serde(default)]
    pub context: ContextConfig,

    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ServerConfig {
    #[serde(default = "bind")]
    pub bind: String,

    /// Header carrying the numeric user id set by the upstream auth layer
    #[serde(default = "identity_header")]
    pub identity_header: String,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct LogConfig {
    #[serde(default = "log_level")]
    pub level: Option<String>,

    #[serde(default)]
    pub filters: Option<Vec<LogFilter>>,

    #[serde(default)]
    pub file: Option<LogFile>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct LogFilter {
    #[serde(default)]
    pub module: Option<String>,

    #[serde(default)]
    pub level: Option<String>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct LogFile {
    pub path: String,

    #[serde(default)]
    pub append: bool,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub enum StorageConfig {
    #[serde(rename = "sqlite")]
    Sqlite(SqliteStorage),
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct SqliteStorage {
    pub path: Option<String>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ProviderConfig {
    #[serde(default)]
    pub kind: ProviderKind,

    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "model")]
    pub model: String,

    #[serde(default)]
    pub timeout_secs: Option<u64>,

    #[serde(default = "default_true")]
    pub moderation: bool,
}

#[derive(Hash, PartialEq, Eq, Deserialize, Serialize, Debug, Clone, Copy, Default)]
pub enum ProviderKind {
    #[default]
    #[serde(rename = "hosted")]
    Hosted,
    #[serde(rename = "local")]
    Local,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ContextConfig {
    #[serde(default = "system_prompt")]
    pub system_prompt: String,

    #[serde(default = "model_max_tokens")]
    pub model_max_tokens: usize,

    #[serde(default = "default_response_tokens")]
    pub default_response_tokens: usize,

    #[serde(default = "reach")]
    pub reach: usize,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct RetrievalConfig {
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default)]
    pub universe: String,

    #[serde(default)]
    pub token: Option<String>,

    #[serde(default = "retrieval_timeout_secs")]
    pub timeout_secs: u64,
}

impl ProviderConfig {
    pub fn endpoint(&self) -> &str {
        match self.endpoint.as_deref() {
            Some(endpoint) if !endpoint.is_empty() => endpoint.trim_end_matches('/'),
            _ => match self.kind {
                ProviderKind::Hosted => DEFAULT_HOSTED_ENDPOINT,
                ProviderKind::Local => DEFAULT_LOCAL_ENDPOINT,
            },
        }
    }

    pub fn timeout(&self) -> Option<time::Duration> {
        self.timeout_secs.map(time::Duration::from_secs)
    }
}

impl RetrievalConfig {
    pub fn enabled(&self) -> bool {
        self.url.as_deref().is_some_and(|url| !url.trim().is_empty())
    }

    pub fn timeout(&self) -> time::Duration {
        time::Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: bind(),
            identity_header: identity_header(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Some("info".to_string()),
            filters: None,
            file: None,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Sqlite(SqliteStorage::default())
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::default(),
            endpoint: None,
            api_key: None,
            model: model(),
            timeout_secs: None,
            moderation: true,
        }
    }
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            system_prompt: system_prompt(),
            model_max_tokens: MODEL_MAX_TOKENS,
            default_response_tokens: DEFAULT_RESPONSE_TOKENS,
            reach: DEFAULT_REACH,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            url: None,
            universe: String::new(),
            token: None,
            timeout_secs: RETRIEVAL_TIMEOUT_SECS,
        }
    }
}

impl Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::Hosted => write!(f, "hosted"),
            ProviderKind::Local => write!(f, "local"),
        }
    }
}
