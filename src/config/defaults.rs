use super::constants::*;

pub(crate) fn bind() -> String {
    DEFAULT_BIND.to_string()
}

pub(crate) fn identity_header() -> String {
    DEFAULT_IDENTITY_HEADER.to_string()
}

pub(crate) fn model() -> String {
    DEFAULT_MODEL.to_string()
}

pub(crate) fn model_max_tokens() -> usize {
    MODEL_MAX_TOKENS
}

pub(crate) fn default_response_tokens() -> usize {
    DEFAULT_RESPONSE_TOKENS
}

pub(crate) fn reach() -> usize {
    DEFAULT_REACH
}

pub(crate) fn system_prompt() -> String {
    SYSTEM_PROMPT.to_string()
}

pub(crate) fn retrieval_timeout_secs() -> u64 {
    RETRIEVAL_TIMEOUT_SECS
}

pub(crate) fn log_level() -> Option<String> {
    Some("info".to_string())
}

pub(crate) fn default_true() -> bool {
    true
}
