use serde::{Deserialize, Serialize};

use crate::models::{Message, Role};

/// One role/content pair sent to a completion backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionOptions {
    /// Upper bound on generated tokens, already clamped by the context assembler
    pub max_response_tokens: Option<usize>,
    pub temperature: Option<f32>,
}

/// A snippet returned by the retrieval service. Lives for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Passage {
    pub text: String,
    pub rank: usize,
}

impl PromptMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }
}

impl From<&Message> for PromptMessage {
    fn from(msg: &Message) -> Self {
        Self::new(msg.role(), msg.content())
    }
}

impl CompletionOptions {
    pub fn with_max_response_tokens(mut self, tokens: usize) -> Self {
        self.max_response_tokens = Some(tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

impl Passage {
    pub fn new(text: impl Into<String>, rank: usize) -> Self {
        Self {
            text: text.into(),
            rank,
        }
    }
}
