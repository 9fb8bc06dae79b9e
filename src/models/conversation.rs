#[cfg(test)]
#[path = "conversation_test.rs"]
mod tests;

use serde::Serialize;

use crate::{config::constants::PLACEHOLDER_TITLE, models::Message};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    id: i64,
    title: String,
    owner_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    share_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    shared_at: Option<chrono::DateTime<chrono::Utc>>,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl Conversation {
    pub fn new(owner_id: i64) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: 0,
            title: PLACEHOLDER_TITLE.to_string(),
            owner_id,
            share_token: None,
            shared_at: None,
            created_at: now,
            updated_at: Some(now),
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.id = id;
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_created_at(mut self, timestamp: chrono::DateTime<chrono::Utc>) -> Self {
        self.created_at = timestamp;
        if self.updated_at.is_none() {
            self.updated_at = Some(timestamp);
        }
        self
    }

    pub fn with_updated_at(mut self, timestamp: chrono::DateTime<chrono::Utc>) -> Self {
        self.updated_at = Some(timestamp);
        self
    }

    pub fn with_share(
        mut self,
        token: impl Into<String>,
        shared_at: chrono::DateTime<chrono::Utc>,
    ) -> Self {
        self.share_token = Some(token.into());
        self.shared_at = Some(shared_at);
        self
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn owner_id(&self) -> i64 {
        self.owner_id
    }

    pub fn share_token(&self) -> Option<&str> {
        self.share_token.as_deref()
    }

    pub fn shared_at(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        self.shared_at
    }

    pub fn created_at(&self) -> chrono::DateTime<chrono::Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> chrono::DateTime<chrono::Utc> {
        self.updated_at.unwrap_or(self.created_at)
    }

    /// Messages a share link exposes: only those created at or before the
    /// share timestamp. Nothing is visible when the conversation is not shared.
    pub fn shared_view<'a>(&self, messages: &'a [Message]) -> Vec<&'a Message> {
        let shared_at = match self.shared_at {
            Some(shared_at) => shared_at,
            None => return vec![],
        };
        messages
            .iter()
            .filter(|msg| msg.created_at() <= shared_at)
            .collect()
    }
}
