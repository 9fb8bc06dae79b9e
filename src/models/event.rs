#[cfg(test)]
#[path = "event_test.rs"]
mod tests;

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;

use crate::models::Role;

/// Events delivered to the client over the send-message event stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum ChatEvent {
    #[serde(rename = "userMessage", rename_all = "camelCase")]
    UserMessage {
        message_id: i64,
        role: Role,
        content: String,
    },
    #[serde(rename = "chunk")]
    Chunk { content: String },
    #[serde(rename = "final", rename_all = "camelCase")]
    Final {
        message_id: Option<i64>,
        role: Role,
        content: String,
    },
    #[serde(rename = "titleUpdate", rename_all = "camelCase")]
    TitleUpdate { convo_id: i64, new_title: String },
    #[serde(rename = "error")]
    Error { message: String },
    #[serde(rename = "done")]
    Done,
}

#[async_trait::async_trait]
pub trait EventTx {
    async fn send(&self, event: ChatEvent) -> Result<(), mpsc::error::SendError<ChatEvent>>;
}

#[async_trait::async_trait]
impl EventTx for mpsc::Sender<ChatEvent> {
    async fn send(&self, event: ChatEvent) -> Result<(), mpsc::error::SendError<ChatEvent>> {
        self.send(event).await
    }
}

#[async_trait::async_trait]
impl EventTx for mpsc::UnboundedSender<ChatEvent> {
    async fn send(&self, event: ChatEvent) -> Result<(), mpsc::error::SendError<ChatEvent>> {
        self.send(event)
    }
}

pub type ArcEventTx = Arc<dyn EventTx + Send + Sync>;
