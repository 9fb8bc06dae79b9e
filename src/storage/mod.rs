pub mod sqlite;

use std::sync::Arc;

use crate::{
    config::StorageConfig,
    models::{Conversation, Message},
};
use async_trait::async_trait;
use eyre::Result;
use sqlite::Sqlite;

/// Conversation and message persistence. Every conversation lookup is scoped
/// to its owner; a conversation owned by someone else behaves as absent.
#[async_trait]
pub trait Storage {
    async fn create_conversation(&self, conversation: Conversation) -> Result<Conversation>;
    async fn get_conversation(&self, id: i64, owner_id: i64) -> Result<Option<Conversation>>;
    async fn get_conversations(&self, owner_id: i64) -> Result<Vec<Conversation>>;
    async fn update_title(&self, id: i64, owner_id: i64, title: String) -> Result<bool>;
    async fn delete_conversation(&self, id: i64, owner_id: i64) -> Result<bool>;

    /// Messages of a conversation in ascending creation order.
    async fn get_messages(&self, conversation_id: i64) -> Result<Vec<Message>>;
    /// Appends a message and returns it with its assigned id.
    async fn add_message(&self, conversation_id: i64, message: Message) -> Result<Message>;

    async fn share_conversation(
        &self,
        id: i64,
        owner_id: i64,
        shared_at: chrono::DateTime<chrono::Utc>,
    ) -> Result<Option<Conversation>>;
    async fn unshare_conversation(&self, id: i64, owner_id: i64) -> Result<bool>;
    /// The shared conversation and only the messages created at or before
    /// its share timestamp.
    async fn get_shared(&self, token: String) -> Result<Option<(Conversation, Vec<Message>)>>;
}

pub type ArcStorage = Arc<dyn Storage + Send + Sync>;

pub async fn new_storage(config: &StorageConfig) -> Result<ArcStorage> {
    let storage = match config {
        StorageConfig::Sqlite(sqlite_config) => {
            Arc::new(Sqlite::new(sqlite_config.path.as_deref()).await?)
        }
    };
    Ok(storage)
}
