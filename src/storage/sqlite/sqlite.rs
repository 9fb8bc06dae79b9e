#[cfg(test)]
#[path = "sqlite_test.rs"]
mod tests;

use async_trait::async_trait;
use eyre::{Context, Result};
use tokio_rusqlite::{Connection, OpenFlags, Row, named_params, params};

use crate::models::{Conversation, Message, Role};
use crate::storage::Storage;

use super::migration::MIGRATION;

const SELECT_CONVERSATION: &str =
    "SELECT id, title, owner_id, share_token, shared_at, created_at, updated_at FROM conversations";

pub struct Sqlite {
    conn: Connection,
}

/// Raw conversation columns, converted to the model outside the connection thread.
type ConversationRow = (i64, String, i64, Option<String>, Option<i64>, i64, i64);

/// Raw message columns.
type MessageRow = (i64, i64, String, String, i64);

impl Sqlite {
    pub async fn new(path: Option<&str>) -> Result<Self> {
        let conn = match path {
            Some(path) => Connection::open_with_flags(
                path,
                OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
            )
            .await
            .wrap_err(format!("opening database path: {}", path))?,
            None => Connection::open_in_memory()
                .await
                .wrap_err("opening in-memory database")?,
        };

        let ret = Self { conn };
        ret.run_migration().await.wrap_err("running migration")?;
        Ok(ret)
    }

    async fn run_migration(&self) -> Result<()> {
        self.conn
            .call(|conn| Ok(conn.execute_batch(MIGRATION)?))
            .await
            .wrap_err("executing migration")?;
        Ok(())
    }
}

#[async_trait]
impl Storage for Sqlite {
    async fn create_conversation(&self, conversation: Conversation) -> Result<Conversation> {
        let title = conversation.title().to_string();
        let owner_id = conversation.owner_id();
        let created_at = conversation.created_at().timestamp_millis();
        let updated_at = conversation.updated_at().timestamp_millis();
        let id = self
            .conn
            .call(move |conn| {
                conn.execute(
                    r#"INSERT INTO conversations (title, owner_id, created_at, updated_at)
                VALUES (:title, :owner_id, :created_at, :updated_at)"#,
                    named_params! {
                        ":title": title,
                        ":owner_id": owner_id,
                        ":created_at": created_at,
                        ":updated_at": updated_at,
                    },
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await
            .wrap_err("inserting conversation")?;
        Ok(conversation.with_id(id))
    }

    async fn get_conversation(&self, id: i64, owner_id: i64) -> Result<Option<Conversation>> {
        let row = self
            .conn
            .call(move |conn| {
                let query = format!("{} WHERE id = ? AND owner_id = ?", SELECT_CONVERSATION);
                let mut stmt = conn.prepare(&query)?;
                let mut rows = stmt.query(params![id, owner_id])?;
                match rows.next()? {
                    Some(row) => Ok(Some(conversation_columns(row)?)),
                    None => Ok(None),
                }
            })
            .await
            .wrap_err("getting conversation")?;
        row.map(to_conversation).transpose()
    }

    async fn get_conversations(&self, owner_id: i64) -> Result<Vec<Conversation>> {
        let rows = self
            .conn
            .call(move |conn| {
                let query = format!(
                    "{} WHERE owner_id = ? ORDER BY updated_at DESC, id DESC",
                    SELECT_CONVERSATION
                );
                let mut stmt = conn.prepare(&query)?;
                let mut rows = stmt.query(params![owner_id])?;
                let mut conversations = vec![];
                while let Some(row) = rows.next()? {
                    conversations.push(conversation_columns(row)?);
                }
                Ok(conversations)
            })
            .await
            .wrap_err("listing conversations")?;
        rows.into_iter().map(to_conversation).collect()
    }

    async fn update_title(&self, id: i64, owner_id: i64, title: String) -> Result<bool> {
        let updated_at = chrono::Utc::now().timestamp_millis();
        let affected_rows = self
            .conn
            .call(move |conn| {
                Ok(conn.execute(
                    r#"UPDATE conversations SET title = :title, updated_at = :updated_at
                WHERE id = :id AND owner_id = :owner_id"#,
                    named_params! {
                        ":title": title,
                        ":updated_at": updated_at,
                        ":id": id,
                        ":owner_id": owner_id,
                    },
                )?)
            })
            .await
            .wrap_err("updating conversation title")?;
        Ok(affected_rows > 0)
    }

    async fn delete_conversation(&self, id: i64, owner_id: i64) -> Result<bool> {
        let affected_rows = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let affected = tx.execute(
                    "DELETE FROM conversations WHERE id = ? AND owner_id = ?",
                    params![id, owner_id],
                )?;
                tx.commit()?;
                Ok(affected)
            })
            .await
            .wrap_err("deleting conversation")?;
        Ok(affected_rows > 0)
    }

    async fn get_messages(&self, conversation_id: i64) -> Result<Vec<Message>> {
        let rows = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, conversation_id, role, content, created_at FROM messages WHERE conversation_id = ? ORDER BY created_at ASC, id ASC",
                )?;
                let mut rows = stmt.query(params![conversation_id])?;
                let mut messages = vec![];
                while let Some(row) = rows.next()? {
                    messages.push(message_columns(row)?);
                }
                Ok(messages)
            })
            .await
            .wrap_err("getting messages")?;
        rows.into_iter().map(to_message).collect()
    }

    async fn add_message(&self, conversation_id: i64, message: Message) -> Result<Message> {
        let role = message.role().as_str();
        let content = message.content().to_string();
        let created_at = message.created_at().timestamp_millis();
        let id = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    r#"INSERT INTO messages (conversation_id, role, content, created_at)
                VALUES (:conversation_id, :role, :content, :created_at)"#,
                    named_params! {
                        ":conversation_id": conversation_id,
                        ":role": role,
                        ":content": content,
                        ":created_at": created_at,
                    },
                )?;
                let id = tx.last_insert_rowid();
                tx.execute(
                    "UPDATE conversations SET updated_at = MAX(updated_at, ?) WHERE id = ?",
                    params![created_at, conversation_id],
                )?;
                tx.commit()?;
                Ok(id)
            })
            .await
            .wrap_err(format!("adding message to conversation {}", conversation_id))?;
        Ok(message.with_id(id).with_conversation_id(conversation_id))
    }

    async fn share_conversation(
        &self,
        id: i64,
        owner_id: i64,
        shared_at: chrono::DateTime<chrono::Utc>,
    ) -> Result<Option<Conversation>> {
        let token = uuid::Uuid::new_v4().simple().to_string();
        let shared_at = shared_at.timestamp_millis();
        let affected_rows = self
            .conn
            .call(move |conn| {
                Ok(conn.execute(
                    r#"UPDATE conversations
                SET share_token = COALESCE(share_token, :token), shared_at = :shared_at
                WHERE id = :id AND owner_id = :owner_id"#,
                    named_params! {
                        ":token": token,
                        ":shared_at": shared_at,
                        ":id": id,
                        ":owner_id": owner_id,
                    },
                )?)
            })
            .await
            .wrap_err("sharing conversation")?;

        if affected_rows == 0 {
            return Ok(None);
        }
        self.get_conversation(id, owner_id).await
    }

    async fn unshare_conversation(&self, id: i64, owner_id: i64) -> Result<bool> {
        let affected_rows = self
            .conn
            .call(move |conn| {
                Ok(conn.execute(
                    "UPDATE conversations SET share_token = NULL, shared_at = NULL WHERE id = ? AND owner_id = ?",
                    params![id, owner_id],
                )?)
            })
            .await
            .wrap_err("unsharing conversation")?;
        Ok(affected_rows > 0)
    }

    async fn get_shared(&self, token: String) -> Result<Option<(Conversation, Vec<Message>)>> {
        let shared = self
            .conn
            .call(move |conn| {
                let query = format!(
                    "{} WHERE share_token = ? AND shared_at IS NOT NULL",
                    SELECT_CONVERSATION
                );
                let convo = {
                    let mut stmt = conn.prepare(&query)?;
                    let mut rows = stmt.query(params![token])?;
                    match rows.next()? {
                        Some(row) => conversation_columns(row)?,
                        None => return Ok(None),
                    }
                };

                let mut stmt = conn.prepare(
                    "SELECT id, conversation_id, role, content, created_at FROM messages WHERE conversation_id = ? AND created_at <= ? ORDER BY created_at ASC, id ASC",
                )?;
                let mut rows = stmt.query(params![convo.0, convo.4])?;
                let mut messages = vec![];
                while let Some(row) = rows.next()? {
                    messages.push(message_columns(row)?);
                }
                Ok(Some((convo, messages)))
            })
            .await
            .wrap_err("getting shared conversation")?;

        let (convo, messages) = match shared {
            Some(shared) => shared,
            None => return Ok(None),
        };
        let messages = messages
            .into_iter()
            .map(to_message)
            .collect::<Result<Vec<_>>>()?;
        Ok(Some((to_conversation(convo)?, messages)))
    }
}

fn conversation_columns(row: &Row<'_>) -> tokio_rusqlite::Result<ConversationRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
    ))
}

fn message_columns(row: &Row<'_>) -> tokio_rusqlite::Result<MessageRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
    ))
}

fn to_conversation(row: ConversationRow) -> Result<Conversation> {
    let (id, title, owner_id, share_token, shared_at, created_at, updated_at) = row;
    let mut convo = Conversation::new(owner_id)
        .with_id(id)
        .with_title(title)
        .with_created_at(from_millis(created_at)?)
        .with_updated_at(from_millis(updated_at)?);

    if let (Some(token), Some(shared_at)) = (share_token, shared_at) {
        convo = convo.with_share(token, from_millis(shared_at)?);
    }
    Ok(convo)
}

fn to_message(row: MessageRow) -> Result<Message> {
    let (id, conversation_id, role, content, created_at) = row;
    let role = role.parse::<Role>()?;
    Ok(Message::new(role, content)
        .with_id(id)
        .with_conversation_id(conversation_id)
        .with_created_at(from_millis(created_at)?))
}

fn from_millis(millis: i64) -> Result<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| eyre::eyre!("invalid timestamp: {}", millis))
}
