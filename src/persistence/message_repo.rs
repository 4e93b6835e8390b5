//! Message repository for `SQLite` persistence.

use std::sync::Arc;

use crate::models::conversation::{Message, MessageRole, MessageType};
use crate::{AppError, Result};

use super::db::Database;
use super::{format_ts, parse_ts};

/// Repository for conversation messages.
#[derive(Clone)]
pub struct MessageRepo {
    db: Arc<Database>,
}

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: String,
    conversation_id: String,
    role: String,
    content: String,
    message_type: String,
    metadata: Option<String>,
    created_at: String,
}

impl MessageRow {
    fn into_message(self) -> Result<Message> {
        let metadata = self
            .metadata
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;

        Ok(Message {
            role: parse_role(&self.role)?,
            message_type: parse_message_type(&self.message_type)?,
            created_at: parse_ts("created_at", &self.created_at)?,
            metadata,
            id: self.id,
            conversation_id: self.conversation_id,
            content: self.content,
        })
    }
}

const COLUMNS: &str = "id, conversation_id, role, content, message_type, metadata, created_at";

fn parse_role(s: &str) -> Result<MessageRole> {
    match s {
        "user" => Ok(MessageRole::User),
        "assistant" => Ok(MessageRole::Assistant),
        other => Err(AppError::Db(format!("invalid message role: {other}"))),
    }
}

fn role_str(role: MessageRole) -> &'static str {
    match role {
        MessageRole::User => "user",
        MessageRole::Assistant => "assistant",
    }
}

fn parse_message_type(s: &str) -> Result<MessageType> {
    match s {
        "text" => Ok(MessageType::Text),
        "agent_request" => Ok(MessageType::AgentRequest),
        "agent_progress" => Ok(MessageType::AgentProgress),
        "agent_result" => Ok(MessageType::AgentResult),
        other => Err(AppError::Db(format!("invalid message type: {other}"))),
    }
}

fn message_type_str(message_type: MessageType) -> &'static str {
    match message_type {
        MessageType::Text => "text",
        MessageType::AgentRequest => "agent_request",
        MessageType::AgentProgress => "agent_progress",
        MessageType::AgentResult => "agent_result",
    }
}

impl MessageRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert a new message.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if metadata serialization or the insert fails.
    pub async fn create(&self, message: &Message) -> Result<Message> {
        let metadata = message
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(
            "INSERT INTO message (id, conversation_id, role, content, message_type, metadata, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(&message.id)
        .bind(&message.conversation_id)
        .bind(role_str(message.role))
        .bind(&message.content)
        .bind(message_type_str(message.message_type))
        .bind(metadata)
        .bind(format_ts(message.created_at))
        .execute(self.db.as_ref())
        .await?;

        Ok(message.clone())
    }

    /// Fetch a message by id, regardless of conversation.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query or row decoding fails.
    pub async fn get_by_id(&self, id: &str) -> Result<Option<Message>> {
        let row: Option<MessageRow> =
            sqlx::query_as(&format!("SELECT {COLUMNS} FROM message WHERE id = ?1"))
                .bind(id)
                .fetch_optional(self.db.as_ref())
                .await?;

        row.map(MessageRow::into_message).transpose()
    }

    /// Fetch a message only if it belongs to `conversation_id`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query or row decoding fails.
    pub async fn get_in_conversation(
        &self,
        id: &str,
        conversation_id: &str,
    ) -> Result<Option<Message>> {
        let row: Option<MessageRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM message WHERE id = ?1 AND conversation_id = ?2"
        ))
        .bind(id)
        .bind(conversation_id)
        .fetch_optional(self.db.as_ref())
        .await?;

        row.map(MessageRow::into_message).transpose()
    }

    /// The most recent user message posted no later than `before`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query or row decoding fails.
    pub async fn latest_user_message_before(&self, before: &Message) -> Result<Option<Message>> {
        let row: Option<MessageRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM message
             WHERE conversation_id = ?1 AND role = 'user' AND created_at <= ?2 AND id <> ?3
             ORDER BY created_at DESC
             LIMIT 1"
        ))
        .bind(&before.conversation_id)
        .bind(format_ts(before.created_at))
        .bind(&before.id)
        .fetch_optional(self.db.as_ref())
        .await?;

        row.map(MessageRow::into_message).transpose()
    }

    /// All messages of a conversation, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query or row decoding fails.
    pub async fn list_for_conversation(&self, conversation_id: &str) -> Result<Vec<Message>> {
        let rows: Vec<MessageRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM message WHERE conversation_id = ?1 ORDER BY created_at ASC"
        ))
        .bind(conversation_id)
        .fetch_all(self.db.as_ref())
        .await?;

        rows.into_iter().map(MessageRow::into_message).collect()
    }
}
