//! Conversation repository for `SQLite` persistence.

use std::sync::Arc;

use crate::models::conversation::Conversation;
use crate::Result;

use super::db::Database;
use super::{format_ts, parse_ts};

/// Repository for conversation records.
#[derive(Clone)]
pub struct ConversationRepo {
    db: Arc<Database>,
}

#[derive(sqlx::FromRow)]
struct ConversationRow {
    id: String,
    user_id: String,
    title: String,
    pinned: i64,
    created_at: String,
}

impl ConversationRow {
    fn into_conversation(self) -> Result<Conversation> {
        Ok(Conversation {
            created_at: parse_ts("created_at", &self.created_at)?,
            id: self.id,
            user_id: self.user_id,
            title: self.title,
            pinned: self.pinned != 0,
        })
    }
}

impl ConversationRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert a new conversation.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the insert fails.
    pub async fn create(&self, conversation: &Conversation) -> Result<Conversation> {
        sqlx::query(
            "INSERT INTO conversation (id, user_id, title, pinned, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(&conversation.id)
        .bind(&conversation.user_id)
        .bind(&conversation.title)
        .bind(i64::from(conversation.pinned))
        .bind(format_ts(conversation.created_at))
        .execute(self.db.as_ref())
        .await?;

        Ok(conversation.clone())
    }

    /// Fetch a conversation only if `user_id` owns it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn get_for_owner(&self, id: &str, user_id: &str) -> Result<Option<Conversation>> {
        let row: Option<ConversationRow> = sqlx::query_as(
            "SELECT id, user_id, title, pinned, created_at
             FROM conversation WHERE id = ?1 AND user_id = ?2",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(self.db.as_ref())
        .await?;

        row.map(ConversationRow::into_conversation).transpose()
    }
}
