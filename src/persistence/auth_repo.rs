//! Bearer-token session lookup.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::models::auth::AuthSession;
use crate::Result;

use super::db::Database;
use super::{format_ts, parse_ts};

/// Repository for authentication sessions.
#[derive(Clone)]
pub struct AuthRepo {
    db: Arc<Database>,
}

#[derive(sqlx::FromRow)]
struct AuthSessionRow {
    token: String,
    user_id: String,
    expires_at: String,
}

impl AuthSessionRow {
    fn into_session(self) -> Result<AuthSession> {
        Ok(AuthSession {
            expires_at: parse_ts("expires_at", &self.expires_at)?,
            token: self.token,
            user_id: self.user_id,
        })
    }
}

impl AuthRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert or replace a session.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the insert fails.
    pub async fn upsert(&self, session: &AuthSession) -> Result<()> {
        sqlx::query(
            "INSERT INTO auth_session (token, user_id, expires_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(token) DO UPDATE SET user_id = excluded.user_id, expires_at = excluded.expires_at",
        )
        .bind(&session.token)
        .bind(&session.user_id)
        .bind(format_ts(session.expires_at))
        .execute(self.db.as_ref())
        .await?;
        Ok(())
    }

    /// Look up a session that is still valid at `now`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn find_valid(&self, token: &str, now: DateTime<Utc>) -> Result<Option<AuthSession>> {
        let row: Option<AuthSessionRow> = sqlx::query_as(
            "SELECT token, user_id, expires_at FROM auth_session WHERE token = ?1 AND expires_at > ?2",
        )
        .bind(token)
        .bind(format_ts(now))
        .fetch_optional(self.db.as_ref())
        .await?;

        row.map(AuthSessionRow::into_session).transpose()
    }

    /// Delete sessions that expired before `now`. Returns the number removed.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the delete fails.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM auth_session WHERE expires_at <= ?1")
            .bind(format_ts(now))
            .execute(self.db.as_ref())
            .await?;
        Ok(result.rows_affected())
    }
}
