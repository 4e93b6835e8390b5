//! Share-link repository for `SQLite` persistence.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::models::resource::ResourceShare;
use crate::Result;

use super::db::Database;
use super::{format_ts, parse_opt_ts, parse_ts};

/// Repository for resource share links.
#[derive(Clone)]
pub struct ShareRepo {
    db: Arc<Database>,
}

#[derive(sqlx::FromRow)]
struct ShareRow {
    id: String,
    resource_id: String,
    token_hash: String,
    expires_at: Option<String>,
    max_accesses: Option<i64>,
    access_count: i64,
    created_at: String,
}

impl ShareRow {
    fn into_share(self) -> Result<ResourceShare> {
        Ok(ResourceShare {
            expires_at: parse_opt_ts("expires_at", self.expires_at.as_deref())?,
            created_at: parse_ts("created_at", &self.created_at)?,
            id: self.id,
            resource_id: self.resource_id,
            token_hash: self.token_hash,
            max_accesses: self.max_accesses,
            access_count: self.access_count,
        })
    }
}

impl ShareRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert a new share link.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the insert fails.
    pub async fn create(&self, share: &ResourceShare) -> Result<ResourceShare> {
        sqlx::query(
            "INSERT INTO resource_share (id, resource_id, token_hash, expires_at, max_accesses, access_count, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(&share.id)
        .bind(&share.resource_id)
        .bind(&share.token_hash)
        .bind(share.expires_at.map(format_ts))
        .bind(share.max_accesses)
        .bind(share.access_count)
        .bind(format_ts(share.created_at))
        .execute(self.db.as_ref())
        .await?;

        Ok(share.clone())
    }

    /// Look up a share link by the hash of its token.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query or row decoding fails.
    pub async fn find_by_token_hash(&self, token_hash: &str) -> Result<Option<ResourceShare>> {
        let row: Option<ShareRow> = sqlx::query_as(
            "SELECT id, resource_id, token_hash, expires_at, max_accesses, access_count, created_at
             FROM resource_share WHERE token_hash = ?1",
        )
        .bind(token_hash)
        .fetch_optional(self.db.as_ref())
        .await?;

        row.map(ShareRow::into_share).transpose()
    }

    /// Count one access against a share link.
    ///
    /// The limit is re-checked inside the update so concurrent readers cannot
    /// push the count past `max_accesses`. Returns `false` if the link was
    /// already exhausted.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn record_access(&self, id: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE resource_share SET access_count = access_count + 1
             WHERE id = ?1 AND (max_accesses IS NULL OR access_count < max_accesses)",
        )
        .bind(id)
        .execute(self.db.as_ref())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete share links that expired before `now`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the delete fails.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM resource_share WHERE expires_at IS NOT NULL AND expires_at < ?1",
        )
        .bind(format_ts(now))
        .execute(self.db.as_ref())
        .await?;
        Ok(result.rows_affected())
    }
}
