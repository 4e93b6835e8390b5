//! Resource repository for `SQLite` persistence.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::models::resource::{Resource, ResourceType};
use crate::{AppError, Result};

use super::db::Database;
use super::{format_ts, parse_opt_ts, parse_ts};

/// Repository for saved resources.
#[derive(Clone)]
pub struct ResourceRepo {
    db: Arc<Database>,
}

/// Optional filters for [`ResourceRepo::list_for_owner`].
#[derive(Debug, Clone, Default)]
pub struct ResourceFilter {
    /// Case-insensitive substring matched against name and description.
    pub search: Option<String>,
    /// Restrict to one resource type.
    pub resource_type: Option<ResourceType>,
}

#[derive(sqlx::FromRow)]
struct ResourceRow {
    id: String,
    user_id: String,
    name: String,
    description: Option<String>,
    resource_type: String,
    content: String,
    parent_resource_id: Option<String>,
    fork_count: i64,
    execution_count: i64,
    last_executed_at: Option<String>,
    created_at: String,
    updated_at: String,
}

impl ResourceRow {
    fn into_resource(self) -> Result<Resource> {
        let resource_type = ResourceType::parse(&self.resource_type).ok_or_else(|| {
            AppError::Db(format!("invalid resource type: {}", self.resource_type))
        })?;

        Ok(Resource {
            resource_type,
            content: serde_json::from_str(&self.content)?,
            last_executed_at: parse_opt_ts("last_executed_at", self.last_executed_at.as_deref())?,
            created_at: parse_ts("created_at", &self.created_at)?,
            updated_at: parse_ts("updated_at", &self.updated_at)?,
            id: self.id,
            user_id: self.user_id,
            name: self.name,
            description: self.description,
            parent_resource_id: self.parent_resource_id,
            fork_count: self.fork_count,
            execution_count: self.execution_count,
        })
    }
}

const COLUMNS: &str = "id, user_id, name, description, resource_type, content, parent_resource_id, \
                       fork_count, execution_count, last_executed_at, created_at, updated_at";

impl ResourceRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert a new resource.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if content serialization or the insert fails.
    pub async fn create(&self, resource: &Resource) -> Result<Resource> {
        let content = serde_json::to_string(&resource.content)?;

        sqlx::query(&format!(
            "INSERT INTO resource ({COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
        ))
        .bind(&resource.id)
        .bind(&resource.user_id)
        .bind(&resource.name)
        .bind(&resource.description)
        .bind(resource.resource_type.as_str())
        .bind(content)
        .bind(&resource.parent_resource_id)
        .bind(resource.fork_count)
        .bind(resource.execution_count)
        .bind(resource.last_executed_at.map(format_ts))
        .bind(format_ts(resource.created_at))
        .bind(format_ts(resource.updated_at))
        .execute(self.db.as_ref())
        .await?;

        Ok(resource.clone())
    }

    /// Fetch a resource by id, regardless of owner.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query or row decoding fails.
    pub async fn get_by_id(&self, id: &str) -> Result<Option<Resource>> {
        let row: Option<ResourceRow> =
            sqlx::query_as(&format!("SELECT {COLUMNS} FROM resource WHERE id = ?1"))
                .bind(id)
                .fetch_optional(self.db.as_ref())
                .await?;

        row.map(ResourceRow::into_resource).transpose()
    }

    /// Fetch a resource only if `user_id` owns it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query or row decoding fails.
    pub async fn get_for_owner(&self, id: &str, user_id: &str) -> Result<Option<Resource>> {
        let row: Option<ResourceRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM resource WHERE id = ?1 AND user_id = ?2"
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(self.db.as_ref())
        .await?;

        row.map(ResourceRow::into_resource).transpose()
    }

    /// List a user's resources, most recently updated first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query or row decoding fails.
    pub async fn list_for_owner(&self, user_id: &str, filter: &ResourceFilter) -> Result<Vec<Resource>> {
        let pattern = filter
            .search
            .as_deref()
            .map(str::trim)
            .filter(|term| !term.is_empty())
            .map(|term| format!("%{}%", escape_like(term)));

        let rows: Vec<ResourceRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM resource
             WHERE user_id = ?1
               AND (?2 IS NULL OR name LIKE ?2 ESCAPE '\\' OR description LIKE ?2 ESCAPE '\\')
               AND (?3 IS NULL OR resource_type = ?3)
             ORDER BY updated_at DESC"
        ))
        .bind(user_id)
        .bind(pattern)
        .bind(filter.resource_type.map(ResourceType::as_str))
        .fetch_all(self.db.as_ref())
        .await?;

        rows.into_iter().map(ResourceRow::into_resource).collect()
    }

    /// Delete a resource owned by `user_id`, along with its share links.
    ///
    /// Returns `false` if no such resource exists for that owner.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the delete fails.
    pub async fn delete_for_owner(&self, id: &str, user_id: &str) -> Result<bool> {
        let mut tx = self.db.begin().await?;

        sqlx::query(
            "DELETE FROM resource_share WHERE resource_id IN
             (SELECT id FROM resource WHERE id = ?1 AND user_id = ?2)",
        )
        .bind(id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        let result = sqlx::query("DELETE FROM resource WHERE id = ?1 AND user_id = ?2")
            .bind(id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    /// Record a re-run of the resource at `at`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn record_execution(&self, id: &str, at: DateTime<Utc>) -> Result<()> {
        let at = format_ts(at);
        sqlx::query(
            "UPDATE resource
             SET execution_count = execution_count + 1, last_executed_at = ?2, updated_at = ?2
             WHERE id = ?1",
        )
        .bind(id)
        .bind(&at)
        .execute(self.db.as_ref())
        .await?;
        Ok(())
    }

    /// Increment the fork counter of a resource.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn increment_fork_count(&self, id: &str) -> Result<()> {
        sqlx::query("UPDATE resource SET fork_count = fork_count + 1 WHERE id = ?1")
            .bind(id)
            .execute(self.db.as_ref())
            .await?;
        Ok(())
    }
}

fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
