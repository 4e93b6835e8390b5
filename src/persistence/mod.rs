//! Persistence layer modules.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::{AppError, Result};

pub mod auth_repo;
pub mod conversation_repo;
pub mod db;
pub mod message_repo;
pub mod resource_repo;
pub mod retention;
pub mod schema;
pub mod share_repo;

/// Re-export the database pool type for convenience.
pub use sqlx::SqlitePool;

/// Fixed-width RFC 3339 text, so stored timestamps sort lexically.
pub(crate) fn format_ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp column.
pub(crate) fn parse_ts(column: &str, raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| AppError::Db(format!("invalid {column}: {e}")))
}

/// Parse an optional stored timestamp column.
pub(crate) fn parse_opt_ts(column: &str, raw: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    raw.map(|raw| parse_ts(column, raw)).transpose()
}
