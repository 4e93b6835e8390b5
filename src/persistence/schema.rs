//! `SQLite` schema bootstrap logic.
//!
//! All table definitions use `CREATE TABLE IF NOT EXISTS`, so the bootstrap
//! runs on every server startup and converges to the same result.

use sqlx::SqlitePool;

use crate::Result;

/// Apply all table definitions to the connected `SQLite` database.
///
/// # Errors
///
/// Returns `AppError::Db` if any DDL statement fails.
pub async fn bootstrap_schema(pool: &SqlitePool) -> Result<()> {
    let ddl = r"
CREATE TABLE IF NOT EXISTS auth_session (
    token           TEXT PRIMARY KEY NOT NULL,
    user_id         TEXT NOT NULL,
    expires_at      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS conversation (
    id              TEXT PRIMARY KEY NOT NULL,
    user_id         TEXT NOT NULL,
    title           TEXT NOT NULL,
    pinned          INTEGER NOT NULL DEFAULT 0,
    created_at      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS message (
    id              TEXT PRIMARY KEY NOT NULL,
    conversation_id TEXT NOT NULL REFERENCES conversation(id) ON DELETE CASCADE,
    role            TEXT NOT NULL CHECK(role IN ('user','assistant')),
    content         TEXT NOT NULL,
    message_type    TEXT NOT NULL CHECK(message_type IN ('text','agent_request','agent_progress','agent_result')),
    metadata        TEXT,
    created_at      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS resource (
    id                  TEXT PRIMARY KEY NOT NULL,
    user_id             TEXT NOT NULL,
    name                TEXT NOT NULL,
    description         TEXT,
    resource_type       TEXT NOT NULL CHECK(resource_type IN ('workflow','prompt','agent_config')),
    content             TEXT NOT NULL,
    parent_resource_id  TEXT,
    fork_count          INTEGER NOT NULL DEFAULT 0,
    execution_count     INTEGER NOT NULL DEFAULT 0,
    last_executed_at    TEXT,
    created_at          TEXT NOT NULL,
    updated_at          TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS resource_share (
    id              TEXT PRIMARY KEY NOT NULL,
    resource_id     TEXT NOT NULL REFERENCES resource(id) ON DELETE CASCADE,
    token_hash      TEXT NOT NULL UNIQUE,
    expires_at      TEXT,
    max_accesses    INTEGER,
    access_count    INTEGER NOT NULL DEFAULT 0,
    created_at      TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_auth_session_user ON auth_session(user_id);
CREATE INDEX IF NOT EXISTS idx_conversation_user ON conversation(user_id);
CREATE INDEX IF NOT EXISTS idx_message_conversation ON message(conversation_id, created_at);
CREATE INDEX IF NOT EXISTS idx_resource_user ON resource(user_id, updated_at);
CREATE INDEX IF NOT EXISTS idx_share_resource ON resource_share(resource_id);
";

    sqlx::raw_sql(ddl).execute(pool).await?;
    Ok(())
}
