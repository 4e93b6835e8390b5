//! Reusable resources saved from successful agent executions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::progress::AgentProgressUpdate;

/// Resource classification.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    /// A replayable agent workflow.
    Workflow,
    /// A saved prompt.
    Prompt,
    /// A saved agent configuration.
    AgentConfig,
}

impl ResourceType {
    /// Column value for this type.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Workflow => "workflow",
            Self::Prompt => "prompt",
            Self::AgentConfig => "agent_config",
        }
    }

    /// Parse a column or query-string value.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "workflow" => Some(Self::Workflow),
            "prompt" => Some(Self::Prompt),
            "agent_config" => Some(Self::AgentConfig),
            _ => None,
        }
    }
}

/// Snapshot of one successful execution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceContent {
    /// Task text the agent executed.
    pub task: String,
    /// Conversation the execution ran in.
    pub conversation_id: String,
    /// The `agent_request` message that triggered the execution.
    pub message_id: String,
    /// When the execution finished.
    pub executed_at: DateTime<Utc>,
    /// Trailing updates of the execution timeline.
    pub updates: Vec<AgentProgressUpdate>,
}

/// A persisted, user-owned resource.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    /// Unique record identifier.
    pub id: String,
    /// Owning user.
    pub user_id: String,
    /// Display name.
    pub name: String,
    /// Optional description.
    pub description: Option<String>,
    /// Classification.
    pub resource_type: ResourceType,
    /// Execution snapshot.
    pub content: ResourceContent,
    /// Resource this one was forked from.
    pub parent_resource_id: Option<String>,
    /// Number of forks taken from this resource.
    pub fork_count: i64,
    /// Number of re-runs.
    pub execution_count: i64,
    /// Most recent re-run.
    pub last_executed_at: Option<DateTime<Utc>>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Resource {
    /// Construct a new resource with a generated identifier.
    #[must_use]
    pub fn new(
        user_id: String,
        name: String,
        description: Option<String>,
        resource_type: ResourceType,
        content: ResourceContent,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            user_id,
            name,
            description,
            resource_type,
            content,
            parent_resource_id: None,
            fork_count: 0,
            execution_count: 0,
            last_executed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Copy this resource into `user_id`'s workspace as a fork.
    #[must_use]
    pub fn fork_for(&self, user_id: String) -> Self {
        let mut fork = Self::new(
            user_id,
            format!("{} (fork)", self.name),
            self.description.clone(),
            self.resource_type,
            self.content.clone(),
        );
        fork.parent_resource_id = Some(self.id.clone());
        fork
    }

    /// Public view of the resource, without the owner id.
    #[must_use]
    pub fn public_view(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.id,
            "name": self.name,
            "description": self.description,
            "resourceType": self.resource_type,
            "content": self.content,
            "createdAt": self.created_at,
            "forkCount": self.fork_count,
            "executionCount": self.execution_count,
        })
    }
}

/// A tokenized share link for a resource.
///
/// Only the SHA-256 hash of the token is persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceShare {
    /// Unique record identifier.
    pub id: String,
    /// Shared resource.
    pub resource_id: String,
    /// Hex-encoded SHA-256 of the share token.
    pub token_hash: String,
    /// Optional expiry instant.
    pub expires_at: Option<DateTime<Utc>>,
    /// Optional access limit.
    pub max_accesses: Option<i64>,
    /// Number of successful accesses.
    pub access_count: i64,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl ResourceShare {
    /// Create a share record and return it with the plaintext token.
    #[must_use]
    pub fn issue(
        resource_id: String,
        expires_at: Option<DateTime<Utc>>,
        max_accesses: Option<i64>,
    ) -> (Self, String) {
        let token = Uuid::new_v4().simple().to_string();
        let share = Self {
            id: Uuid::new_v4().to_string(),
            resource_id,
            token_hash: hash_share_token(&token),
            expires_at,
            max_accesses,
            access_count: 0,
            created_at: Utc::now(),
        };
        (share, token)
    }

    /// Whether the link is past its expiry at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires| expires < now)
    }

    /// Whether the access limit has been reached.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.max_accesses
            .is_some_and(|limit| self.access_count >= limit)
    }
}

/// Hex-encoded SHA-256 of a share token.
#[must_use]
pub fn hash_share_token(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    digest.iter().map(|byte| format!("{byte:02x}")).collect()
}
