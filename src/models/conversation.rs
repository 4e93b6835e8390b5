//! Conversation and message models read by the execution pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::progress::AgentProgressUpdate;

/// A chat conversation owned by a single user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    /// Unique record identifier.
    pub id: String,
    /// Owning user; immutable after creation.
    pub user_id: String,
    /// Display title.
    pub title: String,
    /// Whether the conversation is pinned in the sidebar.
    pub pinned: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    /// Construct a new conversation with a generated identifier.
    #[must_use]
    pub fn new(user_id: String, title: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id,
            title,
            pinned: false,
            created_at: Utc::now(),
        }
    }
}

/// Author role of a message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    /// Written by the user.
    User,
    /// Written by the assistant or the agent pipeline.
    Assistant,
}

/// Message classification used by the chat UI.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// Ordinary chat text.
    Text,
    /// An approved-for-execution agent instruction.
    AgentRequest,
    /// Intermediate progress snapshot.
    AgentProgress,
    /// Final execution timeline.
    AgentResult,
}

/// A single message within a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Unique record identifier.
    pub id: String,
    /// Owning conversation.
    pub conversation_id: String,
    /// Author role.
    pub role: MessageRole,
    /// Message text.
    pub content: String,
    /// Message classification.
    pub message_type: MessageType,
    /// Type-specific JSON metadata.
    pub metadata: Option<serde_json::Value>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Construct a new message with a generated identifier.
    #[must_use]
    pub fn new(
        conversation_id: String,
        role: MessageRole,
        content: String,
        message_type: MessageType,
        metadata: Option<serde_json::Value>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            conversation_id,
            role,
            content,
            message_type,
            metadata,
            created_at: Utc::now(),
        }
    }

    /// Decode the metadata of an `agent_request` message, if well formed.
    #[must_use]
    pub fn agent_request_metadata(&self) -> Option<AgentRequestMetadata> {
        self.metadata
            .clone()
            .and_then(|value| serde_json::from_value(value).ok())
    }

    /// Decode the metadata of an `agent_result` message, if well formed.
    #[must_use]
    pub fn agent_result_metadata(&self) -> Option<AgentResultMetadata> {
        self.metadata
            .clone()
            .and_then(|value| serde_json::from_value(value).ok())
    }
}

/// Metadata stored with `agent_request` messages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AgentRequestMetadata {
    /// One-line summary of what the agent will do.
    pub summary: String,
    /// Planned actions shown on the approval card.
    #[serde(default)]
    pub actions: Vec<String>,
    /// Whether the request may destroy data.
    #[serde(default)]
    pub destructive: bool,
    /// Whether the UI asked for a second confirmation.
    #[serde(default)]
    pub requires_extra_confirm: bool,
    /// When the request was raised (RFC 3339).
    #[serde(default)]
    pub requested_at: Option<String>,
}

/// Metadata stored with `agent_result` messages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AgentResultMetadata {
    /// Whether the run finished successfully.
    pub success: bool,
    /// Task text the agent was given.
    pub task: String,
    /// The `agent_request` message this result answers.
    pub request_message_id: String,
    /// Bounded execution timeline.
    pub updates: Vec<AgentProgressUpdate>,
}
