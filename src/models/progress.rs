//! Normalized agent progress updates streamed to clients.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Kind of a single progress update.
///
/// The wire names follow the browser client's vocabulary.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum UpdateKind {
    /// Free-form narration from the agent or the driver.
    #[serde(rename = "text")]
    Narration,
    /// A tool call has started.
    #[serde(rename = "tool_call")]
    ToolInvoked,
    /// A tool call has produced its result.
    #[serde(rename = "tool_result")]
    ToolCompleted,
    /// Terminal update: success, failure, or cancellation.
    #[serde(rename = "complete")]
    Finished,
}

/// One event in an execution timeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AgentProgressUpdate {
    /// Update kind.
    #[serde(rename = "type")]
    pub kind: UpdateKind,
    /// Milliseconds since the Unix epoch, producer clock.
    pub timestamp: i64,
    /// Human-readable content.
    pub content: String,
    /// Tool name for tool updates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    /// Outcome flag for tool results and terminal updates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    /// Remediation advice, terminal failures only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovery: Option<String>,
}

/// Current producer timestamp in epoch milliseconds.
#[must_use]
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

impl AgentProgressUpdate {
    /// Narration stamped with the current time.
    #[must_use]
    pub fn narration(content: impl Into<String>) -> Self {
        Self::narration_at(now_millis(), content)
    }

    /// Narration with an explicit timestamp.
    #[must_use]
    pub fn narration_at(timestamp: i64, content: impl Into<String>) -> Self {
        Self {
            kind: UpdateKind::Narration,
            timestamp,
            content: content.into(),
            tool_name: None,
            success: None,
            recovery: None,
        }
    }

    /// Tool invocation announcement.
    #[must_use]
    pub fn tool_invoked(
        timestamp: i64,
        tool_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            kind: UpdateKind::ToolInvoked,
            timestamp,
            content: content.into(),
            tool_name: Some(tool_name.into()),
            success: None,
            recovery: None,
        }
    }

    /// Successful tool result.
    #[must_use]
    pub fn tool_completed(
        timestamp: i64,
        tool_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            kind: UpdateKind::ToolCompleted,
            timestamp,
            content: content.into(),
            tool_name: Some(tool_name.into()),
            success: Some(true),
            recovery: None,
        }
    }

    /// Successful terminal update.
    #[must_use]
    pub fn succeeded(timestamp: i64, content: impl Into<String>) -> Self {
        Self {
            kind: UpdateKind::Finished,
            timestamp,
            content: content.into(),
            tool_name: None,
            success: Some(true),
            recovery: None,
        }
    }

    /// Failed or cancelled terminal update, stamped now.
    #[must_use]
    pub fn failed(content: impl Into<String>, recovery: Option<String>) -> Self {
        Self {
            kind: UpdateKind::Finished,
            timestamp: now_millis(),
            content: content.into(),
            tool_name: None,
            success: Some(false),
            recovery,
        }
    }

    /// Whether this update ends the timeline.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.kind == UpdateKind::Finished
    }

    /// Whether this is a successful terminal update.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.is_terminal() && self.success == Some(true)
    }
}
