//! Agent request execution: validation, task resolution, run, persistence.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::pin::pin;
use std::sync::Arc;

use chrono::Utc;
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

use crate::agent::{AgentDriver, AgentRun};
use crate::config::GlobalConfig;
use crate::models::auth::Principal;
use crate::models::conversation::{AgentResultMetadata, Message, MessageRole, MessageType};
use crate::models::progress::AgentProgressUpdate;
use crate::models::resource::{Resource, ResourceContent, ResourceType};
use crate::persistence::conversation_repo::ConversationRepo;
use crate::persistence::db::Database;
use crate::persistence::message_repo::MessageRepo;
use crate::persistence::resource_repo::ResourceRepo;
use crate::resources::{tail, MAX_NAME_CHARS};
use crate::{AppError, Result};

/// Client-facing text of a `resource_error` event.
pub const PERSIST_FAILED_TEXT: &str = "failed to save execution result";

/// Body of `POST /api/agent/execute`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteRequest {
    /// The approved `agent_request` message.
    #[serde(default)]
    pub message_id: Option<String>,
    /// Conversation holding the message.
    #[serde(default)]
    pub conversation_id: Option<String>,
}

/// A validated execution, ready to run.
#[derive(Debug, Clone)]
pub struct PreparedExecution {
    /// Correlation id for logs.
    pub execution_id: String,
    /// Requesting user.
    pub principal: Principal,
    /// The `agent_request` message being executed.
    pub request: Message,
    /// Resolved task text.
    pub task: String,
    /// Isolated working directory.
    pub workdir: PathBuf,
}

/// Item of an execution stream.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionEvent {
    /// A progress update from the agent run.
    Update(AgentProgressUpdate),
    /// The successful run was saved as a resource.
    ResourceSaved {
        /// Identifier of the new resource.
        resource_id: String,
    },
    /// Persisting the outcome failed.
    ResourceFailed {
        /// Failure description.
        error: String,
    },
}

/// Coordinates agent runs for approved requests.
#[derive(Clone)]
pub struct ExecutionOrchestrator {
    config: Arc<GlobalConfig>,
    driver: AgentDriver,
    conversations: ConversationRepo,
    messages: MessageRepo,
    resources: ResourceRepo,
}

impl ExecutionOrchestrator {
    /// Build the orchestrator over a shared pool.
    #[must_use]
    pub fn new(config: Arc<GlobalConfig>, db: &Arc<Database>) -> Self {
        Self {
            driver: AgentDriver::new(config.agent.clone()),
            conversations: ConversationRepo::new(Arc::clone(db)),
            messages: MessageRepo::new(Arc::clone(db)),
            resources: ResourceRepo::new(Arc::clone(db)),
            config,
        }
    }

    /// Validate a request and resolve everything the run needs.
    ///
    /// # Errors
    ///
    /// - `AppError::InvalidRequest` if an id is missing or no task text can
    ///   be resolved.
    /// - `AppError::NotFound` if the conversation is not the principal's, or
    ///   the message is not an `agent_request` in that conversation.
    /// - `AppError::Io` if the working directory cannot be created.
    pub async fn prepare(
        &self,
        principal: &Principal,
        request: ExecuteRequest,
    ) -> Result<PreparedExecution> {
        let (Some(message_id), Some(conversation_id)) = (
            request.message_id.filter(|id| !id.is_empty()),
            request.conversation_id.filter(|id| !id.is_empty()),
        ) else {
            return Err(AppError::InvalidRequest(
                "Missing messageId or conversationId".into(),
            ));
        };

        self.conversations
            .get_for_owner(&conversation_id, &principal.user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("conversation not found".into()))?;

        let request = self
            .messages
            .get_in_conversation(&message_id, &conversation_id)
            .await?
            .filter(|message| message.message_type == MessageType::AgentRequest)
            .ok_or_else(|| AppError::NotFound("agent request not found".into()))?;

        let task = self.resolve_task(&request).await?;
        let workdir = self.config.workspace_for(&conversation_id)?;
        tokio::fs::create_dir_all(&workdir).await?;

        Ok(PreparedExecution {
            execution_id: Uuid::new_v4().to_string(),
            principal: principal.clone(),
            request,
            task,
            workdir,
        })
    }

    /// Run a prepared execution.
    ///
    /// Every driver update is forwarded as it is produced. After the terminal
    /// update the outcome is persisted and reported as a side-channel event.
    /// Dropping the stream before then kills the agent and skips persistence.
    pub fn execute(
        &self,
        prepared: PreparedExecution,
        cancel: CancellationToken,
    ) -> impl Stream<Item = ExecutionEvent> + Send + 'static {
        let this = self.clone();

        async_stream::stream! {
            let span = info_span!("agent_execution", execution_id = prepared.execution_id);
            info!(
                parent: &span,
                conversation_id = prepared.request.conversation_id,
                message_id = prepared.request.id,
                "agent execution started"
            );

            let run = AgentRun {
                execution_id: prepared.execution_id.clone(),
                task: prepared.task.clone(),
                workdir: prepared.workdir.clone(),
            };
            let mut updates = pin!(this.driver.run(run, cancel));
            let mut timeline = RecentUpdates::new(
                this.config.snapshot.timeline_limit.max(this.config.snapshot.resource_updates),
            );
            let mut terminal = None;

            while let Some(update) = updates.next().await {
                if update.is_terminal() {
                    terminal = Some(update.clone());
                }
                timeline.push(update.clone());
                yield ExecutionEvent::Update(update);
            }

            let timeline = timeline.into_vec();
            match this.persist_outcome(&prepared, &timeline, terminal.as_ref()).instrument(span).await {
                Ok(Some(resource_id)) => yield ExecutionEvent::ResourceSaved { resource_id },
                Ok(None) => {}
                Err(err) => {
                    error!(execution_id = prepared.execution_id, %err, "failed to persist execution outcome");
                    yield ExecutionEvent::ResourceFailed { error: PERSIST_FAILED_TEXT.to_owned() };
                }
            }
        }
    }

    async fn resolve_task(&self, request: &Message) -> Result<String> {
        let preceding = self
            .messages
            .latest_user_message_before(request)
            .await?
            .map(|message| message.content);
        let summary = request.agent_request_metadata().map(|meta| meta.summary);

        [preceding, summary, Some(request.content.clone())]
            .into_iter()
            .flatten()
            .map(|text| text.trim().to_owned())
            .find(|text| !text.is_empty())
            .ok_or_else(|| AppError::InvalidRequest("agent request has no task text".into()))
    }

    /// Append the `agent_result` message and, after a success, the
    /// workflow resource. Returns the new resource id, if any.
    async fn persist_outcome(
        &self,
        prepared: &PreparedExecution,
        timeline: &[AgentProgressUpdate],
        terminal: Option<&AgentProgressUpdate>,
    ) -> Result<Option<String>> {
        let success = terminal.is_some_and(AgentProgressUpdate::is_success);

        let metadata = AgentResultMetadata {
            success,
            task: prepared.task.clone(),
            request_message_id: prepared.request.id.clone(),
            updates: tail(timeline, self.config.snapshot.timeline_limit),
        };
        let result = Message::new(
            prepared.request.conversation_id.clone(),
            MessageRole::Assistant,
            terminal.map_or_else(String::new, |update| update.content.clone()),
            MessageType::AgentResult,
            Some(serde_json::to_value(&metadata)?),
        );
        self.messages.create(&result).await?;
        info!(message_id = result.id, success, "agent result recorded");

        if !success {
            return Ok(None);
        }

        let content = ResourceContent {
            task: prepared.task.clone(),
            conversation_id: prepared.request.conversation_id.clone(),
            message_id: prepared.request.id.clone(),
            executed_at: Utc::now(),
            updates: tail(timeline, self.config.snapshot.resource_updates),
        };
        let resource = Resource::new(
            prepared.principal.user_id.clone(),
            resource_name(&prepared.task),
            prepared
                .request
                .agent_request_metadata()
                .map(|meta| meta.summary)
                .filter(|summary| !summary.trim().is_empty()),
            ResourceType::Workflow,
            content,
        );
        let resource = self.resources.create(&resource).await?;
        info!(resource_id = resource.id, "workflow resource saved");
        Ok(Some(resource.id))
    }
}

/// The most recent updates of a run, oldest first.
#[derive(Debug)]
struct RecentUpdates {
    updates: VecDeque<AgentProgressUpdate>,
    capacity: usize,
}

impl RecentUpdates {
    fn new(capacity: usize) -> Self {
        Self {
            updates: VecDeque::new(),
            capacity,
        }
    }

    fn push(&mut self, update: AgentProgressUpdate) {
        if self.capacity == 0 {
            return;
        }
        if self.updates.len() == self.capacity {
            self.updates.pop_front();
        }
        self.updates.push_back(update);
    }

    fn into_vec(self) -> Vec<AgentProgressUpdate> {
        self.updates.into()
    }
}

/// First line of the task, cut to the resource name limit.
fn resource_name(task: &str) -> String {
    let first_line = task.lines().next().unwrap_or_default().trim();
    let name: String = first_line.chars().take(MAX_NAME_CHARS).collect();
    if name.is_empty() {
        "Agent workflow".to_owned()
    } else {
        name
    }
}
