//! Resource bookkeeping: save, list, delete, re-run, share, and fork.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::GlobalConfig;
use crate::models::auth::Principal;
use crate::models::conversation::MessageType;
use crate::models::resource::{hash_share_token, Resource, ResourceContent, ResourceShare, ResourceType};
use crate::persistence::conversation_repo::ConversationRepo;
use crate::persistence::db::Database;
use crate::persistence::message_repo::MessageRepo;
use crate::persistence::resource_repo::{ResourceFilter, ResourceRepo};
use crate::persistence::share_repo::ShareRepo;
use crate::{AppError, Result};

/// Longest accepted resource name, in characters.
pub const MAX_NAME_CHARS: usize = 100;

/// Longest accepted share lifetime.
pub const MAX_SHARE_DAYS: u32 = 365;

/// Body of `POST /api/resources`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveResourceRequest {
    /// Conversation holding the result message.
    pub conversation_id: Option<String>,
    /// The `agent_result` message to save.
    pub message_id: Option<String>,
    /// Display name, 1 to 100 characters.
    pub name: Option<String>,
    /// Optional description.
    #[serde(default)]
    pub description: Option<String>,
    /// Defaults to `workflow`.
    #[serde(default)]
    pub resource_type: Option<ResourceType>,
}

/// Body of `POST /api/resources/{id}/share`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareRequest {
    /// Link lifetime in days; no expiry when absent.
    #[serde(default)]
    pub expires_in_days: Option<u32>,
    /// Maximum number of accesses; unlimited when absent.
    #[serde(default)]
    pub max_accesses: Option<i64>,
}

/// A freshly issued share link. The token is only ever returned here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ShareLink {
    /// Plaintext share token.
    pub share_token: String,
    /// Public URL of the shared resource page.
    pub share_url: String,
}

/// Resource operations on behalf of a principal.
#[derive(Clone)]
pub struct ResourceService {
    config: Arc<GlobalConfig>,
    conversations: ConversationRepo,
    messages: MessageRepo,
    resources: ResourceRepo,
    shares: ShareRepo,
}

impl ResourceService {
    /// Build the service over a shared pool.
    #[must_use]
    pub fn new(config: Arc<GlobalConfig>, db: &Arc<Database>) -> Self {
        Self {
            config,
            conversations: ConversationRepo::new(Arc::clone(db)),
            messages: MessageRepo::new(Arc::clone(db)),
            resources: ResourceRepo::new(Arc::clone(db)),
            shares: ShareRepo::new(Arc::clone(db)),
        }
    }

    /// The principal's resources, newest first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list(&self, principal: &Principal, filter: &ResourceFilter) -> Result<Vec<Resource>> {
        self.resources.list_for_owner(&principal.user_id, filter).await
    }

    /// Save a successful `agent_result` message as a resource.
    ///
    /// # Errors
    ///
    /// - `AppError::InvalidRequest` for missing ids, a bad name, or a
    ///   result that did not succeed.
    /// - `AppError::NotFound` if the conversation or message is not the
    ///   principal's, or the message is not an `agent_result`.
    /// - `AppError::Db` on persistence failure.
    pub async fn save_from_message(
        &self,
        principal: &Principal,
        request: SaveResourceRequest,
    ) -> Result<Resource> {
        let (Some(conversation_id), Some(message_id)) =
            (request.conversation_id, request.message_id)
        else {
            return Err(AppError::InvalidRequest(
                "conversationId and messageId are required".into(),
            ));
        };
        let name = validate_name(request.name.as_deref().unwrap_or_default())?;

        self.conversations
            .get_for_owner(&conversation_id, &principal.user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("conversation not found".into()))?;

        let message = self
            .messages
            .get_in_conversation(&message_id, &conversation_id)
            .await?
            .filter(|message| message.message_type == MessageType::AgentResult)
            .ok_or_else(|| AppError::NotFound("agent result not found".into()))?;

        let result = message
            .agent_result_metadata()
            .ok_or_else(|| AppError::InvalidRequest("agent result has no timeline".into()))?;
        if !result.success {
            return Err(AppError::InvalidRequest(
                "only successful executions can be saved".into(),
            ));
        }

        let content = ResourceContent {
            task: result.task,
            conversation_id,
            message_id: result.request_message_id,
            executed_at: message.created_at,
            updates: tail(&result.updates, self.config.snapshot.resource_updates),
        };
        let resource = Resource::new(
            principal.user_id.clone(),
            name,
            request.description.filter(|text| !text.trim().is_empty()),
            request.resource_type.unwrap_or(ResourceType::Workflow),
            content,
        );

        let resource = self.resources.create(&resource).await?;
        info!(resource_id = resource.id, user_id = principal.user_id, "resource saved");
        Ok(resource)
    }

    /// Delete one of the principal's resources and its share links.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the principal owns no such resource.
    pub async fn delete(&self, principal: &Principal, id: &str) -> Result<()> {
        if self.resources.delete_for_owner(id, &principal.user_id).await? {
            info!(resource_id = id, "resource deleted");
            Ok(())
        } else {
            Err(AppError::NotFound("resource not found".into()))
        }
    }

    /// Record a re-run of a resource and return its stored task text.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the principal owns no such resource.
    pub async fn record_execution(&self, principal: &Principal, id: &str) -> Result<String> {
        let resource = self.owned(principal, id).await?;
        self.resources.record_execution(&resource.id, Utc::now()).await?;
        info!(resource_id = id, "resource re-run recorded");
        Ok(resource.content.task)
    }

    /// Issue a share link for one of the principal's resources.
    ///
    /// # Errors
    ///
    /// - `AppError::InvalidRequest` for a zero or oversized lifetime or a
    ///   non-positive access limit.
    /// - `AppError::NotFound` if the principal owns no such resource.
    pub async fn share(&self, principal: &Principal, id: &str, request: &ShareRequest) -> Result<ShareLink> {
        if let Some(days) = request.expires_in_days {
            if days == 0 || days > MAX_SHARE_DAYS {
                return Err(AppError::InvalidRequest(format!(
                    "expiresInDays must be between 1 and {MAX_SHARE_DAYS}"
                )));
            }
        }
        if request.max_accesses.is_some_and(|limit| limit <= 0) {
            return Err(AppError::InvalidRequest(
                "maxAccesses must be positive".into(),
            ));
        }

        let resource = self.owned(principal, id).await?;
        let expires_at = request
            .expires_in_days
            .map(|days| Utc::now() + Duration::days(i64::from(days)));
        let (share, token) = ResourceShare::issue(resource.id, expires_at, request.max_accesses);
        self.shares.create(&share).await?;

        info!(resource_id = id, share_id = share.id, "share link issued");
        Ok(ShareLink {
            share_url: format!("{}/resources/share/{token}", self.config.public_base_url),
            share_token: token,
        })
    }

    /// Open a shared resource, counting one access.
    ///
    /// # Errors
    ///
    /// - `AppError::NotFound` for an unknown token or a deleted resource.
    /// - `AppError::Expired` past the link's expiry.
    /// - `AppError::LimitReached` once the access limit is used up.
    pub async fn open_shared(&self, token: &str) -> Result<Resource> {
        let (share, resource) = self.resolve_share(token).await?;
        if !self.shares.record_access(&share.id).await? {
            return Err(AppError::LimitReached("share link access limit reached".into()));
        }
        Ok(resource)
    }

    /// Copy a shared resource into the principal's workspace.
    ///
    /// Applies the same expiry and limit rules as [`Self::open_shared`]
    /// without counting an access.
    ///
    /// # Errors
    ///
    /// Same as [`Self::open_shared`], plus `AppError::Db` if the copy fails.
    pub async fn fork_shared(&self, principal: &Principal, token: &str) -> Result<Resource> {
        let (_, original) = self.resolve_share(token).await?;
        let fork = self
            .resources
            .create(&original.fork_for(principal.user_id.clone()))
            .await?;
        self.resources.increment_fork_count(&original.id).await?;

        info!(resource_id = fork.id, parent_resource_id = original.id, "resource forked");
        Ok(fork)
    }

    async fn owned(&self, principal: &Principal, id: &str) -> Result<Resource> {
        self.resources
            .get_for_owner(id, &principal.user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("resource not found".into()))
    }

    async fn resolve_share(&self, token: &str) -> Result<(ResourceShare, Resource)> {
        let share = self
            .shares
            .find_by_token_hash(&hash_share_token(token))
            .await?
            .ok_or_else(|| AppError::NotFound("share link not found".into()))?;

        if share.is_expired_at(Utc::now()) {
            return Err(AppError::Expired("share link has expired".into()));
        }
        if share.is_exhausted() {
            return Err(AppError::LimitReached("share link access limit reached".into()));
        }

        let resource = self
            .resources
            .get_by_id(&share.resource_id)
            .await?
            .ok_or_else(|| AppError::NotFound("share link not found".into()))?;
        Ok((share, resource))
    }
}

fn validate_name(raw: &str) -> Result<String> {
    let name = raw.trim();
    let chars = name.chars().count();
    if chars == 0 || chars > MAX_NAME_CHARS {
        return Err(AppError::InvalidRequest(format!(
            "name must be 1 to {MAX_NAME_CHARS} characters"
        )));
    }
    Ok(name.to_owned())
}

/// The last `n` items of a slice, cloned.
pub(crate) fn tail<T: Clone>(items: &[T], n: usize) -> Vec<T> {
    items[items.len().saturating_sub(n)..].to_vec()
}
