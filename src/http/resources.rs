//! Resource endpoints.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use super::AppState;
use crate::models::auth::Principal;
use crate::models::resource::{Resource, ResourceType};
use crate::persistence::resource_repo::ResourceFilter;
use crate::resources::{SaveResourceRequest, ShareLink, ShareRequest};
use crate::{AppError, Result};

/// Query string of `GET /api/resources`.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    /// Substring matched against name and description.
    pub search: Option<String>,
    /// Resource type filter.
    #[serde(rename = "type")]
    pub resource_type: Option<String>,
}

/// `GET /api/resources`
///
/// # Errors
///
/// `400` for an unknown `type`.
pub async fn list_resources(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Query(query): Query<ListQuery>,
) -> Result<Json<Value>> {
    let resource_type = match query.resource_type.as_deref().filter(|raw| !raw.is_empty()) {
        Some(raw) => Some(
            ResourceType::parse(raw)
                .ok_or_else(|| AppError::InvalidRequest(format!("unknown resource type: {raw}")))?,
        ),
        None => None,
    };
    let filter = ResourceFilter {
        search: query.search,
        resource_type,
    };

    let resources = state.resources.list(&principal, &filter).await?;
    Ok(Json(json!({ "resources": resources })))
}

/// `POST /api/resources`
///
/// # Errors
///
/// See [`crate::resources::ResourceService::save_from_message`].
pub async fn save_resource(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Json(body): Json<SaveResourceRequest>,
) -> Result<(StatusCode, Json<Value>)> {
    let resource = state.resources.save_from_message(&principal, body).await?;
    Ok((StatusCode::CREATED, Json(json!({ "resource": resource }))))
}

/// `DELETE /api/resources/{id}`
///
/// # Errors
///
/// `404` unless the principal owns the resource.
pub async fn delete_resource(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    state.resources.delete(&principal, &id).await?;
    Ok(Json(json!({ "success": true })))
}

/// `POST /api/resources/{id}/execute`
///
/// # Errors
///
/// `404` unless the principal owns the resource.
pub async fn execute_resource(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    let task = state.resources.record_execution(&principal, &id).await?;
    Ok(Json(json!({ "success": true, "agentRequest": task })))
}

/// `POST /api/resources/{id}/share`
///
/// An empty body shares without expiry or limit.
///
/// # Errors
///
/// `400` for invalid limits, `404` unless the principal owns the resource.
pub async fn share_resource(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<ShareLink>> {
    let request: ShareRequest = if body.iter().all(u8::is_ascii_whitespace) {
        ShareRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|err| AppError::InvalidRequest(format!("invalid share request: {err}")))?
    };
    let link = state.resources.share(&principal, &id, &request).await?;
    Ok(Json(link))
}

/// `GET /api/resources/share/{token}`
///
/// # Errors
///
/// `404` unknown, `410` expired, `429` access limit reached.
pub async fn open_shared(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<Json<Value>> {
    let resource = state.resources.open_shared(&token).await?;
    Ok(Json(json!({ "resource": resource.public_view() })))
}

/// `POST /api/resources/share/{token}/fork`
///
/// # Errors
///
/// Same as [`open_shared`], plus `401` without a principal.
pub async fn fork_shared(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(token): Path<String>,
) -> Result<(StatusCode, Json<Value>)> {
    let fork: Resource = state.resources.fork_shared(&principal, &token).await?;
    Ok((StatusCode::CREATED, Json(json!({ "resource": fork }))))
}
