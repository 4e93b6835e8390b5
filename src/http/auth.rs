//! Bearer-token authentication extractor.

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use chrono::Utc;
use tracing::debug;

use super::AppState;
use crate::models::auth::Principal;
use crate::AppError;

/// Extract the token from an `Authorization: Bearer <token>` header value.
///
/// Returns `None` for other schemes and empty tokens.
#[must_use]
pub fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

impl FromRequestParts<Arc<AppState>> for Principal {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(bearer_token)
            .ok_or_else(|| AppError::Unauthorized("Unauthorized".into()))?;

        let session = state
            .auth
            .find_valid(token, Utc::now())
            .await?
            .ok_or_else(|| {
                debug!("rejected unknown or expired bearer token");
                AppError::Unauthorized("Unauthorized".into())
            })?;

        Ok(Principal {
            user_id: session.user_id,
        })
    }
}
