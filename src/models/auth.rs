//! Authenticated principal and bearer-token sessions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A bearer-token session issued by the external authentication layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthSession {
    /// Opaque bearer token.
    pub token: String,
    /// User the token authenticates.
    pub user_id: String,
    /// Instant after which the token is rejected.
    pub expires_at: DateTime<Utc>,
}

impl AuthSession {
    /// Whether the session is still usable at `now`.
    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// The user on whose behalf a request is executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    /// Authenticated user identifier.
    pub user_id: String,
}
