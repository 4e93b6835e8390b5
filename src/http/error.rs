//! `AppError` to HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::error;

use crate::AppError;

#[derive(Debug, Serialize)]
struct ErrorPayload {
    error: String,
}

impl AppError {
    /// Status code reported for this error.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Expired(_) => StatusCode::GONE,
            Self::LimitReached(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::Config(_) | Self::Db(_) | Self::Agent(_) | Self::Http(_) | Self::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        // Internal details stay in the log.
        let message = if status.is_server_error() {
            error!(err = %self, "request failed");
            "internal server error".to_owned()
        } else {
            match self {
                Self::Unauthorized(msg)
                | Self::InvalidRequest(msg)
                | Self::NotFound(msg)
                | Self::Expired(msg)
                | Self::LimitReached(msg) => msg,
                other => other.to_string(),
            }
        };
        (status, Json(ErrorPayload { error: message })).into_response()
    }
}
