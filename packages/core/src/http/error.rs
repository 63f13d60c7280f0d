//! HTTP error mapping.
//!
//! Translates `HubError` kinds into status codes. Malformed identifiers map
//! to 404, not 400, so error shapes cannot be used to probe for existence.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

use crate::services::{ErrorKind, HubError};

/// An error ready to be rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// 400 with a plain message, for request-shape problems.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    /// Mapping for admission-time errors on message submission: entities
    /// missing during validation are the sender's problem (400), not an
    /// unknown resource (404).
    pub fn admission(err: HubError) -> Self {
        match err.kind() {
            ErrorKind::NotFound => Self::new(StatusCode::BAD_REQUEST, err.to_string()),
            _ => Self::from(err),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<HubError> for ApiError {
    fn from(err: HubError) -> Self {
        let status = match err.kind() {
            ErrorKind::DatabaseNotFound | ErrorKind::InvalidId | ErrorKind::NotFound => {
                StatusCode::NOT_FOUND
            }
            ErrorKind::InvalidOperation | ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %err, "internal error");
        }
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}
