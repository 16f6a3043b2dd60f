//! Gateway error taxonomy and HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::session::RouteError;

/// Errors surfaced at the HTTP boundary.
///
/// Pool-level failures reached through a backend never appear here; they
/// come back inside the session as structured failure payloads.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Missing, malformed, or expired bearer token.
    #[error("missing or invalid authorization")]
    Unauthorized,

    /// No backend registered under the requested name.
    #[error("unknown backend: {0}")]
    BackendNotFound(String),

    /// Message routed to a session that does not exist or has expired.
    #[error("session not found or expired")]
    SessionNotFound,

    /// Malformed request payload (e.g., token issuance without a subject).
    #[error("{0}")]
    BadRequest(String),

    /// Unexpected internal failure affecting this request only.
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    fn status(&self) -> StatusCode {
        match self {
            GatewayError::Unauthorized => StatusCode::UNAUTHORIZED,
            GatewayError::BackendNotFound(_) | GatewayError::SessionNotFound => {
                StatusCode::NOT_FOUND
            }
            GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "request failed");
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<RouteError> for GatewayError {
    fn from(err: RouteError) -> Self {
        match err {
            RouteError::NotFound => GatewayError::SessionNotFound,
        }
    }
}
