//! Bearer-token middleware for session routes.
//!
//! Applied to the stream-open and message-submission routes only; token
//! issuance, health, and metrics endpoints stay unauthenticated.

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};

use crate::gateway::error::GatewayError;
use crate::gateway::server::AppState;

/// Authenticated caller identity, injected into request extensions for
/// downstream handlers.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub subject: String,
}

/// Verify the `Authorization: Bearer <token>` header and stash the
/// resolved subject. Missing, malformed, or expired tokens all map to a
/// single 401 response.
pub async fn require_bearer(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, GatewayError> {
    let token = request
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or(GatewayError::Unauthorized)?;

    let subject = state
        .tokens
        .verify(token)
        .map_err(|_| GatewayError::Unauthorized)?;

    request.extensions_mut().insert(AuthContext { subject });
    Ok(next.run(request).await)
}
