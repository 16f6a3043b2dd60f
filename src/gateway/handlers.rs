//! Request handlers.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use futures_util::stream::{self, Stream, StreamExt};
use serde_json::{json, Value};

use crate::auth::AuthContext;
use crate::gateway::error::GatewayError;
use crate::gateway::server::AppState;
use crate::observability::metrics;
use crate::session::{SessionKey, SessionRegistry};

/// Root endpoint: simple liveness + the registered backend names.
pub async fn root(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "message": "toolgate running",
        "backends": state.backends.names(),
    }))
}

/// Health check endpoint.
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "backends": state.backends.names(),
    }))
}

/// Prometheus scrape endpoint.
pub async fn metrics_scrape(State(state): State<AppState>) -> Response {
    match state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics disabled").into_response(),
    }
}

/// Issue a bearer token for the given subject identity.
pub async fn issue_token(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, GatewayError> {
    let start = Instant::now();
    let subject = body
        .get("subject")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| GatewayError::BadRequest("subject is required".to_string()))?;

    let token = state
        .tokens
        .issue(subject)
        .map_err(|err| GatewayError::Internal(err.to_string()))?;

    tracing::info!(subject, "issued token");
    metrics::record_request("POST", 200, start);
    Ok(Json(json!({ "success": true, "token": token })))
}

/// Closes the session when its SSE stream is dropped, unless a newer
/// stream has taken the session over in the meantime.
struct StreamGuard {
    sessions: Arc<SessionRegistry>,
    key: SessionKey,
    generation: u64,
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        if self.sessions.close_if_current(&self.key, self.generation) {
            tracing::info!(session = %self.key.label(), "stream disconnected, session closed");
        }
    }
}

/// Stream-open: bind (backend, session key) to a session and hold the
/// SSE channel open, multiplexing backend responses over it.
pub async fn stream_open(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path((backend, session_key)): Path<(String, String)>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, GatewayError> {
    let descriptor = state
        .backends
        .get(&backend)
        .ok_or_else(|| GatewayError::BackendNotFound(backend.clone()))?;

    let key = SessionKey::new(backend, session_key);
    let attachment = state
        .sessions
        .open_or_attach(key.clone(), &auth.subject, &descriptor)
        .map_err(|err| GatewayError::Internal(err.to_string()))?;

    tracing::info!(
        session = %key.label(),
        subject = %auth.subject,
        created = attachment.created,
        "stream opened"
    );

    let endpoint = format!("/{}/{}/messages", key.backend, key.key);
    let preamble = stream::iter(vec![
        Ok::<_, Infallible>(Event::default().event("endpoint").data(endpoint)),
        Ok(Event::default()
            .event("initialization")
            .data(descriptor.factory.initialization_options().to_string())),
    ]);

    let guard = StreamGuard {
        sessions: state.sessions.clone(),
        key,
        generation: attachment.generation,
    };
    let messages = stream::unfold(
        (attachment.receiver, guard),
        |(mut receiver, guard)| async move {
            let value = receiver.recv().await?;
            let event = Event::default().event("message").data(value.to_string());
            Some((Ok(event), (receiver, guard)))
        },
    );

    Ok(Sse::new(preamble.chain(messages)).keep_alive(KeepAlive::default()))
}

/// Submit one protocol message to an open session.
pub async fn submit_message(
    State(state): State<AppState>,
    Path((backend, session_key)): Path<(String, String)>,
    Json(message): Json<Value>,
) -> Result<impl IntoResponse, GatewayError> {
    let start = Instant::now();
    let key = SessionKey::new(backend, session_key);
    state.sessions.route_message(&key, message).await?;

    metrics::record_request("POST", 202, start);
    Ok((StatusCode::ACCEPTED, Json(json!({ "success": true }))))
}
