//! HTTP server setup.
//!
//! # Responsibilities
//! - Create the Axum router with all handlers
//! - Wire up middleware (tracing, request ID, auth on session routes)
//! - Serve with graceful shutdown
//!
//! # Routes
//! - `POST /token`: issue a bearer token (open)
//! - `GET /`, `GET /health`: status + registered backends (open)
//! - `GET /metrics`: Prometheus scrape (open)
//! - `GET /{backend}/{session_key}`: stream-open, SSE (bearer)
//! - `POST /{backend}/{session_key}/messages`: submit message (bearer)

use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::request_id::{MakeRequestUuid, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::auth::{require_bearer, TokenService};
use crate::backend::BackendRegistry;
use crate::config::GatewayConfig;
use crate::gateway::handlers;
use crate::pool::PoolManager;
use crate::session::SessionRegistry;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub tokens: Arc<TokenService>,
    pub pools: Arc<PoolManager>,
    pub backends: Arc<BackendRegistry>,
    pub sessions: Arc<SessionRegistry>,
    pub metrics: Option<PrometheusHandle>,
    pub config: Arc<GatewayConfig>,
}

/// HTTP server for the gateway.
pub struct GatewayServer {
    router: Router,
}

impl GatewayServer {
    pub fn new(state: AppState) -> Self {
        Self {
            router: build_router(state),
        }
    }

    /// Run the server until the shutdown signal fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "gateway listening");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!("gateway stopped");
        Ok(())
    }
}

/// Build the Axum router with all middleware layers.
pub fn build_router(state: AppState) -> Router {
    // Session routes sit behind the bearer middleware; control endpoints
    // stay open (token issuance has nothing to authenticate with yet).
    let session_routes = Router::new()
        .route("/{backend}/{session_key}", get(handlers::stream_open))
        .route(
            "/{backend}/{session_key}/messages",
            post(handlers::submit_message),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_bearer,
        ));

    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics_scrape))
        .route("/token", post(handlers::issue_token))
        .merge(session_routes)
        .with_state(state)
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(TraceLayer::new_for_http())
}
