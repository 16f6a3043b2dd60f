//! Shared utilities for integration testing.
//!
//! Spins up a full gateway (echo + sql backends, mock connection
//! factory, temp-file credential map) on an ephemeral port and provides
//! a minimal SSE reader for driving streams.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use toolgate::auth::TokenService;
use toolgate::backend::BackendRegistry;
use toolgate::config::{BackendEntry, GatewayConfig};
use toolgate::gateway::{build_router, AppState};
use toolgate::pool::{
    ConnectionFactory, ConnectionPool, FileSource, PoolError, PoolManager, PoolOptions,
    PooledConnection, QueryError,
};
use toolgate::session::SessionRegistry;

pub const TEST_SECRET: &str = "integration-test-secret";

/// Connection factory returning canned rows, so the sql backend can be
/// exercised without a database.
struct StubFactory;
struct StubPool;
struct StubConn;

#[async_trait]
impl ConnectionFactory for StubFactory {
    async fn open(
        &self,
        _credential: &str,
        _options: &PoolOptions,
    ) -> Result<Box<dyn ConnectionPool>, PoolError> {
        Ok(Box::new(StubPool))
    }
}

#[async_trait]
impl ConnectionPool for StubPool {
    async fn checkout(&self) -> Result<Box<dyn PooledConnection>, PoolError> {
        Ok(Box::new(StubConn))
    }

    async fn close(&self) {}
}

#[async_trait]
impl PooledConnection for StubConn {
    async fn query_json(&self, sql: &str, _params: &[Value]) -> Result<Vec<Value>, QueryError> {
        if sql.contains("syntax error") {
            return Err(QueryError::Execution("syntax error at or near".to_string()));
        }
        Ok(vec![json!({"id": 1, "name": "alice"})])
    }
}

pub struct TestGateway {
    pub base_url: String,
    pub client: reqwest::Client,
    pub tokens: Arc<TokenService>,
    pub sessions: Arc<SessionRegistry>,
    // Keeps the credential map file alive for the gateway's lifetime.
    _credentials: tempfile::NamedTempFile,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn issue_token(&self, subject: &str) -> String {
        let body: Value = self
            .client
            .post(self.url("/token"))
            .json(&json!({ "subject": subject }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        body["token"].as_str().unwrap().to_string()
    }
}

/// Start a gateway with echo and sql backends on an ephemeral port.
pub async fn spawn_gateway() -> TestGateway {
    let mut credentials = tempfile::NamedTempFile::new().unwrap();
    write!(credentials, r#"{{"db1": "postgres://stub/one"}}"#).unwrap();

    let mut config = GatewayConfig::default();
    config.auth.secret = TEST_SECRET.to_string();
    config.backends = vec![
        BackendEntry {
            name: "echo".to_string(),
            kind: "echo".to_string(),
        },
        BackendEntry {
            name: "sql".to_string(),
            kind: "sql".to_string(),
        },
    ];

    let tokens = Arc::new(TokenService::new(
        TEST_SECRET,
        Duration::from_secs(24 * 60 * 60),
    ));

    let pools = Arc::new(PoolManager::new(
        Box::new(FileSource::new(credentials.path())),
        Box::new(StubFactory),
        PoolOptions {
            min_size: 0,
            max_size: 2,
            acquire_timeout: Duration::from_secs(1),
            connect_timeout: Duration::from_secs(1),
        },
    ));
    pools.refresh_once().await.unwrap();

    let backends = Arc::new(BackendRegistry::build(&config.backends, pools.clone()));
    let sessions = Arc::new(SessionRegistry::new(config.sessions.channel_capacity));

    let state = AppState {
        tokens: tokens.clone(),
        pools,
        backends,
        sessions: sessions.clone(),
        metrics: None,
        config: Arc::new(config),
    };

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = build_router(state);
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    TestGateway {
        base_url: format!("http://{addr}"),
        client: reqwest::Client::new(),
        tokens,
        sessions,
        _credentials: credentials,
    }
}

/// Minimal SSE event reader over a reqwest byte stream.
pub struct SseReader {
    stream: std::pin::Pin<
        Box<dyn futures_util::Stream<Item = reqwest::Result<bytes::Bytes>> + Send>,
    >,
    buffer: String,
}

impl SseReader {
    pub fn new(response: reqwest::Response) -> Self {
        Self {
            stream: Box::pin(response.bytes_stream()),
            buffer: String::new(),
        }
    }

    /// Next (event, data) pair, skipping keep-alive comments.
    pub async fn next_event(&mut self) -> Option<(String, String)> {
        loop {
            if let Some(position) = self.buffer.find("\n\n") {
                let raw = self.buffer[..position].to_string();
                self.buffer.drain(..position + 2);

                let mut event = String::new();
                let mut data = String::new();
                for line in raw.lines() {
                    if let Some(rest) = line.strip_prefix("event:") {
                        event = rest.trim().to_string();
                    } else if let Some(rest) = line.strip_prefix("data:") {
                        data = rest.trim().to_string();
                    }
                    // Lines starting with ':' are keep-alive comments.
                }
                if event.is_empty() && data.is_empty() {
                    continue;
                }
                return Some((event, data));
            }

            let chunk = self.stream.next().await?.ok()?;
            self.buffer.push_str(&String::from_utf8_lossy(&chunk));
        }
    }
}

/// Open an SSE stream for (backend, session key) and consume the
/// preamble (endpoint + initialization events).
pub async fn open_stream(
    gateway: &TestGateway,
    token: &str,
    backend: &str,
    session_key: &str,
) -> SseReader {
    let response = gateway
        .client
        .get(gateway.url(&format!("/{backend}/{session_key}")))
        .bearer_auth(token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);

    let mut reader = SseReader::new(response);
    let (event, data) = reader.next_event().await.unwrap();
    assert_eq!(event, "endpoint");
    assert_eq!(data, format!("/{backend}/{session_key}/messages"));
    let (event, _) = reader.next_event().await.unwrap();
    assert_eq!(event, "initialization");
    reader
}

/// Post one message to an open session.
pub async fn post_message(
    gateway: &TestGateway,
    token: &str,
    backend: &str,
    session_key: &str,
    message: &Value,
) -> reqwest::StatusCode {
    gateway
        .client
        .post(gateway.url(&format!("/{backend}/{session_key}/messages")))
        .bearer_auth(token)
        .json(message)
        .send()
        .await
        .unwrap()
        .status()
}
