//! Read-only SQL backend.
//!
//! Exposes the pooled databases to a session. Every failure (unknown
//! identifier, pool trouble, bad SQL) comes back as a structured
//! `{"success": false, "error": ...}` payload so one bad query never
//! closes the session.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::backend::{BackendError, BackendFactory, ToolBackend};
use crate::pool::PoolManager;

pub struct SqlBackendFactory {
    pools: Arc<PoolManager>,
}

impl SqlBackendFactory {
    pub fn new(pools: Arc<PoolManager>) -> Self {
        Self { pools }
    }
}

impl BackendFactory for SqlBackendFactory {
    fn create(
        &self,
        subject: &str,
        conn_id: Option<&str>,
    ) -> Result<Arc<dyn ToolBackend>, BackendError> {
        Ok(Arc::new(SqlBackend {
            pools: self.pools.clone(),
            subject: subject.to_string(),
            conn_id: conn_id.map(str::to_string),
        }))
    }

    fn initialization_options(&self) -> Value {
        json!({
            "name": "sql",
            "capabilities": { "tools": ["query", "ping"] },
            "read_only": true,
        })
    }
}

struct SqlBackend {
    pools: Arc<PoolManager>,
    subject: String,
    /// Connection identifier bound at session open; a per-message
    /// `conn_id` parameter takes precedence when present.
    conn_id: Option<String>,
}

#[async_trait]
impl ToolBackend for SqlBackend {
    async fn handle(&self, message: Value) -> Value {
        match message.get("method").and_then(Value::as_str) {
            Some("ping") => json!({ "success": true, "message": "pong" }),
            Some("query") => self.query(message.get("params").unwrap_or(&Value::Null)).await,
            Some(other) => failure(format!("unknown method: {other}")),
            None => failure("message has no method".to_string()),
        }
    }
}

impl SqlBackend {
    async fn query(&self, params: &Value) -> Value {
        let Some(sql) = params.get("sql").and_then(Value::as_str) else {
            return failure("query requires a sql parameter".to_string());
        };

        let conn_id = params
            .get("conn_id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| self.conn_id.clone());
        let Some(conn_id) = conn_id else {
            return failure("connection identifier is required".to_string());
        };

        let query_params: Vec<Value> = params
            .get("params")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        tracing::info!(
            subject = %self.subject,
            conn_id = %conn_id,
            sql = %sql,
            "executing query"
        );

        let handle = match self.pools.acquire(&conn_id).await {
            Ok(handle) => handle,
            Err(err) => return failure(err.to_string()),
        };

        match handle.query_json(sql, &query_params).await {
            Ok(rows) => json!({ "success": true, "data": rows }),
            Err(err) => {
                tracing::error!(conn_id = %conn_id, error = %err, "query execution error");
                failure(err.to_string())
            }
        }
    }
}

fn failure(error: String) -> Value {
    json!({ "success": false, "error": error })
}
