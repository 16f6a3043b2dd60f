//! Echo backend.
//!
//! Returns every message verbatim, tagged with a per-session sequence
//! number. Exists as the smallest real implementation of the factory
//! contract; the integration tests lean on the sequence numbers to check
//! per-session ordering.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::backend::{BackendError, BackendFactory, ToolBackend};

pub struct EchoBackendFactory;

impl BackendFactory for EchoBackendFactory {
    fn create(
        &self,
        subject: &str,
        _conn_id: Option<&str>,
    ) -> Result<Arc<dyn ToolBackend>, BackendError> {
        Ok(Arc::new(EchoBackend {
            subject: subject.to_string(),
            seq: AtomicU64::new(0),
        }))
    }

    fn initialization_options(&self) -> Value {
        json!({ "name": "echo", "capabilities": { "tools": ["echo"] } })
    }
}

struct EchoBackend {
    subject: String,
    seq: AtomicU64,
}

#[async_trait]
impl ToolBackend for EchoBackend {
    async fn handle(&self, message: Value) -> Value {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        json!({
            "success": true,
            "subject": self.subject,
            "seq": seq,
            "echo": message,
        })
    }
}
