//! Backend registry subsystem.
//!
//! # Data Flow
//! ```text
//! config [[backends]] entries
//!     → registry build (startup, once)
//!     → BackendDescriptor { name, factory }
//!     → per-session: factory.create(subject, conn_id) → ToolBackend
//!     → session driver: message in → handle() → message out
//! ```
//!
//! # Design Decisions
//! - Registration table is static for the process lifetime; adding a
//!   backend requires a restart
//! - One failed registration is logged and skipped; it never aborts the
//!   others. Zero successful registrations aborts startup (in main)
//! - Query/tool failures are returned as structured payloads at this
//!   boundary, never as transport errors

pub mod echo;
pub mod sql;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::BackendEntry;
use crate::pool::PoolManager;

/// Errors constructing a backend or its per-session instance.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("unknown backend kind: {0}")]
    UnknownKind(String),

    #[error("backend construction failed: {0}")]
    Construction(String),
}

/// A per-session tool server instance.
///
/// Messages arrive in per-session order (the session driver is a single
/// sequential loop) and responses go back over the session's stream.
#[async_trait]
pub trait ToolBackend: Send + Sync {
    async fn handle(&self, message: Value) -> Value;
}

/// Factory contract every registered backend must expose: a per-session
/// constructor and an initialization-options provider.
pub trait BackendFactory: Send + Sync {
    /// Build an instance bound to the caller identity and the optional
    /// connection identifier parsed from the session key.
    fn create(
        &self,
        subject: &str,
        conn_id: Option<&str>,
    ) -> Result<Arc<dyn ToolBackend>, BackendError>;

    /// Capability / initialization metadata announced on stream-open.
    fn initialization_options(&self) -> Value;
}

/// A registered backend.
pub struct BackendDescriptor {
    pub name: String,
    pub factory: Arc<dyn BackendFactory>,
}

/// Immutable name → descriptor table, built once at startup.
pub struct BackendRegistry {
    backends: HashMap<String, Arc<BackendDescriptor>>,
}

impl BackendRegistry {
    /// Build the registry from the configured entries.
    ///
    /// Entries that fail to construct (unknown kind) are logged and
    /// skipped so one bad entry cannot take down the rest.
    pub fn build(entries: &[BackendEntry], pools: Arc<PoolManager>) -> Self {
        let mut backends = HashMap::new();

        for entry in entries {
            match construct_factory(&entry.kind, &pools) {
                Ok(factory) => {
                    tracing::info!(backend = %entry.name, kind = %entry.kind, "registered backend");
                    backends.insert(
                        entry.name.clone(),
                        Arc::new(BackendDescriptor {
                            name: entry.name.clone(),
                            factory,
                        }),
                    );
                }
                Err(err) => {
                    tracing::error!(backend = %entry.name, error = %err, "skipping backend registration");
                }
            }
        }

        Self { backends }
    }

    pub fn get(&self, name: &str) -> Option<Arc<BackendDescriptor>> {
        self.backends.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.backends.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}

fn construct_factory(
    kind: &str,
    pools: &Arc<PoolManager>,
) -> Result<Arc<dyn BackendFactory>, BackendError> {
    match kind {
        "sql" => Ok(Arc::new(sql::SqlBackendFactory::new(pools.clone()))),
        "echo" => Ok(Arc::new(echo::EchoBackendFactory)),
        other => Err(BackendError::UnknownKind(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{PoolOptions, PostgresFactory};
    use crate::pool::snapshot::FileSource;
    use std::time::Duration;

    fn pools() -> Arc<PoolManager> {
        Arc::new(PoolManager::new(
            Box::new(FileSource::new("/nonexistent")),
            Box::new(PostgresFactory),
            PoolOptions {
                min_size: 0,
                max_size: 1,
                acquire_timeout: Duration::from_secs(1),
                connect_timeout: Duration::from_secs(1),
            },
        ))
    }

    fn entry(name: &str, kind: &str) -> BackendEntry {
        BackendEntry {
            name: name.to_string(),
            kind: kind.to_string(),
        }
    }

    #[test]
    fn registers_known_kinds() {
        let registry =
            BackendRegistry::build(&[entry("sql", "sql"), entry("echo", "echo")], pools());
        assert_eq!(registry.names(), vec!["echo", "sql"]);
    }

    #[test]
    fn skips_failed_entries_without_aborting_others() {
        let registry = BackendRegistry::build(
            &[entry("bad", "no-such-kind"), entry("echo", "echo")],
            pools(),
        );
        assert!(registry.get("bad").is_none());
        assert!(registry.get("echo").is_some());
    }
}
