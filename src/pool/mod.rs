//! Connection pool management subsystem.
//!
//! # Data Flow
//! ```text
//! credential map document (JSON: identifier → connection string)
//!     → snapshot.rs (fetch, parse, content hash)
//!     → refresh.rs (poll on a timer, swap on hash change)
//!     → manager.rs (identifier → lazily-built pool, scoped handles)
//!     → postgres.rs (deadpool-backed pools, read-only checkouts)
//! ```
//!
//! # Design Decisions
//! - Clients hold opaque connection identifiers, never raw credentials
//! - Pools are built on first acquire, not eagerly per config entry
//! - A snapshot swap never force-closes pools that are already open
//! - Per-identifier initialization locking; no global pool lock

pub mod manager;
pub mod postgres;
pub mod refresh;
pub mod snapshot;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

pub use manager::{PoolHandle, PoolManager};
pub use postgres::PostgresFactory;
pub use refresh::RefreshLoop;
pub use snapshot::{ConfigReadError, ConfigSnapshot, ConfigSource, FileSource};

use crate::config::PoolConfig;

/// Errors surfaced by the pool manager.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// The identifier is absent from the current credential snapshot.
    #[error("unknown connection identifier: {0}")]
    UnknownIdentifier(String),

    /// Building the pool failed (credential unreachable or rejected).
    #[error("failed to initialize pool: {0}")]
    InitFailure(String),

    /// No free connection became available within the acquire timeout.
    #[error("connection pool exhausted")]
    Exhausted,

    /// The pool is being closed; the caller must not receive a
    /// connection from a half-closed pool.
    #[error("connection pool closed")]
    Closed,
}

/// Errors from executing a query on a pooled connection.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("query failed: {0}")]
    Execution(String),

    #[error("unsupported column type: {0}")]
    UnsupportedType(String),
}

/// Sizing and timeout limits applied to every pool.
#[derive(Debug, Clone)]
pub struct PoolOptions {
    pub min_size: usize,
    pub max_size: usize,
    pub acquire_timeout: Duration,
    pub connect_timeout: Duration,
}

impl From<&PoolConfig> for PoolOptions {
    fn from(config: &PoolConfig) -> Self {
        Self {
            min_size: config.min_size,
            max_size: config.max_size,
            acquire_timeout: Duration::from_secs(config.acquire_timeout_secs),
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
        }
    }
}

/// A checked-out database connection, already in read-only mode.
#[async_trait]
pub trait PooledConnection: Send + Sync {
    /// Run a query and return rows as JSON objects.
    async fn query_json(&self, sql: &str, params: &[Value]) -> Result<Vec<Value>, QueryError>;
}

/// One live pool of connections for a single identifier.
#[async_trait]
pub trait ConnectionPool: Send + Sync {
    /// Check a connection out of the pool. Returned connections go back
    /// to the pool when dropped.
    async fn checkout(&self) -> Result<Box<dyn PooledConnection>, PoolError>;

    /// Drain and close the pool. Called only after all outstanding
    /// handles have been released.
    async fn close(&self);
}

/// Builds pools from credential strings. The production implementation is
/// [`PostgresFactory`]; tests substitute a counting mock.
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    async fn open(
        &self,
        credential: &str,
        options: &PoolOptions,
    ) -> Result<Box<dyn ConnectionPool>, PoolError>;
}
