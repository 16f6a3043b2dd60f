//! Pool manager: identifier → live pool of read-only connections.
//!
//! # Responsibilities
//! - Resolve opaque identifiers against the current credential snapshot
//! - Build pools lazily, exactly once per identifier under concurrency
//! - Hand out scoped connection handles (released on drop, all exit paths)
//! - Close pools deterministically without racing in-flight acquires
//!
//! # Design Decisions
//! - Per-identifier initialization lock via `tokio::sync::OnceCell`;
//!   concurrent first acquires wait on the single initialization
//! - `close` marks the entry closing (new acquires fail with `Closed`),
//!   waits for outstanding handles and in-flight initializations,
//!   physically closes, then removes the map entry; at most one pool ever
//!   exists per identifier
//! - Snapshot swaps never touch open pools; rotation only affects future
//!   initializations

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use dashmap::DashMap;
use tokio::sync::{Notify, OnceCell};

use crate::observability::metrics;
use crate::pool::snapshot::{ConfigReadError, ConfigSnapshot, ConfigSource};
use crate::pool::{ConnectionFactory, ConnectionPool, PoolError, PoolOptions, PooledConnection};

/// Per-identifier pool slot.
struct PoolCell {
    pool: OnceCell<Box<dyn ConnectionPool>>,
    closing: AtomicBool,
    outstanding: AtomicUsize,
    released: Notify,
}

impl PoolCell {
    fn new() -> Self {
        Self {
            pool: OnceCell::new(),
            closing: AtomicBool::new(false),
            outstanding: AtomicUsize::new(0),
            released: Notify::new(),
        }
    }
}

/// Decrements the outstanding-handle count when a handle is dropped and
/// wakes any closer waiting for the pool to drain.
struct OutstandingGuard {
    cell: Arc<PoolCell>,
}

impl Drop for OutstandingGuard {
    fn drop(&mut self) {
        self.cell.outstanding.fetch_sub(1, Ordering::SeqCst);
        self.cell.released.notify_waiters();
    }
}

/// A checked-out connection, scoped to the caller.
///
/// Field order matters: the connection returns to its pool before the
/// guard decrements the outstanding count, so `close` never finishes
/// while a connection is still out.
pub struct PoolHandle {
    conn: Box<dyn PooledConnection>,
    _guard: OutstandingGuard,
}

impl std::ops::Deref for PoolHandle {
    type Target = dyn PooledConnection;

    fn deref(&self) -> &Self::Target {
        self.conn.as_ref()
    }
}

/// Owns the identifier → pool mapping and the current credential snapshot.
pub struct PoolManager {
    snapshot: ArcSwap<ConfigSnapshot>,
    source: Box<dyn ConfigSource>,
    factory: Box<dyn ConnectionFactory>,
    pools: DashMap<String, Arc<PoolCell>>,
    options: PoolOptions,
}

impl PoolManager {
    pub fn new(
        source: Box<dyn ConfigSource>,
        factory: Box<dyn ConnectionFactory>,
        options: PoolOptions,
    ) -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(ConfigSnapshot::empty()),
            source,
            factory,
            pools: DashMap::new(),
            options,
        }
    }

    /// Current snapshot (for health/debug output).
    pub fn snapshot(&self) -> Arc<ConfigSnapshot> {
        self.snapshot.load_full()
    }

    /// Look up the credential for `identifier` in the current snapshot.
    pub fn resolve(&self, identifier: &str) -> Result<String, PoolError> {
        self.snapshot
            .load()
            .credentials
            .get(identifier)
            .cloned()
            .ok_or_else(|| PoolError::UnknownIdentifier(identifier.to_string()))
    }

    /// Re-read the credential map and swap the snapshot if its content
    /// hash changed. Returns whether a swap happened. Read or parse
    /// failures leave the previous snapshot in place.
    pub async fn refresh_once(&self) -> Result<bool, ConfigReadError> {
        let raw = self.source.fetch().await?;
        let next = ConfigSnapshot::parse(&raw)?;

        if self.snapshot.load().hash == next.hash {
            return Ok(false);
        }

        tracing::info!(
            hash = %next.hash,
            identifiers = next.credentials.len(),
            "credential map changed, applying new snapshot"
        );
        self.snapshot.store(Arc::new(next));
        Ok(true)
    }

    /// Acquire a pooled connection for `identifier`, initializing the pool
    /// on first use. The handle releases its connection on drop.
    pub async fn acquire(&self, identifier: &str) -> Result<PoolHandle, PoolError> {
        // Unknown identifiers fail before any pool state is created.
        let credential = self.resolve(identifier)?;

        let cell = self
            .pools
            .entry(identifier.to_string())
            .or_insert_with(|| Arc::new(PoolCell::new()))
            .clone();

        // Register as outstanding before the closing check, and only then
        // initialize. A closer that sets the flag after this point waits
        // for us, initialization included, so it can never miss a pool a
        // racing first acquire is still building. SeqCst keeps the
        // flag-store/count-load handshake totally ordered with `close`.
        cell.outstanding.fetch_add(1, Ordering::SeqCst);
        let guard = OutstandingGuard { cell: cell.clone() };
        if cell.closing.load(Ordering::SeqCst) {
            return Err(PoolError::Closed);
        }

        let pool = cell
            .pool
            .get_or_try_init(|| async {
                tracing::info!(identifier, "initializing connection pool");
                let pool = self.factory.open(&credential, &self.options).await?;
                metrics::pool_opened(identifier);
                Ok::<_, PoolError>(pool)
            })
            .await?;

        let conn = match tokio::time::timeout(self.options.acquire_timeout, pool.checkout()).await
        {
            Ok(Ok(conn)) => conn,
            Ok(Err(err)) => return Err(err),
            Err(_) => return Err(PoolError::Exhausted),
        };

        Ok(PoolHandle {
            conn,
            _guard: guard,
        })
    }

    /// Close the pool for `identifier`, if any.
    ///
    /// New acquires fail with [`PoolError::Closed`] as soon as this is
    /// called; the physical close waits until every outstanding handle
    /// has been released. Once `close` returns, a later acquire builds a
    /// fresh pool.
    pub async fn close(&self, identifier: &str) {
        let Some(cell) = self.pools.get(identifier).map(|e| e.value().clone()) else {
            return;
        };

        cell.closing.store(true, Ordering::SeqCst);

        while cell.outstanding.load(Ordering::SeqCst) > 0 {
            let released = cell.released.notified();
            if cell.outstanding.load(Ordering::SeqCst) == 0 {
                break;
            }
            released.await;
        }

        // Acquires hold an outstanding count across initialization, so a
        // pool built by a racing first acquire is visible here after the
        // drain and gets physically closed, not just dropped.
        if let Some(pool) = cell.pool.get() {
            tracing::info!(identifier, "closing connection pool");
            pool.close().await;
            metrics::pool_closed(identifier);
        }

        self.pools
            .remove_if(identifier, |_, entry| Arc::ptr_eq(entry, &cell));
    }

    /// Close every open pool. Used during shutdown.
    pub async fn close_all(&self) {
        let identifiers: Vec<String> = self.pools.iter().map(|e| e.key().clone()).collect();
        for identifier in identifiers {
            self.close(&identifier).await;
        }
    }
}
