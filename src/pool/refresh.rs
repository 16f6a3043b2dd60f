//! Background credential map refresh.
//!
//! Started exactly once during process startup; never spawned from a
//! request path. Each tick re-reads the credential map and swaps the
//! snapshot only when the content hash changed. Failures are logged and
//! retried on the next tick; they never tear down existing pools.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::pool::manager::PoolManager;

pub struct RefreshLoop {
    pools: Arc<PoolManager>,
    interval: Duration,
}

impl RefreshLoop {
    pub fn new(pools: Arc<PoolManager>, interval: Duration) -> Self {
        Self { pools, interval }
    }

    /// Run until the shutdown signal fires.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.interval);
        // The immediate first tick was consumed by startup's initial load.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.pools.refresh_once().await {
                        Ok(true) => {}
                        Ok(false) => {
                            tracing::debug!("credential map unchanged");
                        }
                        Err(err) => {
                            tracing::warn!(error = %err, "credential map refresh failed, keeping previous snapshot");
                        }
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("credential refresh loop stopping");
                    break;
                }
            }
        }
    }
}
