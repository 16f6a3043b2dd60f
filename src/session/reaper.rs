//! Idle session reaper.
//!
//! Scans the session registry on a fixed interval and closes sessions
//! whose last activity is older than the configured timeout. Started
//! exactly once during startup. Safe against concurrent traffic: the
//! registry removes an entry before releasing its resources, and the
//! per-session state machine makes the transition idempotent.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::session::registry::SessionRegistry;

pub struct IdleReaper {
    sessions: Arc<SessionRegistry>,
    interval: Duration,
    idle_timeout: Duration,
}

impl IdleReaper {
    pub fn new(sessions: Arc<SessionRegistry>, interval: Duration, idle_timeout: Duration) -> Self {
        Self {
            sessions,
            interval,
            idle_timeout,
        }
    }

    /// One scan over the registry. Returns how many sessions were reaped.
    pub fn sweep(&self) -> usize {
        let mut reaped = 0;
        for key in self.sessions.idle_keys(self.idle_timeout) {
            if self.sessions.close(&key) {
                tracing::info!(session = %key.label(), "reaped idle session");
                reaped += 1;
            }
        }
        reaped
    }

    /// Run until the shutdown signal fires.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let reaped = self.sweep();
                    if reaped > 0 {
                        tracing::info!(reaped, "idle sweep complete");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("idle reaper stopping");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::echo::EchoBackendFactory;
    use crate::backend::BackendDescriptor;
    use crate::session::registry::{RouteError, SessionKey};

    fn echo_descriptor() -> BackendDescriptor {
        BackendDescriptor {
            name: "echo".to_string(),
            factory: Arc::new(EchoBackendFactory),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn idle_session_is_reaped_and_messages_then_404() {
        let registry = Arc::new(SessionRegistry::new(8));
        let reaper = IdleReaper::new(
            registry.clone(),
            Duration::from_secs(300),
            Duration::from_secs(3600),
        );

        let key = SessionKey::new("echo", "idle-one");
        let _attachment = registry
            .open_or_attach(key.clone(), "tester", &echo_descriptor())
            .unwrap();

        // Not idle yet: nothing to reap.
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(reaper.sweep(), 0);
        assert!(registry.contains(&key));

        // Advance past the timeout without any traffic.
        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert_eq!(reaper.sweep(), 1);
        assert!(!registry.contains(&key));

        assert!(matches!(
            registry.route_message(&key, serde_json::json!({})).await,
            Err(RouteError::NotFound)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn traffic_keeps_a_session_alive() {
        let registry = Arc::new(SessionRegistry::new(8));
        let reaper = IdleReaper::new(
            registry.clone(),
            Duration::from_secs(300),
            Duration::from_secs(3600),
        );

        let busy = SessionKey::new("echo", "busy");
        let idle = SessionKey::new("echo", "idle");
        let _a = registry
            .open_or_attach(busy.clone(), "tester", &echo_descriptor())
            .unwrap();
        let _b = registry
            .open_or_attach(idle.clone(), "tester", &echo_descriptor())
            .unwrap();

        tokio::time::sleep(Duration::from_secs(3000)).await;
        registry
            .route_message(&busy, serde_json::json!({"keepalive": true}))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_secs(1000)).await;
        assert_eq!(reaper.sweep(), 1);
        assert!(registry.contains(&busy));
        assert!(!registry.contains(&idle));
    }
}
