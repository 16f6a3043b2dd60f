//! Session registry.
//!
//! # Responsibilities
//! - Map (backend, session key) to the single live session for that pair
//! - Create sessions atomically per key (no duplicate backend instances)
//! - Route submitted messages to the session's driver in order
//! - Tear sessions down without racing in-flight traffic
//!
//! # Design Decisions
//! - State machine per session: Active → Closing → Closed; Closed is
//!   terminal and a reappearing key gets a brand-new session
//! - Teardown removes the registry entry before releasing the channel
//!   and backend instance, so nothing can route into a dying session
//! - One driver task per session consumes the inbound channel
//!   sequentially, which is what gives per-session total ordering
//! - A reconnecting client supersedes the previous stream; streams carry
//!   a generation so a stale stream's disconnect cannot close the
//!   session out from under its successor

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::backend::{BackendDescriptor, BackendError};
use crate::observability::metrics;

/// Identifies one logical client conversation with a specific backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub backend: String,
    pub key: String,
}

impl SessionKey {
    pub fn new(backend: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
            key: key.into(),
        }
    }

    /// Label form used in logs and metrics.
    pub fn label(&self) -> String {
        format!("{}:{}", self.backend, self.key)
    }

    /// Connection identifier embedded in the session key, when present
    /// (the suffix after the last `:`, e.g. `user123:a1b2c3`).
    pub fn conn_id(&self) -> Option<&str> {
        self.key.rsplit_once(':').map(|(_, conn_id)| conn_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Active,
    Closing,
    Closed,
}

/// One live session: the backend instance's channel endpoints plus the
/// bookkeeping the reaper and router need.
pub struct Session {
    pub key: SessionKey,
    pub subject: String,
    inbound: mpsc::Sender<Value>,
    outbound: Mutex<Option<mpsc::Sender<Value>>>,
    stream_generation: AtomicU64,
    last_active: Mutex<Instant>,
    state: Mutex<SessionState>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    /// Refresh the last-active timestamp.
    fn touch(&self) {
        *self.last_active.lock().unwrap() = Instant::now();
    }

    fn idle_for(&self) -> std::time::Duration {
        self.last_active.lock().unwrap().elapsed()
    }

    fn is_active(&self) -> bool {
        *self.state.lock().unwrap() == SessionState::Active
    }

    /// Attach a fresh stream, superseding any previous one. Returns the
    /// new stream's receiver and generation, or `None` when the session
    /// is no longer Active.
    fn attach_stream(&self, capacity: usize) -> Option<(mpsc::Receiver<Value>, u64)> {
        if !self.is_active() {
            return None;
        }
        let (tx, rx) = mpsc::channel(capacity);
        *self.outbound.lock().unwrap() = Some(tx);
        let generation = self.stream_generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.touch();
        Some((rx, generation))
    }

    fn current_generation(&self) -> u64 {
        self.stream_generation.load(Ordering::SeqCst)
    }

    /// Drive the Active → Closing → Closed transition. Idempotent. The
    /// driver task is cancelled rather than orphaned, which also cancels
    /// any in-flight backend call.
    fn shut_down(&self) {
        {
            let mut state = self.state.lock().unwrap();
            if *state == SessionState::Closed {
                return;
            }
            *state = SessionState::Closing;
        }

        if let Some(driver) = self.driver.lock().unwrap().take() {
            driver.abort();
        }
        self.outbound.lock().unwrap().take();

        *self.state.lock().unwrap() = SessionState::Closed;
    }
}

/// Handed to the stream-open handler: the session plus the receiver half
/// of its (possibly new) outbound stream.
pub struct StreamAttachment {
    pub session: Arc<Session>,
    pub receiver: mpsc::Receiver<Value>,
    pub generation: u64,
    pub created: bool,
}

/// Errors routing a message to a session.
#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error("session not found or expired")]
    NotFound,
}

/// Process-scoped map of live sessions.
pub struct SessionRegistry {
    sessions: DashMap<SessionKey, Arc<Session>>,
    channel_capacity: usize,
}

impl SessionRegistry {
    pub fn new(channel_capacity: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            channel_capacity,
        }
    }

    /// Open a session for `key`, or attach to the existing one.
    ///
    /// The map's entry API serializes concurrent opens per key, so
    /// exactly one backend instance is ever constructed for a pair.
    pub fn open_or_attach(
        &self,
        key: SessionKey,
        subject: &str,
        descriptor: &BackendDescriptor,
    ) -> Result<StreamAttachment, BackendError> {
        match self.sessions.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                let session = occupied.get().clone();
                if let Some((receiver, generation)) =
                    session.attach_stream(self.channel_capacity)
                {
                    return Ok(StreamAttachment {
                        session,
                        receiver,
                        generation,
                        created: false,
                    });
                }
                // The old session is mid-teardown; replace it.
                let (session, receiver, generation) =
                    self.spawn_session(key, subject, descriptor)?;
                occupied.insert(session.clone());
                Ok(StreamAttachment {
                    session,
                    receiver,
                    generation,
                    created: true,
                })
            }
            Entry::Vacant(vacant) => {
                let (session, receiver, generation) =
                    self.spawn_session(key, subject, descriptor)?;
                vacant.insert(session.clone());
                Ok(StreamAttachment {
                    session,
                    receiver,
                    generation,
                    created: true,
                })
            }
        }
    }

    fn spawn_session(
        &self,
        key: SessionKey,
        subject: &str,
        descriptor: &BackendDescriptor,
    ) -> Result<(Arc<Session>, mpsc::Receiver<Value>, u64), BackendError> {
        let backend = descriptor.factory.create(subject, key.conn_id())?;

        let (inbound_tx, mut inbound_rx) = mpsc::channel::<Value>(self.channel_capacity);
        let (outbound_tx, outbound_rx) = mpsc::channel::<Value>(self.channel_capacity);

        let session = Arc::new(Session {
            key: key.clone(),
            subject: subject.to_string(),
            inbound: inbound_tx,
            outbound: Mutex::new(Some(outbound_tx)),
            stream_generation: AtomicU64::new(1),
            last_active: Mutex::new(Instant::now()),
            state: Mutex::new(SessionState::Active),
            driver: Mutex::new(None),
        });

        let driver_session = session.clone();
        let driver = tokio::spawn(async move {
            while let Some(message) = inbound_rx.recv().await {
                let response = backend.handle(message).await;
                let outbound = driver_session.outbound.lock().unwrap().clone();
                if let Some(outbound) = outbound {
                    if outbound.send(response).await.is_err() {
                        tracing::debug!(
                            session = %driver_session.key.label(),
                            "no live stream for response, dropping"
                        );
                    }
                }
            }
        });
        *session.driver.lock().unwrap() = Some(driver);

        metrics::session_opened(&key.backend);
        tracing::info!(session = %key.label(), subject, "session opened");

        Ok((session, outbound_rx, 1))
    }

    /// Submit one message to a live session.
    pub async fn route_message(&self, key: &SessionKey, message: Value) -> Result<(), RouteError> {
        let session = self
            .sessions
            .get(key)
            .map(|entry| entry.value().clone())
            .ok_or(RouteError::NotFound)?;

        session.touch();
        metrics::message_routed(&key.backend);
        session
            .inbound
            .send(message)
            .await
            .map_err(|_| RouteError::NotFound)
    }

    /// Close and unregister the session for `key`. Returns whether a
    /// session was actually closed.
    pub fn close(&self, key: &SessionKey) -> bool {
        let Some((_, session)) = self.sessions.remove(key) else {
            return false;
        };
        self.finish_close(key, session);
        true
    }

    /// Close the session only if `generation` still identifies its
    /// current stream. Used by a disconnecting stream so it cannot tear
    /// down a session another stream has since taken over.
    pub fn close_if_current(&self, key: &SessionKey, generation: u64) -> bool {
        // The generation check and the removal are one map operation; a
        // takeover that bumps the generation concurrently either lands
        // before the check (removal is a no-op) or after the removal (and
        // opens a fresh session).
        let Some((_, session)) = self
            .sessions
            .remove_if(key, |_, session| session.current_generation() == generation)
        else {
            return false;
        };
        self.finish_close(key, session);
        true
    }

    fn finish_close(&self, key: &SessionKey, session: Arc<Session>) {
        // Entry is gone from the map before any resource is released; no
        // new message can route into the teardown.
        session.shut_down();
        metrics::session_closed(&key.backend);
        tracing::info!(session = %key.label(), "session closed");
    }

    /// Keys of sessions idle longer than `timeout`.
    pub fn idle_keys(&self, timeout: std::time::Duration) -> Vec<SessionKey> {
        self.sessions
            .iter()
            .filter(|entry| entry.value().idle_for() > timeout)
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Whether `key` currently has a live session.
    pub fn contains(&self, key: &SessionKey) -> bool {
        self.sessions.contains_key(key)
    }

    /// Close every session. Used during shutdown.
    pub fn close_all(&self) {
        for key in self.sessions.iter().map(|e| e.key().clone()).collect::<Vec<_>>() {
            self.close(&key);
        }
    }
}
