// crates/incident-gate-mcp/src/transport.rs
// ============================================================================
// Module: Transport Manager
// Description: Connection lifecycle, send queues, and request submission.
// Purpose: Bridge SSE and stdio connections to sessions and dispatch.
// Dependencies: incident-gate-backend, tokio, uuid
// ============================================================================

//! ## Overview
//! Every connection moves through `Connecting -> Handshaking -> Active ->
//! Draining -> Closed` and owns one bounded send queue. Handshake acks,
//! results, and events are messages posted to that queue; exactly one writer
//! (the SSE stream or the stdio writer) drains it, so frames never interleave.
//!
//! Submissions are accepted or rejected synchronously; accepted tool calls
//! dispatch on their own task so many requests run concurrently per
//! connection. A result is delivered only when the registry confirms the
//! request is still outstanding on a live session, which gives at-most-once
//! delivery and discards results for connections that vanished mid-call.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::RwLock;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use incident_gate_config::SessionConfig;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tokio::sync::Notify;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::debug;
use tracing::info;
use tracing::warn;
use uuid::Uuid;

use crate::access::CallerContext;
use crate::audit::SessionAction;
use crate::dispatch::DispatchContext;
use crate::dispatch::DispatchEngine;
use crate::protocol::EventType;
use crate::protocol::InboundFrame;
use crate::protocol::MAX_REQUEST_ID_LENGTH;
use crate::protocol::OutboundFrame;
use crate::protocol::ToolCallRequest;
use crate::protocol::ToolCallResult;
use crate::sessions::Session;
use crate::sessions::SessionError;
use crate::sessions::SessionNotice;
use crate::sessions::SessionRegistry;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Transport accepted, no session yet.
    Connecting,
    /// Session being negotiated.
    Handshaking,
    /// Accepting requests.
    Active,
    /// Rejecting new requests; in-flight requests may finish.
    Draining,
    /// Queue closed and session released.
    Closed,
}

/// Why a connection is draining.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainReason {
    /// Server shutdown.
    Shutdown,
    /// Session idle past the threshold.
    IdleTimeout,
    /// Client sent a `close` frame.
    ClientClose,
}

impl DrainReason {
    /// Returns the stable label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Shutdown => "shutdown",
            Self::IdleTimeout => "idle_timeout",
            Self::ClientClose => "client_close",
        }
    }
}

/// Queue and drain limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportLimits {
    /// Send queue capacity per connection.
    pub queue_capacity: usize,
    /// Time in-flight requests get to finish once draining.
    pub drain_grace: Duration,
    /// Idle threshold reported in idle events.
    pub idle_timeout: Duration,
}

impl TransportLimits {
    /// Builds limits from configuration.
    #[must_use]
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            queue_capacity: config.queue_capacity.max(1),
            drain_grace: Duration::from_millis(config.drain_grace_ms),
            idle_timeout: Duration::from_millis(config.idle_timeout_ms),
        }
    }
}

/// Delivery counters.
#[derive(Debug, Default)]
pub struct TransportStats {
    /// Results posted to a live queue.
    results_delivered: AtomicU64,
    /// Results dropped because the session or connection was gone.
    results_discarded: AtomicU64,
    /// Broadcast events dropped on full queues.
    events_dropped: AtomicU64,
}

/// Point-in-time copy of [`TransportStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TransportStatsSnapshot {
    /// Results posted to a live queue.
    pub results_delivered: u64,
    /// Results dropped because the session or connection was gone.
    pub results_discarded: u64,
    /// Broadcast events dropped on full queues.
    pub events_dropped: u64,
}

impl TransportStats {
    /// Returns a snapshot of the counters.
    #[must_use]
    pub fn snapshot(&self) -> TransportStatsSnapshot {
        TransportStatsSnapshot {
            results_delivered: self.results_delivered.load(Ordering::Relaxed),
            results_discarded: self.results_discarded.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
        }
    }
}

/// A newly established connection.
#[derive(Debug)]
pub struct Connection {
    /// Session identifier.
    pub session_id: String,
    /// Negotiated package name.
    pub package: String,
    /// Receiving end of the send queue; yields the handshake ack first.
    pub receiver: mpsc::Receiver<OutboundFrame>,
}

/// Acknowledgement of an accepted submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmitAck {
    /// Identifier the result will carry (absent for `close`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

/// Server-side connection record.
struct ConnectionHandle {
    /// Session bound to the connection.
    session: Arc<Session>,
    /// Sending end of the connection's queue.
    sender: mpsc::Sender<OutboundFrame>,
    /// Lifecycle state.
    state: Mutex<ConnectionState>,
    /// Signalled whenever a request on this connection completes.
    settled: Notify,
}

impl ConnectionHandle {
    /// Returns the current state.
    fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Moves to `next`; returns the previous state.
    fn transition(&self, next: ConnectionState) -> ConnectionState {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *state, next)
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Connection establishment failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectError {
    /// The server is shutting down.
    #[error("server is shutting down")]
    ShuttingDown,
    /// The session could not be opened.
    #[error(transparent)]
    Rejected(#[from] SessionError),
}

/// Submission failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    /// No live session with that identifier.
    #[error("unknown session: {0}")]
    UnknownSession(String),
    /// Session is draining or closed.
    #[error("session is draining")]
    Draining,
    /// Request identifier already used in this session.
    #[error("duplicate request id: {0}")]
    DuplicateRequest(String),
    /// Too many requests in flight.
    #[error("in-flight limit reached ({0})")]
    InflightLimit(usize),
    /// Session exhausted its request identifiers.
    #[error("request id limit reached ({0}); reconnect to continue")]
    RequestIdLimit(usize),
    /// Frame is not valid for this session.
    #[error("malformed frame: {0}")]
    Malformed(String),
    /// Frame body exceeded the size limit.
    #[error("frame exceeds {0} bytes")]
    PayloadTooLarge(usize),
}

impl SubmitError {
    /// Returns the stable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::UnknownSession(_) => "unknown_session",
            Self::Draining => "draining",
            Self::DuplicateRequest(_) => "duplicate_request",
            Self::InflightLimit(_) => "inflight_limit",
            Self::RequestIdLimit(_) => "request_id_limit",
            Self::Malformed(_) => "malformed",
            Self::PayloadTooLarge(_) => "payload_too_large",
        }
    }
}

impl From<SessionError> for SubmitError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::UnknownSession(id) => Self::UnknownSession(id),
            SessionError::DuplicateRequest(id) => Self::DuplicateRequest(id),
            SessionError::InflightLimit(limit) => Self::InflightLimit(limit),
            SessionError::RequestIdLimit(limit) => Self::RequestIdLimit(limit),
            other @ (SessionError::UnknownPackage(_)
            | SessionError::PackageDenied {
                ..
            }) => Self::Malformed(other.to_string()),
        }
    }
}

// ============================================================================
// SECTION: Manager
// ============================================================================

/// Owns live connections and routes frames between them and dispatch.
pub struct TransportManager {
    /// Session registry.
    registry: Arc<SessionRegistry>,
    /// Dispatch engine.
    engine: Arc<DispatchEngine>,
    /// Queue and drain limits.
    limits: TransportLimits,
    /// Live connections keyed by session id.
    connections: RwLock<HashMap<String, Arc<ConnectionHandle>>>,
    /// Delivery counters.
    stats: TransportStats,
    /// Set once shutdown starts; new connections are refused.
    shutting_down: AtomicBool,
}

impl TransportManager {
    /// Creates a manager with no connections.
    #[must_use]
    pub fn new(
        registry: Arc<SessionRegistry>,
        engine: Arc<DispatchEngine>,
        limits: TransportLimits,
    ) -> Self {
        Self {
            registry,
            engine,
            limits,
            connections: RwLock::new(HashMap::new()),
            stats: TransportStats::default(),
            shutting_down: AtomicBool::new(false),
        }
    }

    /// Returns the session registry.
    #[must_use]
    pub const fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Returns the dispatch engine.
    #[must_use]
    pub const fn engine(&self) -> &Arc<DispatchEngine> {
        &self.engine
    }

    /// Returns a snapshot of the delivery counters.
    #[must_use]
    pub fn stats(&self) -> TransportStatsSnapshot {
        self.stats.snapshot()
    }

    /// Returns true once shutdown has started.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Returns the state of a connection (`Closed` when unknown).
    #[must_use]
    pub fn state(&self, session_id: &str) -> ConnectionState {
        self.connection(session_id).map_or(ConnectionState::Closed, |handle| handle.state())
    }

    /// Opens a session and its send queue; the queue starts with the ack.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectError`] when shutting down or the package is refused.
    pub fn connect(
        &self,
        caller: &CallerContext,
        requested_package: Option<&str>,
    ) -> Result<Connection, ConnectError> {
        if self.is_shutting_down() {
            return Err(ConnectError::ShuttingDown);
        }
        let session = self.registry.open(caller, requested_package)?;
        let (sender, receiver) = mpsc::channel(self.limits.queue_capacity);
        let ack = OutboundFrame::HandshakeAck {
            session_id: session.session_id.clone(),
            package: session.package.name().to_string(),
            tools: session.package.tools().to_vec(),
        };
        if sender.try_send(ack).is_err() {
            self.registry.close(&session.session_id);
            return Err(ConnectError::ShuttingDown);
        }
        let handle = Arc::new(ConnectionHandle {
            session: Arc::clone(&session),
            sender,
            state: Mutex::new(ConnectionState::Active),
            settled: Notify::new(),
        });
        self.write().insert(session.session_id.clone(), handle);
        Ok(Connection {
            session_id: session.session_id.clone(),
            package: session.package.name().to_string(),
            receiver,
        })
    }

    /// Accepts a frame from a client.
    ///
    /// # Errors
    ///
    /// Returns [`SubmitError`] when the session is unknown or draining, the
    /// request id is reused, the in-flight limit is reached, or the frame is
    /// not valid after the handshake.
    pub fn submit(
        self: &Arc<Self>,
        session_id: &str,
        frame: InboundFrame,
    ) -> Result<SubmitAck, SubmitError> {
        let handle = self
            .connection(session_id)
            .ok_or_else(|| SubmitError::UnknownSession(session_id.to_string()))?;
        if handle.state() != ConnectionState::Active {
            return Err(SubmitError::Draining);
        }
        self.registry.touch(session_id);
        match frame {
            InboundFrame::Handshake {
                ..
            } => Err(SubmitError::Malformed("session already established".to_string())),
            InboundFrame::Close => {
                let manager = Arc::clone(self);
                let session_id = session_id.to_string();
                tokio::spawn(async move {
                    manager.drain(&session_id, DrainReason::ClientClose).await;
                });
                Ok(SubmitAck {
                    request_id: None,
                })
            }
            InboundFrame::ListTools {
                request_id,
            } => {
                let request_id = self.accept(&handle, request_id)?;
                let payload = DispatchEngine::list_tools(&handle.session.package);
                let result = ToolCallResult::success(request_id.clone(), payload);
                let manager = Arc::clone(self);
                tokio::spawn(async move {
                    manager.deliver(&handle, result).await;
                });
                Ok(SubmitAck {
                    request_id: Some(request_id),
                })
            }
            InboundFrame::ToolCall {
                request_id,
                tool_name,
                arguments,
            } => {
                let request_id = self.accept(&handle, request_id)?;
                let request = ToolCallRequest {
                    request_id: request_id.clone(),
                    tool_name,
                    arguments,
                };
                let context = DispatchContext {
                    session_id: Some(session_id.to_string()),
                    package: Arc::clone(&handle.session.package),
                    caller: handle.session.caller.clone(),
                };
                let manager = Arc::clone(self);
                tokio::spawn(async move {
                    let result = manager.engine.dispatch(&context, request).await;
                    manager.deliver(&handle, result).await;
                });
                Ok(SubmitAck {
                    request_id: Some(request_id),
                })
            }
        }
    }

    /// Validates or assigns a request id and registers it as in flight.
    ///
    /// The connection state is checked again after registration: a drain
    /// that started in between may already have seen zero requests in flight,
    /// so the request is withdrawn instead of being acked and discarded.
    fn accept(
        &self,
        handle: &ConnectionHandle,
        request_id: Option<String>,
    ) -> Result<String, SubmitError> {
        let session_id = handle.session.session_id.as_str();
        let request_id = match request_id {
            Some(id) => {
                validate_request_id(&id)?;
                id
            }
            None => Uuid::new_v4().to_string(),
        };
        self.registry.begin_request(session_id, &request_id)?;
        if handle.state() != ConnectionState::Active {
            self.registry.complete_request(session_id, &request_id);
            handle.settled.notify_waiters();
            return Err(SubmitError::Draining);
        }
        Ok(request_id)
    }

    /// Posts a result to its connection if the request is still outstanding.
    async fn deliver(&self, handle: &ConnectionHandle, result: ToolCallResult) {
        let session_id = handle.session.session_id.as_str();
        let request_id = result.request_id.clone();
        if !self.registry.complete_request(session_id, &request_id) {
            self.stats.results_discarded.fetch_add(1, Ordering::Relaxed);
            debug!(session_id, request_id = %request_id, "result discarded for closed session");
            handle.settled.notify_waiters();
            return;
        }
        handle.settled.notify_waiters();
        if handle.sender.send(OutboundFrame::Result(result)).await.is_ok() {
            self.stats.results_delivered.fetch_add(1, Ordering::Relaxed);
        } else {
            self.stats.results_discarded.fetch_add(1, Ordering::Relaxed);
            debug!(session_id, request_id = %request_id, "result discarded for closed queue");
        }
    }

    /// Gracefully closes a connection.
    ///
    /// Sends a `draining` event, stops accepting requests, waits up to the
    /// drain grace for in-flight requests, then closes the queue and releases
    /// the session. Repeated or concurrent calls are no-ops.
    pub async fn drain(&self, session_id: &str, reason: DrainReason) {
        let Some(handle) = self.connection(session_id) else {
            return;
        };
        if handle.transition(ConnectionState::Draining) != ConnectionState::Active {
            return;
        }
        info!(session_id, reason = reason.as_str(), "draining session");
        self.registry.audit_session(&handle.session, SessionAction::Draining);
        let grace = self.limits.drain_grace;
        let event = OutboundFrame::event(
            EventType::Draining,
            json!({
                "reason": reason.as_str(),
                "grace_ms": u64::try_from(grace.as_millis()).unwrap_or(u64::MAX),
            }),
        );
        let deadline = Instant::now() + grace;
        if tokio::time::timeout_at(deadline, handle.sender.send(event)).await.is_err() {
            self.stats.events_dropped.fetch_add(1, Ordering::Relaxed);
        }
        loop {
            let settled = handle.settled.notified();
            tokio::pin!(settled);
            settled.as_mut().enable();
            if self.registry.in_flight_count(session_id) == 0 {
                break;
            }
            if tokio::time::timeout_at(deadline, settled).await.is_err() {
                warn!(session_id, "drain grace elapsed with requests in flight");
                break;
            }
        }
        self.release(session_id, &handle);
    }

    /// Drops a connection immediately; outstanding results are discarded.
    pub fn disconnect(&self, session_id: &str) {
        let Some(handle) = self.connection(session_id) else {
            return;
        };
        if handle.transition(ConnectionState::Closed) == ConnectionState::Closed {
            return;
        }
        info!(session_id, "connection lost");
        self.registry.audit_session(&handle.session, SessionAction::Disconnected);
        self.release(session_id, &handle);
    }

    /// Removes the connection record and releases the session.
    fn release(&self, session_id: &str, handle: &ConnectionHandle) {
        handle.transition(ConnectionState::Closed);
        self.write().remove(session_id);
        self.registry.close(session_id);
    }

    /// Posts an event to every active connection without waiting.
    pub fn broadcast(&self, event: &OutboundFrame) {
        let handles: Vec<Arc<ConnectionHandle>> = self.read().values().cloned().collect();
        for handle in handles {
            if handle.state() != ConnectionState::Active {
                continue;
            }
            match handle.sender.try_send(event.clone()) {
                Ok(()) | Err(TrySendError::Closed(_)) => {}
                Err(TrySendError::Full(_)) => {
                    self.stats.events_dropped.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }

    /// Posts an event to one connection without waiting.
    ///
    /// Returns false (and counts a dropped event) when it could not be queued.
    pub fn post_event(&self, session_id: &str, event: OutboundFrame) -> bool {
        let queued =
            self.connection(session_id).is_some_and(|handle| handle.sender.try_send(event).is_ok());
        if !queued {
            self.stats.events_dropped.fetch_add(1, Ordering::Relaxed);
        }
        queued
    }

    /// Reacts to a registry notice.
    pub async fn handle_notice(&self, notice: SessionNotice) {
        match notice {
            SessionNotice::IdleTimeout {
                session_id,
            } => {
                if let Some(handle) = self.connection(&session_id) {
                    let idle_ms =
                        u64::try_from(self.limits.idle_timeout.as_millis()).unwrap_or(u64::MAX);
                    let event = OutboundFrame::event(
                        EventType::IdleTimeout,
                        json!({ "idle_timeout_ms": idle_ms }),
                    );
                    if handle.sender.try_send(event).is_err() {
                        self.stats.events_dropped.fetch_add(1, Ordering::Relaxed);
                    }
                }
                self.drain(&session_id, DrainReason::IdleTimeout).await;
            }
        }
    }

    /// Refuses new connections and drains every live one.
    pub async fn shutdown(self: &Arc<Self>) {
        self.shutting_down.store(true, Ordering::SeqCst);
        let session_ids: Vec<String> = self.read().keys().cloned().collect();
        let mut drains = JoinSet::new();
        for session_id in session_ids {
            let manager = Arc::clone(self);
            drains.spawn(async move {
                manager.drain(&session_id, DrainReason::Shutdown).await;
            });
        }
        while drains.join_next().await.is_some() {}
    }

    /// Returns the number of live connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.read().len()
    }

    /// Looks up a connection.
    fn connection(&self, session_id: &str) -> Option<Arc<ConnectionHandle>> {
        self.read().get(session_id).cloned()
    }

    /// Acquires the connection map for reading.
    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Arc<ConnectionHandle>>> {
        self.connections.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Acquires the connection map for writing.
    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Arc<ConnectionHandle>>> {
        self.connections.write().unwrap_or_else(PoisonError::into_inner)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Rejects blank, oversized, or control-character request ids.
fn validate_request_id(request_id: &str) -> Result<(), SubmitError> {
    if request_id.trim().is_empty() {
        return Err(SubmitError::Malformed("request_id must not be blank".to_string()));
    }
    if request_id.len() > MAX_REQUEST_ID_LENGTH {
        return Err(SubmitError::Malformed(format!(
            "request_id exceeds {MAX_REQUEST_ID_LENGTH} bytes"
        )));
    }
    if request_id.chars().any(char::is_control) {
        return Err(SubmitError::Malformed("request_id contains control characters".to_string()));
    }
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests;
