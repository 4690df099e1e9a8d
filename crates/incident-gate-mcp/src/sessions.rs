// crates/incident-gate-mcp/src/sessions.rs
// ============================================================================
// Module: Session Registry
// Description: In-memory sessions, in-flight tracking, and idle sweeps.
// Purpose: Own session state shared by transports and dispatch.
// Dependencies: tokio, uuid
// ============================================================================

//! ## Overview
//! Sessions live in a map behind a reader/writer lock: lookups and per-request
//! bookkeeping take the read side, while open, close, and sweep take the write
//! side. Mutable per-session state sits behind its own mutex so concurrent
//! requests on different sessions never contend. No lock is held across an
//! await point.
//!
//! Idle sessions are reported once through a [`SessionNotice`] channel; the
//! transport layer decides how to close them.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::RwLock;
use std::time::Duration;
use std::time::Instant;

use incident_gate_config::SessionConfig;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

use crate::access::AccessError;
use crate::access::AccessPolicy;
use crate::access::CallerContext;
use crate::audit::AccessAuditEvent;
use crate::audit::AuditSink;
use crate::audit::NoopAuditSink;
use crate::audit::SessionAction;
use crate::audit::SessionAuditEvent;
use crate::catalog::CatalogError;
use crate::catalog::ResolvedPackage;
use crate::catalog::ToolCatalog;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Session registry errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// Requested package is not defined.
    #[error("unknown package: {0}")]
    UnknownPackage(String),
    /// Requested package is not permitted for the caller.
    #[error("package {package} not permitted for {identity}")]
    PackageDenied {
        /// Identity label.
        identity: String,
        /// Requested package.
        package: String,
    },
    /// Session does not exist (never opened or already closed).
    #[error("unknown session: {0}")]
    UnknownSession(String),
    /// Request identifier already used in this session.
    #[error("duplicate request id: {0}")]
    DuplicateRequest(String),
    /// Too many requests in flight for this session.
    #[error("in-flight limit reached ({0})")]
    InflightLimit(usize),
    /// Session used every request identifier it may reserve.
    #[error("request id limit reached ({0}); reconnect to continue")]
    RequestIdLimit(usize),
}

// ============================================================================
// SECTION: Types
// ============================================================================

/// Limits applied to every session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionLimits {
    /// Inactivity after which a session is reported idle.
    pub idle_timeout: Duration,
    /// Maximum concurrent requests per session.
    pub max_inflight: usize,
    /// Maximum request identifiers reserved over a session's life.
    pub max_request_ids: usize,
}

impl SessionLimits {
    /// Builds limits from configuration.
    #[must_use]
    pub const fn from_config(config: &SessionConfig) -> Self {
        Self {
            idle_timeout: Duration::from_millis(config.idle_timeout_ms),
            max_inflight: config.max_inflight,
            max_request_ids: config.max_request_ids,
        }
    }
}

/// Notifications the registry posts to the transport layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionNotice {
    /// Session exceeded the idle threshold.
    IdleTimeout {
        /// Session identifier.
        session_id: String,
    },
}

/// Immutable session facts fixed at handshake.
#[derive(Debug)]
pub struct Session {
    /// Opaque session identifier.
    pub session_id: String,
    /// Package resolved at handshake.
    pub package: Arc<ResolvedPackage>,
    /// Caller context from the transport.
    pub caller: CallerContext,
    /// Handshake time.
    pub opened_at: Instant,
}

/// Mutable per-session bookkeeping.
#[derive(Debug)]
struct SessionState {
    /// Last time the session saw traffic.
    last_activity: Instant,
    /// Requests accepted but not yet completed.
    in_flight: HashSet<String>,
    /// Every request identifier accepted in this session, capped at
    /// `max_request_ids`.
    accepted: HashSet<String>,
    /// Whether an idle notice has been posted.
    idle_notified: bool,
}

/// Registry entry.
#[derive(Debug)]
struct SessionEntry {
    /// Immutable facts.
    session: Arc<Session>,
    /// Mutable bookkeeping.
    state: Mutex<SessionState>,
}

impl SessionEntry {
    /// Locks the entry state, recovering from poisoning.
    fn state(&self) -> std::sync::MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// In-memory session registry.
pub struct SessionRegistry {
    /// Shared immutable catalog.
    catalog: Arc<ToolCatalog>,
    /// Package access policy.
    policy: AccessPolicy,
    /// Per-session limits.
    limits: SessionLimits,
    /// Sessions keyed by identifier.
    sessions: RwLock<HashMap<String, SessionEntry>>,
    /// Channel for idle notices.
    notices: mpsc::UnboundedSender<SessionNotice>,
    /// Audit sink for access and lifecycle events.
    audit: Arc<dyn AuditSink>,
}

impl SessionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new(
        catalog: Arc<ToolCatalog>,
        policy: AccessPolicy,
        limits: SessionLimits,
        notices: mpsc::UnboundedSender<SessionNotice>,
    ) -> Self {
        Self {
            catalog,
            policy,
            limits,
            sessions: RwLock::new(HashMap::new()),
            notices,
            audit: Arc::new(NoopAuditSink),
        }
    }

    /// Returns a copy with the given audit sink.
    #[must_use]
    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// Returns the shared catalog.
    #[must_use]
    pub const fn catalog(&self) -> &Arc<ToolCatalog> {
        &self.catalog
    }

    /// Resolves the requested (or default) package and checks it against
    /// the caller's identity.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::UnknownPackage`] or
    /// [`SessionError::PackageDenied`] when the package cannot be granted.
    pub fn grant_package(
        &self,
        caller: &CallerContext,
        requested_package: Option<&str>,
    ) -> Result<Arc<ResolvedPackage>, SessionError> {
        let name = requested_package
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| self.catalog.default_package());
        let package = self.catalog.resolve(name).map_err(|err| match err {
            CatalogError::UnknownPackage(name) => SessionError::UnknownPackage(name),
            other => SessionError::UnknownPackage(other.to_string()),
        })?;
        let decision = self.policy.authorize(caller.identity.as_deref(), name);
        self.audit.record_access(&AccessAuditEvent::new(
            caller.transport,
            caller.identity.clone(),
            name,
            decision.is_ok(),
            match &decision {
                Ok(()) => "granted".to_string(),
                Err(err) => err.to_string(),
            },
        ));
        decision.map_err(|err| match err {
            AccessError::Denied {
                identity,
                package,
            } => SessionError::PackageDenied {
                identity,
                package,
            },
        })?;
        Ok(package)
    }

    /// Opens a session for `caller` with the requested or default package.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::UnknownPackage`] or
    /// [`SessionError::PackageDenied`] when the package cannot be granted.
    pub fn open(
        &self,
        caller: &CallerContext,
        requested_package: Option<&str>,
    ) -> Result<Arc<Session>, SessionError> {
        let package = self.grant_package(caller, requested_package)?;
        let now = Instant::now();
        let session = Arc::new(Session {
            session_id: Uuid::new_v4().to_string(),
            package,
            caller: caller.clone(),
            opened_at: now,
        });
        let entry = SessionEntry {
            session: Arc::clone(&session),
            state: Mutex::new(SessionState {
                last_activity: now,
                in_flight: HashSet::new(),
                accepted: HashSet::new(),
                idle_notified: false,
            }),
        };
        self.write().insert(session.session_id.clone(), entry);
        info!(
            session_id = %session.session_id,
            package = session.package.name(),
            transport = caller.transport.as_str(),
            "session opened"
        );
        self.audit_session(&session, SessionAction::Opened);
        Ok(session)
    }

    /// Removes a session; returns it when it was still registered.
    pub fn close(&self, session_id: &str) -> Option<Arc<Session>> {
        let removed = self.write().remove(session_id).map(|entry| entry.session);
        if let Some(session) = &removed {
            info!(session_id, "session closed");
            self.audit_session(session, SessionAction::Closed);
        }
        removed
    }

    /// Returns a session by identifier.
    #[must_use]
    pub fn get(&self, session_id: &str) -> Option<Arc<Session>> {
        self.read().get(session_id).map(|entry| Arc::clone(&entry.session))
    }

    /// Records activity; returns false for unknown sessions.
    pub fn touch(&self, session_id: &str) -> bool {
        self.read().get(session_id).is_some_and(|entry| {
            let mut state = entry.state();
            state.last_activity = Instant::now();
            state.idle_notified = false;
            true
        })
    }

    /// Accepts a request identifier for dispatch.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] for unknown sessions, reused identifiers, or
    /// when the in-flight or request-id limit is reached.
    pub fn begin_request(&self, session_id: &str, request_id: &str) -> Result<(), SessionError> {
        let sessions = self.read();
        let entry = sessions
            .get(session_id)
            .ok_or_else(|| SessionError::UnknownSession(session_id.to_string()))?;
        let mut state = entry.state();
        if state.accepted.contains(request_id) {
            return Err(SessionError::DuplicateRequest(request_id.to_string()));
        }
        if state.in_flight.len() >= self.limits.max_inflight {
            return Err(SessionError::InflightLimit(self.limits.max_inflight));
        }
        if state.accepted.len() >= self.limits.max_request_ids {
            return Err(SessionError::RequestIdLimit(self.limits.max_request_ids));
        }
        state.accepted.insert(request_id.to_string());
        state.in_flight.insert(request_id.to_string());
        state.last_activity = Instant::now();
        state.idle_notified = false;
        Ok(())
    }

    /// Marks a request complete.
    ///
    /// Returns true only the first time for a request of a live session; the
    /// caller delivers the result only on true.
    pub fn complete_request(&self, session_id: &str, request_id: &str) -> bool {
        self.read().get(session_id).is_some_and(|entry| {
            let mut state = entry.state();
            state.last_activity = Instant::now();
            state.in_flight.remove(request_id)
        })
    }

    /// Returns the number of requests in flight for a session.
    #[must_use]
    pub fn in_flight_count(&self, session_id: &str) -> usize {
        self.read().get(session_id).map_or(0, |entry| entry.state().in_flight.len())
    }

    /// Returns the number of open sessions.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.read().len()
    }

    /// Posts an idle notice for each session idle past the threshold.
    ///
    /// Sessions with requests in flight are never idle. Each idle period is
    /// reported once; activity re-arms the notice. Returns the notified ids.
    pub fn sweep_idle(&self, now: Instant) -> Vec<String> {
        let sessions = self.write();
        let mut idle = Vec::new();
        for (session_id, entry) in sessions.iter() {
            let mut state = entry.state();
            let quiet_for = now.saturating_duration_since(state.last_activity);
            if state.idle_notified
                || !state.in_flight.is_empty()
                || quiet_for < self.limits.idle_timeout
            {
                continue;
            }
            state.idle_notified = true;
            idle.push(session_id.clone());
        }
        drop(sessions);
        for session_id in &idle {
            if let Some(session) = self.get(session_id) {
                self.audit_session(&session, SessionAction::IdleTimeout);
            }
            let _ = self.notices.send(SessionNotice::IdleTimeout {
                session_id: session_id.clone(),
            });
        }
        idle
    }

    /// Records a lifecycle transition for a session.
    pub fn audit_session(&self, session: &Session, action: SessionAction) {
        self.audit.record_session(&SessionAuditEvent::new(
            session.session_id.clone(),
            action,
            session.caller.transport,
            session.caller.identity.clone(),
            session.package.name(),
        ));
    }

    /// Acquires the map for reading.
    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, SessionEntry>> {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Acquires the map for writing.
    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, SessionEntry>> {
        self.sessions.write().unwrap_or_else(PoisonError::into_inner)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests;
