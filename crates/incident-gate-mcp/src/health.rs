// crates/incident-gate-mcp/src/health.rs
// ============================================================================
// Module: Health Monitor
// Description: Liveness, readiness, and backend reachability tracking.
// Purpose: Let orchestrators tell a total outage from lost backend access.
// Dependencies: incident-gate-backend, tokio
// ============================================================================

//! ## Overview
//! Readiness probes the backend with a short timeout. An unreachable backend
//! or rejected credentials report `degraded`; `down` is reserved for a server
//! that has begun shutting down. The background prober reports reachability
//! transitions so they can be broadcast to sessions.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;

use incident_gate_backend::RecordBackend;
use incident_gate_config::HealthConfig;
use serde::Serialize;
use tracing::warn;

use crate::protocol::ErrorKind;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Overall health classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Server and backend are usable.
    Ok,
    /// Server is up but the backend is unreachable or rejecting credentials.
    Degraded,
    /// Server is shutting down.
    Down,
}

/// Result of one backend probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BackendHealth {
    /// True when the probe succeeded.
    pub reachable: bool,
    /// Failure classification when unreachable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

/// Readiness response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReadinessReport {
    /// Overall status.
    pub status: HealthStatus,
    /// Backend probe outcome.
    pub backend: BackendHealth,
    /// Open sessions.
    pub active_sessions: usize,
}

/// Tracks backend reachability and shutdown state.
pub struct HealthMonitor {
    /// Backend probed for reachability.
    backend: Arc<dyn RecordBackend>,
    /// Upper bound on a single probe.
    probe_timeout: Duration,
    /// Last observed reachability.
    last: Mutex<Option<bool>>,
    /// Set once shutdown begins.
    shutting_down: AtomicBool,
}

impl HealthMonitor {
    /// Creates a monitor for `backend`.
    #[must_use]
    pub fn new(backend: Arc<dyn RecordBackend>, config: &HealthConfig) -> Self {
        Self {
            backend,
            probe_timeout: Duration::from_millis(config.probe_timeout_ms),
            last: Mutex::new(None),
            shutting_down: AtomicBool::new(false),
        }
    }

    /// Probes the backend; a timeout counts as `Unavailable`.
    pub async fn probe(&self) -> BackendHealth {
        match tokio::time::timeout(self.probe_timeout, self.backend.probe()).await {
            Ok(Ok(())) => BackendHealth {
                reachable: true,
                error_kind: None,
            },
            Ok(Err(err)) => BackendHealth {
                reachable: false,
                error_kind: Some(ErrorKind::from(err.kind())),
            },
            Err(_) => BackendHealth {
                reachable: false,
                error_kind: Some(ErrorKind::Unavailable),
            },
        }
    }

    /// Probes the backend and builds the readiness report.
    pub async fn readiness(&self, active_sessions: usize) -> ReadinessReport {
        let backend = self.probe().await;
        self.record(backend.reachable);
        let status = if self.is_shutting_down() {
            HealthStatus::Down
        } else if backend.reachable {
            HealthStatus::Ok
        } else {
            HealthStatus::Degraded
        };
        ReadinessReport {
            status,
            backend,
            active_sessions,
        }
    }

    /// Probes the backend; returns the new state only when it changed.
    ///
    /// The first observation establishes a baseline and is not a change.
    pub async fn check_reachability(&self) -> Option<BackendHealth> {
        let backend = self.probe().await;
        let previous = self.record(backend.reachable);
        match previous {
            Some(previous) if previous != backend.reachable => {
                if !backend.reachable {
                    warn!(
                        error_kind = backend.error_kind.map(ErrorKind::as_str),
                        "backend became unreachable"
                    );
                }
                Some(backend)
            }
            _ => None,
        }
    }

    /// Marks the server as shutting down; readiness reports `down` after.
    pub fn begin_shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
    }

    /// Returns true once shutdown has begun.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Stores the latest reachability; returns the previous value.
    fn record(&self, reachable: bool) -> Option<bool> {
        self.last.lock().unwrap_or_else(PoisonError::into_inner).replace(reachable)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
