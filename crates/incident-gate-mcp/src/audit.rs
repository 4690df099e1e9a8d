// crates/incident-gate-mcp/src/audit.rs
// ============================================================================
// Module: Audit Logging
// Description: Structured audit events for sessions, tool calls, and access.
// Purpose: Emit JSON-line audit records without hard dependencies.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Audit events are plain serializable structs stamped with a millisecond
//! timestamp at construction. Sinks write one JSON object per line; argument
//! values and record payloads are never included.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Serialize;

use crate::access::TransportKind;
use crate::protocol::ErrorKind;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Session lifecycle transitions worth auditing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionAction {
    /// Handshake completed.
    Opened,
    /// Drain started.
    Draining,
    /// Idle threshold exceeded.
    IdleTimeout,
    /// Connection lost without a drain.
    Disconnected,
    /// Registry entry released.
    Closed,
}

/// Session lifecycle audit event.
#[derive(Debug, Clone, Serialize)]
pub struct SessionAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Session identifier.
    pub session_id: String,
    /// Lifecycle transition.
    pub action: SessionAction,
    /// Transport carrying the session.
    pub transport: TransportKind,
    /// Caller identity when known.
    pub identity: Option<String>,
    /// Negotiated package.
    pub package: String,
}

/// Tool call outcome audit event.
#[derive(Debug, Clone, Serialize)]
pub struct ToolCallAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Session identifier (absent for REST calls).
    pub session_id: Option<String>,
    /// Request identifier.
    pub request_id: String,
    /// Transport carrying the call.
    pub transport: TransportKind,
    /// Caller identity when known.
    pub identity: Option<String>,
    /// Package the call was authorized against.
    pub package: String,
    /// Requested tool name.
    pub tool: String,
    /// Error kind when the call failed.
    pub error_kind: Option<ErrorKind>,
    /// Wall-clock dispatch latency.
    pub latency_ms: u128,
}

/// Package access decision audit event.
#[derive(Debug, Clone, Serialize)]
pub struct AccessAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Transport the handshake arrived on.
    pub transport: TransportKind,
    /// Caller identity when known.
    pub identity: Option<String>,
    /// Requested package.
    pub package: String,
    /// Whether the package was granted.
    pub allowed: bool,
    /// Decision reason label.
    pub reason: String,
}

/// Inputs required to construct a tool call audit event.
pub struct ToolCallAuditParams {
    /// Session identifier (absent for REST calls).
    pub session_id: Option<String>,
    /// Request identifier.
    pub request_id: String,
    /// Transport carrying the call.
    pub transport: TransportKind,
    /// Caller identity when known.
    pub identity: Option<String>,
    /// Package the call was authorized against.
    pub package: String,
    /// Requested tool name.
    pub tool: String,
    /// Error kind when the call failed.
    pub error_kind: Option<ErrorKind>,
    /// Wall-clock dispatch latency.
    pub latency_ms: u128,
}

/// Returns the current time in milliseconds since the epoch.
fn now_ms() -> u128 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis()
}

impl SessionAuditEvent {
    /// Creates a session event with a consistent timestamp.
    #[must_use]
    pub fn new(
        session_id: impl Into<String>,
        action: SessionAction,
        transport: TransportKind,
        identity: Option<String>,
        package: impl Into<String>,
    ) -> Self {
        Self {
            event: "session",
            timestamp_ms: now_ms(),
            session_id: session_id.into(),
            action,
            transport,
            identity,
            package: package.into(),
        }
    }
}

impl ToolCallAuditEvent {
    /// Creates a tool call event with a consistent timestamp.
    #[must_use]
    pub fn new(params: ToolCallAuditParams) -> Self {
        Self {
            event: "tool_call",
            timestamp_ms: now_ms(),
            session_id: params.session_id,
            request_id: params.request_id,
            transport: params.transport,
            identity: params.identity,
            package: params.package,
            tool: params.tool,
            error_kind: params.error_kind,
            latency_ms: params.latency_ms,
        }
    }
}

impl AccessAuditEvent {
    /// Creates an access decision event with a consistent timestamp.
    #[must_use]
    pub fn new(
        transport: TransportKind,
        identity: Option<String>,
        package: impl Into<String>,
        allowed: bool,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            event: "access",
            timestamp_ms: now_ms(),
            transport,
            identity,
            package: package.into(),
            allowed,
            reason: reason.into(),
        }
    }
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Audit sink for server events.
pub trait AuditSink: Send + Sync {
    /// Records a tool call outcome.
    fn record_tool_call(&self, event: &ToolCallAuditEvent);

    /// Records a session lifecycle transition.
    fn record_session(&self, _event: &SessionAuditEvent) {}

    /// Records a package access decision.
    fn record_access(&self, _event: &AccessAuditEvent) {}
}

/// Audit sink that logs JSON lines to stderr.
pub struct StderrAuditSink;

impl StderrAuditSink {
    /// Writes one event line to stderr.
    fn emit(event: &impl Serialize) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(std::io::stderr(), "{payload}");
        }
    }
}

impl AuditSink for StderrAuditSink {
    fn record_tool_call(&self, event: &ToolCallAuditEvent) {
        Self::emit(event);
    }

    fn record_session(&self, event: &SessionAuditEvent) {
        Self::emit(event);
    }

    fn record_access(&self, event: &AccessAuditEvent) {
        Self::emit(event);
    }
}

/// Audit sink that appends JSON lines to a file.
pub struct FileAuditSink {
    /// File handle used for append-only logging.
    file: Mutex<std::fs::File>,
}

impl FileAuditSink {
    /// Opens the audit log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    /// Appends one event line.
    fn emit(&self, event: &impl Serialize) {
        if let Ok(payload) = serde_json::to_string(event)
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}

impl AuditSink for FileAuditSink {
    fn record_tool_call(&self, event: &ToolCallAuditEvent) {
        self.emit(event);
    }

    fn record_session(&self, event: &SessionAuditEvent) {
        self.emit(event);
    }

    fn record_access(&self, event: &AccessAuditEvent) {
        self.emit(event);
    }
}

/// No-op audit sink.
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn record_tool_call(&self, _event: &ToolCallAuditEvent) {}
}

// ============================================================================
// SECTION: Tests
// ============================================================================
