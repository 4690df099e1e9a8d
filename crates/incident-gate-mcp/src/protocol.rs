// crates/incident-gate-mcp/src/protocol.rs
// ============================================================================
// Module: Wire Protocol
// Description: Frame, result, and error types exchanged with clients.
// Purpose: Define the JSON shapes carried over SSE and stdio transports.
// Dependencies: serde, serde_json, incident-gate-backend
// ============================================================================

//! ## Overview
//! Every frame is a JSON object tagged by `type`. Clients send `handshake`,
//! `tool_call`, `list_tools`, and `close`; the server sends `handshake_ack`,
//! `result`, and `event`. Errors carry a stable [`ErrorKind`] serialized in
//! PascalCase.

// ============================================================================
// SECTION: Imports
// ============================================================================

use incident_gate_backend::BackendErrorKind;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

use crate::catalog::ToolDefinition;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum length of a caller-supplied request identifier.
pub const MAX_REQUEST_ID_LENGTH: usize = 128;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Protocol-level error classification.
///
/// # Invariants
/// - Variants are stable wire labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Tool not in the session's package.
    Forbidden,
    /// Arguments failed validation or were rejected by the backend.
    InvalidArgument,
    /// Record does not exist.
    NotFound,
    /// Backend rejected the server's credentials.
    Unauthorized,
    /// Backend throttled the request after retries.
    RateLimited,
    /// Backend unreachable or timed out.
    Unavailable,
    /// Anything else.
    Unknown,
}

impl ErrorKind {
    /// Returns the stable label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Forbidden => "Forbidden",
            Self::InvalidArgument => "InvalidArgument",
            Self::NotFound => "NotFound",
            Self::Unauthorized => "Unauthorized",
            Self::RateLimited => "RateLimited",
            Self::Unavailable => "Unavailable",
            Self::Unknown => "Unknown",
        }
    }
}

impl From<BackendErrorKind> for ErrorKind {
    fn from(kind: BackendErrorKind) -> Self {
        match kind {
            BackendErrorKind::Unauthorized => Self::Unauthorized,
            BackendErrorKind::NotFound => Self::NotFound,
            BackendErrorKind::RateLimited => Self::RateLimited,
            BackendErrorKind::InvalidArgument => Self::InvalidArgument,
            BackendErrorKind::Unavailable => Self::Unavailable,
            BackendErrorKind::Unknown => Self::Unknown,
        }
    }
}

/// Error body attached to a failed result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolError {
    /// Classification.
    pub kind: ErrorKind,
    /// Human-readable message.
    pub message: String,
}

// ============================================================================
// SECTION: Requests and Results
// ============================================================================

/// Tool invocation accepted for dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallRequest {
    /// Caller-supplied or server-assigned identifier.
    pub request_id: String,
    /// Tool to invoke.
    pub tool_name: String,
    /// Raw JSON arguments.
    pub arguments: Value,
}

/// Result status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    /// Call succeeded.
    Success,
    /// Call failed.
    Error,
}

/// Outcome of one request.
///
/// Errors serialize flat: `{request_id, status: "error", kind, message}`.
///
/// # Invariants
/// - Exactly one of `payload` and `error` is present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallResult {
    /// Identifier of the originating request.
    pub request_id: String,
    /// Success or error.
    pub status: ResultStatus,
    /// Success payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    /// Error kind and message, flattened into the result.
    #[serde(flatten)]
    pub error: Option<ToolError>,
}

impl ToolCallResult {
    /// Builds a success result.
    #[must_use]
    pub fn success(request_id: impl Into<String>, payload: Value) -> Self {
        Self {
            request_id: request_id.into(),
            status: ResultStatus::Success,
            payload: Some(payload),
            error: None,
        }
    }

    /// Builds an error result.
    #[must_use]
    pub fn failure(
        request_id: impl Into<String>,
        kind: ErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            status: ResultStatus::Error,
            payload: None,
            error: Some(ToolError {
                kind,
                message: message.into(),
            }),
        }
    }

    /// Returns the error kind for failed results.
    #[must_use]
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|error| error.kind)
    }
}

// ============================================================================
// SECTION: Frames
// ============================================================================

/// Frame sent by a client.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundFrame {
    /// Opens a session (stdio) with an optional package.
    Handshake {
        /// Requested capability package.
        #[serde(default)]
        requested_package: Option<String>,
    },
    /// Invokes a tool.
    ToolCall {
        /// Caller-chosen request identifier.
        #[serde(default)]
        request_id: Option<String>,
        /// Tool name.
        tool_name: String,
        /// Tool arguments (JSON object).
        #[serde(default = "empty_arguments")]
        arguments: Value,
    },
    /// Lists the session's tools.
    ListTools {
        /// Caller-chosen request identifier.
        #[serde(default)]
        request_id: Option<String>,
    },
    /// Requests a graceful close.
    Close,
}

/// Serde default for omitted arguments.
fn empty_arguments() -> Value {
    Value::Object(Map::new())
}

/// Event classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Periodic liveness signal.
    Heartbeat,
    /// Backend reachability flipped.
    BackendReachabilityChanged,
    /// Session is closing; new requests are rejected.
    Draining,
    /// Session exceeded the idle threshold.
    IdleTimeout,
    /// A submitted frame was rejected before dispatch (stdio only).
    RequestRejected,
}

/// Frame sent by the server.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundFrame {
    /// Session established.
    HandshakeAck {
        /// Session identifier.
        session_id: String,
        /// Resolved package name.
        package: String,
        /// Tools invokable in this session.
        tools: Vec<ToolDefinition>,
    },
    /// Result of an accepted request.
    Result(ToolCallResult),
    /// Asynchronous notification.
    Event {
        /// Event classification.
        event_type: EventType,
        /// Event detail.
        detail: Value,
    },
}

impl OutboundFrame {
    /// Builds an event frame.
    #[must_use]
    pub const fn event(event_type: EventType, detail: Value) -> Self {
        Self::Event {
            event_type,
            detail,
        }
    }

    /// Returns the SSE event name for this frame.
    #[must_use]
    pub const fn sse_event_name(&self) -> &'static str {
        match self {
            Self::HandshakeAck {
                ..
            } => "handshake_ack",
            Self::Result(_) => "result",
            Self::Event {
                ..
            } => "event",
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
