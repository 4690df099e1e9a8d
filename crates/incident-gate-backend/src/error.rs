// crates/incident-gate-backend/src/error.rs
// ============================================================================
// Module: Backend Errors
// Description: Normalized error taxonomy for record API failures.
// Purpose: Classify backend responses exactly once, at the adapter boundary.
// Dependencies: serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Every failure leaving the adapter is a [`BackendError`]. HTTP statuses and
//! transport failures are mapped here so dispatch never inspects raw
//! responses. The vendor error payload `{"error":{"message","detail"}}` is
//! parsed for a human-readable message when present.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum characters of raw backend body carried in an error message.
const MAX_DETAIL_CHARS: usize = 512;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Stable classification of backend failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackendErrorKind {
    /// Credentials rejected (401/403).
    Unauthorized,
    /// Record does not exist (404).
    NotFound,
    /// Backend throttled the request (429).
    RateLimited,
    /// Backend rejected the payload (400/409/422).
    InvalidArgument,
    /// Backend unreachable, timed out, or failing (5xx).
    Unavailable,
    /// Anything else.
    Unknown,
}

impl BackendErrorKind {
    /// Returns the stable label used in logs and payloads.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unauthorized => "Unauthorized",
            Self::NotFound => "NotFound",
            Self::RateLimited => "RateLimited",
            Self::InvalidArgument => "InvalidArgument",
            Self::Unavailable => "Unavailable",
            Self::Unknown => "Unknown",
        }
    }
}

/// Classified backend failure.
///
/// # Invariants
/// - Messages never contain credentials.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// Credentials rejected.
    #[error("backend rejected credentials: {0}")]
    Unauthorized(String),
    /// Record not found.
    #[error("record not found: {0}")]
    NotFound(String),
    /// Request throttled; `retry_after` carries the server hint when present.
    #[error("backend rate limited: {message}")]
    RateLimited {
        /// Backend message.
        message: String,
        /// Server-provided retry hint.
        retry_after: Option<Duration>,
    },
    /// Payload rejected by the backend.
    #[error("backend rejected request: {0}")]
    InvalidArgument(String),
    /// Backend unreachable or failing.
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    /// Unclassified failure carrying backend detail.
    #[error("backend error: {0}")]
    Unknown(String),
}

impl BackendError {
    /// Returns the classification of this error.
    #[must_use]
    pub const fn kind(&self) -> BackendErrorKind {
        match self {
            Self::Unauthorized(_) => BackendErrorKind::Unauthorized,
            Self::NotFound(_) => BackendErrorKind::NotFound,
            Self::RateLimited {
                ..
            } => BackendErrorKind::RateLimited,
            Self::InvalidArgument(_) => BackendErrorKind::InvalidArgument,
            Self::Unavailable(_) => BackendErrorKind::Unavailable,
            Self::Unknown(_) => BackendErrorKind::Unknown,
        }
    }

    /// Returns the message without the classification prefix.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Unauthorized(message)
            | Self::NotFound(message)
            | Self::InvalidArgument(message)
            | Self::Unavailable(message)
            | Self::Unknown(message)
            | Self::RateLimited {
                message, ..
            } => message,
        }
    }

    /// Returns true for failures worth another attempt.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self.kind(), BackendErrorKind::RateLimited | BackendErrorKind::Unavailable)
    }

    /// Returns the server retry hint, if any.
    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited {
                retry_after, ..
            } => *retry_after,
            _ => None,
        }
    }
}

// ============================================================================
// SECTION: Classification
// ============================================================================

/// Vendor error envelope.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    /// Error body.
    error: ErrorBody,
}

/// Vendor error body.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    /// Short message.
    #[serde(default)]
    message: Option<String>,
    /// Longer detail.
    #[serde(default)]
    detail: Option<String>,
}

/// Maps an HTTP failure status and body to a classified error.
#[must_use]
pub fn classify_status(status: u16, body: &str, retry_after: Option<Duration>) -> BackendError {
    let message = error_message(status, body);
    match status {
        401 | 403 => BackendError::Unauthorized(message),
        404 => BackendError::NotFound(message),
        429 => BackendError::RateLimited {
            message,
            retry_after,
        },
        400 | 409 | 422 => BackendError::InvalidArgument(message),
        500..=599 => BackendError::Unavailable(message),
        _ => BackendError::Unknown(message),
    }
}

/// Extracts a readable message from a vendor error body.
fn error_message(status: u16, body: &str) -> String {
    if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(body) {
        let ErrorBody {
            message,
            detail,
        } = envelope.error;
        match (message, detail) {
            (Some(message), Some(detail)) if !detail.is_empty() => {
                return format!("{message}: {detail}");
            }
            (Some(message), _) => return message,
            (None, Some(detail)) => return detail,
            (None, None) => {}
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return format!("status {status}");
    }
    let detail: String = trimmed.chars().take(MAX_DETAIL_CHARS).collect();
    format!("status {status}: {detail}")
}

/// Parses a `Retry-After` header expressed in whole seconds.
#[must_use]
pub fn parse_retry_after(value: Option<&str>) -> Option<Duration> {
    value.and_then(|raw| raw.trim().parse::<u64>().ok()).map(Duration::from_secs)
}

// ============================================================================
// SECTION: Tests
// ============================================================================
