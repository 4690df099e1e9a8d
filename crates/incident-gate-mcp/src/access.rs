// crates/incident-gate-mcp/src/access.rs
// ============================================================================
// Module: Package Access Policy
// Description: Caller context and package grants for session handshakes.
// Purpose: Decide which capability packages an identity may negotiate.
// Dependencies: incident-gate-config, serde, thiserror
// ============================================================================

//! ## Overview
//! The caller identity is trusted from the transport (`x-caller-identity` on
//! HTTP, absent on stdio). [`AccessPolicy`] checks a requested package against
//! the configured grants once, at handshake. The default policy is open:
//! unlisted identities may negotiate any package.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::net::IpAddr;

use incident_gate_config::AccessConfig;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// HTTP header carrying the trusted caller identity.
pub const CALLER_IDENTITY_HEADER: &str = "x-caller-identity";
/// Longest identity accepted from a header.
const MAX_IDENTITY_BYTES: usize = 256;

// ============================================================================
// SECTION: Caller Context
// ============================================================================

/// Transport a request arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Server-sent events session.
    Sse,
    /// Content-Length framed stdio session.
    Stdio,
    /// Request/response REST facade.
    Rest,
}

impl TransportKind {
    /// Returns the stable label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sse => "sse",
            Self::Stdio => "stdio",
            Self::Rest => "rest",
        }
    }
}

/// Who is calling and how.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerContext {
    /// Transport used by the caller.
    pub transport: TransportKind,
    /// Peer IP address when available.
    pub peer_ip: Option<IpAddr>,
    /// Identity asserted by a trusted fronting proxy.
    pub identity: Option<String>,
}

impl CallerContext {
    /// Builds a stdio caller context.
    #[must_use]
    pub const fn stdio() -> Self {
        Self {
            transport: TransportKind::Stdio,
            peer_ip: None,
            identity: None,
        }
    }

    /// Builds an HTTP caller context from a raw identity header value.
    #[must_use]
    pub fn http(transport: TransportKind, peer_ip: Option<IpAddr>, identity: Option<&str>) -> Self {
        Self {
            transport,
            peer_ip,
            identity: identity.and_then(normalize_identity),
        }
    }
}

/// Trims an identity and drops blank or oversized values.
fn normalize_identity(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.len() > MAX_IDENTITY_BYTES {
        return None;
    }
    Some(trimmed.to_string())
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Package access failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessError {
    /// The identity may not negotiate the package.
    #[error("package {package} not permitted for {identity}")]
    Denied {
        /// Identity label (`anonymous` when absent).
        identity: String,
        /// Requested package.
        package: String,
    },
}

// ============================================================================
// SECTION: Policy
// ============================================================================

/// Package grants keyed by identity.
#[derive(Debug, Clone, Default)]
pub struct AccessPolicy {
    /// Whether identities without a grant may use any package.
    allow_unlisted: bool,
    /// Packages granted per identity.
    grants: BTreeMap<String, BTreeSet<String>>,
}

impl AccessPolicy {
    /// Builds a policy from configuration.
    #[must_use]
    pub fn from_config(config: &AccessConfig) -> Self {
        let mut grants: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for grant in &config.grants {
            grants
                .entry(grant.identity.trim().to_string())
                .or_default()
                .extend(grant.packages.iter().map(|package| package.trim().to_string()));
        }
        Self {
            allow_unlisted: config.allow_unlisted,
            grants,
        }
    }

    /// Policy that permits every identity and package.
    #[must_use]
    pub const fn open() -> Self {
        Self {
            allow_unlisted: true,
            grants: BTreeMap::new(),
        }
    }

    /// Checks whether `identity` may negotiate `package`.
    ///
    /// Granted identities are limited to their grants. Identities without a
    /// grant (including anonymous callers) follow `allow_unlisted`.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::Denied`] when the package is not permitted.
    pub fn authorize(&self, identity: Option<&str>, package: &str) -> Result<(), AccessError> {
        let allowed = match identity.and_then(|identity| self.grants.get(identity)) {
            Some(packages) => packages.contains(package),
            None => self.allow_unlisted,
        };
        if allowed {
            Ok(())
        } else {
            Err(AccessError::Denied {
                identity: identity.unwrap_or("anonymous").to_string(),
                package: package.to_string(),
            })
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
