// crates/incident-gate-mcp/src/sessions/tests.rs
// ============================================================================
// Module: Session Registry Tests
// Description: Unit tests for open/close, request tracking, and idle sweeps.
// Purpose: Ensure at-most-once completion and single idle notices.
// Dependencies: incident-gate-mcp
// ============================================================================

//! ## Overview
//! Exercises the registry directly with the built-in catalog.

// ============================================================================
// SECTION: Lint Configuration
// ============================================================================

#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::panic,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions use unwrap/expect for clarity."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;
use std::time::Instant;

use incident_gate_config::AccessConfig;
use incident_gate_config::AccessGrant;
use tokio::sync::mpsc;

use super::SessionError;
use super::SessionLimits;
use super::SessionNotice;
use super::SessionRegistry;
use crate::access::AccessPolicy;
use crate::access::CallerContext;
use crate::access::TransportKind;
use crate::tests::builtin_catalog;

// ============================================================================
// SECTION: Helpers
// ============================================================================

const LIMITS: SessionLimits = SessionLimits {
    idle_timeout: Duration::from_secs(60),
    max_inflight: 2,
    max_request_ids: 4,
};

fn registry(policy: AccessPolicy) -> (SessionRegistry, mpsc::UnboundedReceiver<SessionNotice>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (SessionRegistry::new(builtin_catalog(), policy, LIMITS, tx), rx)
}

fn caller(identity: Option<&str>) -> CallerContext {
    CallerContext::http(TransportKind::Sse, None, identity)
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[test]
fn open_uses_default_package_when_none_requested() {
    let (registry, _rx) = registry(AccessPolicy::open());
    let session = registry.open(&caller(None), None).unwrap();
    assert_eq!(session.package.name(), "full");
    let session = registry.open(&caller(None), Some("  ")).unwrap();
    assert_eq!(session.package.name(), "full");
    assert_eq!(registry.active_count(), 2);
}

#[test]
fn open_rejects_unknown_package() {
    let (registry, _rx) = registry(AccessPolicy::open());
    let err = registry.open(&caller(None), Some("admin")).unwrap_err();
    assert_eq!(err, SessionError::UnknownPackage("admin".to_string()));
    assert_eq!(registry.active_count(), 0);
}

#[test]
fn open_enforces_access_grants() {
    let policy = AccessPolicy::from_config(&AccessConfig {
        allow_unlisted: false,
        grants: vec![AccessGrant {
            identity: "triage-bot".to_string(),
            packages: vec!["read_only".to_string()],
        }],
    });
    let (registry, _rx) = registry(policy);
    assert!(registry.open(&caller(Some("triage-bot")), Some("read_only")).is_ok());
    assert!(matches!(
        registry.open(&caller(Some("triage-bot")), Some("full")),
        Err(SessionError::PackageDenied { .. })
    ));
    assert!(matches!(
        registry.open(&caller(None), Some("read_only")),
        Err(SessionError::PackageDenied { .. })
    ));
}

#[test]
fn session_ids_are_unique() {
    let (registry, _rx) = registry(AccessPolicy::open());
    let first = registry.open(&caller(None), None).unwrap();
    let second = registry.open(&caller(None), None).unwrap();
    assert_ne!(first.session_id, second.session_id);
}

#[test]
fn close_is_idempotent() {
    let (registry, _rx) = registry(AccessPolicy::open());
    let session = registry.open(&caller(None), None).unwrap();
    assert!(registry.close(&session.session_id).is_some());
    assert!(registry.close(&session.session_id).is_none());
    assert!(registry.get(&session.session_id).is_none());
    assert!(!registry.touch(&session.session_id));
}

#[test]
fn duplicate_request_ids_are_rejected_for_session_lifetime() {
    let (registry, _rx) = registry(AccessPolicy::open());
    let id = registry.open(&caller(None), None).unwrap().session_id.clone();
    registry.begin_request(&id, "r-1").unwrap();
    assert_eq!(
        registry.begin_request(&id, "r-1").unwrap_err(),
        SessionError::DuplicateRequest("r-1".to_string())
    );
    assert!(registry.complete_request(&id, "r-1"));
    assert_eq!(
        registry.begin_request(&id, "r-1").unwrap_err(),
        SessionError::DuplicateRequest("r-1".to_string())
    );
}

#[test]
fn completion_is_reported_once() {
    let (registry, _rx) = registry(AccessPolicy::open());
    let id = registry.open(&caller(None), None).unwrap().session_id.clone();
    registry.begin_request(&id, "r-1").unwrap();
    assert!(registry.complete_request(&id, "r-1"));
    assert!(!registry.complete_request(&id, "r-1"));
    assert!(!registry.complete_request(&id, "never-accepted"));
}

#[test]
fn completion_after_close_is_rejected() {
    let (registry, _rx) = registry(AccessPolicy::open());
    let id = registry.open(&caller(None), None).unwrap().session_id.clone();
    registry.begin_request(&id, "r-1").unwrap();
    registry.close(&id);
    assert!(!registry.complete_request(&id, "r-1"));
}

#[test]
fn in_flight_limit_is_enforced() {
    let (registry, _rx) = registry(AccessPolicy::open());
    let id = registry.open(&caller(None), None).unwrap().session_id.clone();
    registry.begin_request(&id, "r-1").unwrap();
    registry.begin_request(&id, "r-2").unwrap();
    assert_eq!(registry.begin_request(&id, "r-3").unwrap_err(), SessionError::InflightLimit(2));
    assert_eq!(registry.in_flight_count(&id), 2);
    registry.complete_request(&id, "r-1");
    assert!(registry.begin_request(&id, "r-3").is_ok());
}

#[test]
fn request_ids_are_capped_per_session() {
    let (registry, _rx) = registry(AccessPolicy::open());
    let id = registry.open(&caller(None), None).unwrap().session_id.clone();
    for request_id in ["r-1", "r-2", "r-3", "r-4"] {
        registry.begin_request(&id, request_id).unwrap();
        registry.complete_request(&id, request_id);
    }
    assert_eq!(registry.begin_request(&id, "r-5").unwrap_err(), SessionError::RequestIdLimit(4));
    assert_eq!(registry.in_flight_count(&id), 0);

    let fresh = registry.open(&caller(None), None).unwrap().session_id.clone();
    assert!(registry.begin_request(&fresh, "r-5").is_ok());
}

#[test]
fn unknown_session_rejects_requests() {
    let (registry, _rx) = registry(AccessPolicy::open());
    assert_eq!(
        registry.begin_request("missing", "r-1").unwrap_err(),
        SessionError::UnknownSession("missing".to_string())
    );
}

#[test]
fn idle_sessions_are_notified_once() {
    let (registry, mut rx) = registry(AccessPolicy::open());
    let id = registry.open(&caller(None), None).unwrap().session_id.clone();
    let later = Instant::now() + Duration::from_secs(61);
    assert_eq!(registry.sweep_idle(later), vec![id.clone()]);
    assert!(registry.sweep_idle(later).is_empty());
    assert_eq!(
        rx.try_recv().unwrap(),
        SessionNotice::IdleTimeout {
            session_id: id,
        }
    );
    assert!(rx.try_recv().is_err());
}

#[test]
fn busy_or_recent_sessions_are_not_idle() {
    let (registry, _rx) = registry(AccessPolicy::open());
    let busy = registry.open(&caller(None), None).unwrap().session_id.clone();
    registry.begin_request(&busy, "r-1").unwrap();
    assert!(registry.sweep_idle(Instant::now() + Duration::from_secs(120)).is_empty());
    assert!(registry.sweep_idle(Instant::now()).is_empty());
}
