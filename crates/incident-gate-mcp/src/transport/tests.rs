// crates/incident-gate-mcp/src/transport/tests.rs
// ============================================================================
// Module: Transport Manager Tests
// Description: Unit tests for queues, delivery, drains, and disconnects.
// Purpose: Ensure results are delivered at most once to live connections.
// Dependencies: incident-gate-mcp, tokio
// ============================================================================

//! ## Overview
//! Drives [`TransportManager`] with the in-memory backend and reads frames
//! straight off the connection queue.

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

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::timeout;

use super::ConnectError;
use super::ConnectionState;
use super::DrainReason;
use super::SubmitError;
use super::TransportLimits;
use super::TransportManager;
use crate::access::AccessPolicy;
use crate::access::CallerContext;
use crate::dispatch::DispatchEngine;
use crate::protocol::ErrorKind;
use crate::protocol::EventType;
use crate::protocol::InboundFrame;
use crate::protocol::OutboundFrame;
use crate::protocol::ResultStatus;
use crate::protocol::ToolCallResult;
use crate::sessions::SessionError;
use crate::sessions::SessionLimits;
use crate::sessions::SessionNotice;
use crate::sessions::SessionRegistry;
use crate::tests::MemoryBackend;
use crate::tests::builtin_catalog;

// ============================================================================
// SECTION: Helpers
// ============================================================================

const LIMITS: TransportLimits = TransportLimits {
    queue_capacity: 8,
    drain_grace: Duration::from_millis(500),
    idle_timeout: Duration::from_secs(60),
};

fn manager(backend: Arc<MemoryBackend>) -> Arc<TransportManager> {
    let (tx, _rx) = mpsc::unbounded_channel();
    let registry = Arc::new(SessionRegistry::new(
        builtin_catalog(),
        AccessPolicy::open(),
        SessionLimits {
            idle_timeout: LIMITS.idle_timeout,
            max_inflight: 4,
            max_request_ids: 64,
        },
        tx,
    ));
    let engine = Arc::new(DispatchEngine::new(backend, false));
    Arc::new(TransportManager::new(registry, engine, LIMITS))
}

fn tool_call(request_id: &str, tool: &str, arguments: serde_json::Value) -> InboundFrame {
    InboundFrame::ToolCall {
        request_id: Some(request_id.to_string()),
        tool_name: tool.to_string(),
        arguments,
    }
}

async fn next_frame(receiver: &mut mpsc::Receiver<OutboundFrame>) -> Option<OutboundFrame> {
    timeout(Duration::from_secs(2), receiver.recv()).await.expect("frame within timeout")
}

async fn next_result(receiver: &mut mpsc::Receiver<OutboundFrame>) -> ToolCallResult {
    match next_frame(receiver).await {
        Some(OutboundFrame::Result(result)) => result,
        other => panic!("expected result frame, got {other:?}"),
    }
}

// ============================================================================
// SECTION: Handshake
// ============================================================================

#[tokio::test]
async fn connect_queues_handshake_ack_first() {
    let manager = manager(MemoryBackend::new());
    let mut connection = manager.connect(&CallerContext::stdio(), Some("read_only")).unwrap();
    assert_eq!(connection.package, "read_only");
    match next_frame(&mut connection.receiver).await.unwrap() {
        OutboundFrame::HandshakeAck {
            session_id,
            package,
            tools,
        } => {
            assert_eq!(session_id, connection.session_id);
            assert_eq!(package, "read_only");
            assert_eq!(tools.len(), 2);
        }
        other => panic!("unexpected frame {other:?}"),
    }
    assert_eq!(manager.state(&connection.session_id), ConnectionState::Active);
}

#[tokio::test]
async fn connect_rejects_unknown_package() {
    let manager = manager(MemoryBackend::new());
    let err = manager.connect(&CallerContext::stdio(), Some("admin")).unwrap_err();
    assert_eq!(err, ConnectError::Rejected(SessionError::UnknownPackage("admin".to_string())));
    assert_eq!(manager.connection_count(), 0);
}

#[tokio::test]
async fn second_handshake_is_malformed() {
    let manager = manager(MemoryBackend::new());
    let connection = manager.connect(&CallerContext::stdio(), None).unwrap();
    let err = manager
        .submit(&connection.session_id, InboundFrame::Handshake {
            requested_package: None,
        })
        .unwrap_err();
    assert!(matches!(err, SubmitError::Malformed(_)));
}

// ============================================================================
// SECTION: Submission
// ============================================================================

#[tokio::test]
async fn tool_call_result_is_delivered_once() {
    let backend = MemoryBackend::new();
    let manager = manager(backend.clone());
    let mut connection = manager.connect(&CallerContext::stdio(), None).unwrap();
    next_frame(&mut connection.receiver).await;
    let ack = manager
        .submit(
            &connection.session_id,
            tool_call("r-1", "get_incident", json!({"incident_id": "INC0010001"})),
        )
        .unwrap();
    assert_eq!(ack.request_id.as_deref(), Some("r-1"));
    let result = next_result(&mut connection.receiver).await;
    assert_eq!(result.request_id, "r-1");
    assert_eq!(result.status, ResultStatus::Success);
    assert!(timeout(Duration::from_millis(100), connection.receiver.recv()).await.is_err());
    assert_eq!(manager.stats().results_delivered, 1);
    assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn missing_request_id_is_assigned() {
    let manager = manager(MemoryBackend::new());
    let mut connection = manager.connect(&CallerContext::stdio(), None).unwrap();
    next_frame(&mut connection.receiver).await;
    let ack = manager
        .submit(&connection.session_id, InboundFrame::ToolCall {
            request_id: None,
            tool_name: "list_incidents".to_string(),
            arguments: json!({}),
        })
        .unwrap();
    let assigned = ack.request_id.unwrap();
    assert!(!assigned.is_empty());
    assert_eq!(next_result(&mut connection.receiver).await.request_id, assigned);
}

#[tokio::test]
async fn duplicate_and_oversized_request_ids_are_rejected() {
    let manager = manager(MemoryBackend::new());
    let connection = manager.connect(&CallerContext::stdio(), None).unwrap();
    manager.submit(&connection.session_id, tool_call("r-1", "list_incidents", json!({}))).unwrap();
    let err = manager
        .submit(&connection.session_id, tool_call("r-1", "list_incidents", json!({})))
        .unwrap_err();
    assert_eq!(err, SubmitError::DuplicateRequest("r-1".to_string()));
    let long_id = "x".repeat(200);
    let err = manager
        .submit(&connection.session_id, tool_call(&long_id, "list_incidents", json!({})))
        .unwrap_err();
    assert!(matches!(err, SubmitError::Malformed(_)));
}

#[tokio::test]
async fn unknown_session_is_rejected() {
    let manager = manager(MemoryBackend::new());
    let err = manager.submit("missing", tool_call("r-1", "list_incidents", json!({}))).unwrap_err();
    assert_eq!(err, SubmitError::UnknownSession("missing".to_string()));
    assert_eq!(err.code(), "unknown_session");
}

#[tokio::test]
async fn forbidden_tool_yields_error_result() {
    let backend = MemoryBackend::new();
    let manager = manager(backend.clone());
    let mut connection = manager.connect(&CallerContext::stdio(), Some("basic")).unwrap();
    next_frame(&mut connection.receiver).await;
    manager
        .submit(
            &connection.session_id,
            tool_call("r-1", "delete_incident", json!({"incident_id": "INC0010001"})),
        )
        .unwrap();
    let result = next_result(&mut connection.receiver).await;
    assert_eq!(result.error_kind(), Some(ErrorKind::Forbidden));
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn list_tools_returns_package_listing() {
    let manager = manager(MemoryBackend::new());
    let mut connection = manager.connect(&CallerContext::stdio(), Some("basic")).unwrap();
    next_frame(&mut connection.receiver).await;
    manager
        .submit(&connection.session_id, InboundFrame::ListTools {
            request_id: Some("tools".to_string()),
        })
        .unwrap();
    let result = next_result(&mut connection.receiver).await;
    let payload = result.payload.unwrap();
    assert_eq!(payload["package"], "basic");
    assert_eq!(payload["tools"].as_array().unwrap().len(), 3);
}

// ============================================================================
// SECTION: Lifecycle
// ============================================================================

#[tokio::test]
async fn disconnect_mid_call_discards_result() {
    let backend = MemoryBackend::gated();
    let manager = manager(backend.clone());
    let connection = manager.connect(&CallerContext::stdio(), None).unwrap();
    manager
        .submit(
            &connection.session_id,
            tool_call("r-1", "create_incident", json!({"short_description": "Printer on fire"})),
        )
        .unwrap();
    backend.wait_for_create().await;
    drop(connection.receiver);
    manager.disconnect(&connection.session_id);
    assert_eq!(manager.state(&connection.session_id), ConnectionState::Closed);
    backend.release_creates();
    timeout(Duration::from_secs(2), async {
        while manager.stats().results_discarded == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(backend.completed(), 1);
    assert_eq!(manager.stats().results_delivered, 0);
    assert_eq!(manager.registry().active_count(), 0);
}

#[tokio::test]
async fn drain_lets_in_flight_work_finish() {
    let backend = MemoryBackend::gated();
    let manager = manager(backend.clone());
    let mut connection = manager.connect(&CallerContext::stdio(), None).unwrap();
    next_frame(&mut connection.receiver).await;
    manager
        .submit(
            &connection.session_id,
            tool_call("r-1", "create_incident", json!({"short_description": "Disk full"})),
        )
        .unwrap();
    backend.wait_for_create().await;
    let draining = {
        let manager = Arc::clone(&manager);
        let session_id = connection.session_id.clone();
        tokio::spawn(async move { manager.drain(&session_id, DrainReason::Shutdown).await })
    };
    match next_frame(&mut connection.receiver).await.unwrap() {
        OutboundFrame::Event {
            event_type,
            detail,
        } => {
            assert_eq!(event_type, EventType::Draining);
            assert_eq!(detail["reason"], "shutdown");
        }
        other => panic!("unexpected frame {other:?}"),
    }
    let err = manager
        .submit(&connection.session_id, tool_call("r-2", "list_incidents", json!({})))
        .unwrap_err();
    assert_eq!(err, SubmitError::Draining);
    backend.release_creates();
    assert_eq!(next_result(&mut connection.receiver).await.request_id, "r-1");
    draining.await.unwrap();
    assert!(next_frame(&mut connection.receiver).await.is_none());
    assert_eq!(manager.registry().active_count(), 0);
}

#[tokio::test]
async fn request_registered_after_drain_began_is_withdrawn() {
    let manager = manager(MemoryBackend::new());
    let mut connection = manager.connect(&CallerContext::stdio(), None).unwrap();
    next_frame(&mut connection.receiver).await;
    let handle = manager.connection(&connection.session_id).unwrap();
    handle.transition(ConnectionState::Draining);
    let err = manager.accept(&handle, Some("r-1".to_string())).unwrap_err();
    assert_eq!(err, SubmitError::Draining);
    assert_eq!(manager.registry().in_flight_count(&connection.session_id), 0);
}

#[tokio::test]
async fn close_frame_drains_session() {
    let manager = manager(MemoryBackend::new());
    let mut connection = manager.connect(&CallerContext::stdio(), None).unwrap();
    next_frame(&mut connection.receiver).await;
    let ack = manager.submit(&connection.session_id, InboundFrame::Close).unwrap();
    assert!(ack.request_id.is_none());
    assert!(matches!(
        next_frame(&mut connection.receiver).await,
        Some(OutboundFrame::Event {
            event_type: EventType::Draining,
            ..
        })
    ));
    assert!(next_frame(&mut connection.receiver).await.is_none());
    assert_eq!(manager.state(&connection.session_id), ConnectionState::Closed);
}

#[tokio::test]
async fn idle_notice_sends_event_then_drains() {
    let manager = manager(MemoryBackend::new());
    let mut connection = manager.connect(&CallerContext::stdio(), None).unwrap();
    next_frame(&mut connection.receiver).await;
    manager
        .handle_notice(SessionNotice::IdleTimeout {
            session_id: connection.session_id.clone(),
        })
        .await;
    let mut events = Vec::new();
    while let Some(frame) = next_frame(&mut connection.receiver).await {
        if let OutboundFrame::Event {
            event_type,
            ..
        } = frame
        {
            events.push(event_type);
        }
    }
    assert_eq!(events, vec![EventType::IdleTimeout, EventType::Draining]);
}

#[tokio::test]
async fn broadcast_counts_events_dropped_on_full_queue() {
    let manager = manager(MemoryBackend::new());
    let connection = manager.connect(&CallerContext::stdio(), None).unwrap();
    let heartbeat = OutboundFrame::event(EventType::Heartbeat, json!({}));
    for _ in 0..LIMITS.queue_capacity {
        manager.broadcast(&heartbeat);
    }
    assert_eq!(manager.stats().events_dropped, 1);
    drop(connection);
}

#[tokio::test]
async fn shutdown_refuses_new_connections() {
    let manager = manager(MemoryBackend::new());
    let mut connection = manager.connect(&CallerContext::stdio(), None).unwrap();
    manager.shutdown().await;
    assert_eq!(manager.connection_count(), 0);
    assert_eq!(
        manager.connect(&CallerContext::stdio(), None).unwrap_err(),
        ConnectError::ShuttingDown
    );
    next_frame(&mut connection.receiver).await;
    assert!(matches!(
        next_frame(&mut connection.receiver).await,
        Some(OutboundFrame::Event {
            event_type: EventType::Draining,
            ..
        })
    ));
}
