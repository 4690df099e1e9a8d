//! End-to-end tool scenarios against a stub Table API.
// crates/incident-gate-mcp/tests/tool_scenarios.rs
// ============================================================================
// Module: Tool Scenario Tests
// Description: Package gating, validation, delivery, and disconnect flows.
// Purpose: Exercise the full server stack over a real HTTP backend client.
// Dependencies: incident-gate-mcp, axum, tokio, tower
// ============================================================================

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

mod common;

use std::collections::BTreeSet;
use std::time::Duration;

use axum::body::Body;
use axum::http::Request;
use axum::http::StatusCode;
use http_body_util::BodyExt;
use incident_gate_mcp::CallerContext;
use incident_gate_mcp::ErrorKind;
use incident_gate_mcp::protocol::ResultStatus;
use serde_json::Value;
use serde_json::json;
use tower::ServiceExt;

use crate::common::StubTable;
use crate::common::next_result;
use crate::common::server_with;
use crate::common::server_with_attempts;
use crate::common::skip_ack;
use crate::common::tool_call;

// ============================================================================
// SECTION: Package Gating
// ============================================================================

#[tokio::test]
async fn basic_package_cannot_delete() {
    let stub = StubTable::new();
    let (server, _shutdown) = server_with(stub.clone()).await;
    let transport = server.transport();
    let mut connection = transport.connect(&CallerContext::stdio(), Some("basic")).unwrap();
    skip_ack(&mut connection.receiver).await;

    transport
        .submit(
            &connection.session_id,
            tool_call("del-1", "delete_incident", json!({"incident_id": "INC0010001"})),
        )
        .unwrap();
    let result = next_result(&mut connection.receiver).await;
    assert_eq!(result.request_id, "del-1");
    assert_eq!(result.error_kind(), Some(ErrorKind::Forbidden));
    let wire = serde_json::to_value(&result).unwrap();
    assert_eq!(wire["status"], "error");
    assert_eq!(wire["kind"], "Forbidden");
    assert!(wire["message"].is_string());
    assert_eq!(stub.calls(), 0);
}

#[tokio::test]
async fn missing_required_argument_never_reaches_backend() {
    let stub = StubTable::new();
    let (server, _shutdown) = server_with(stub.clone()).await;
    let transport = server.transport();
    let mut connection = transport.connect(&CallerContext::stdio(), None).unwrap();
    skip_ack(&mut connection.receiver).await;

    transport
        .submit(
            &connection.session_id,
            tool_call("create-1", "create_incident", json!({"priority": "2"})),
        )
        .unwrap();
    let result = next_result(&mut connection.receiver).await;
    assert_eq!(result.error_kind(), Some(ErrorKind::InvalidArgument));
    assert_eq!(result.error.unwrap().message, "short_description required");
    assert_eq!(stub.calls(), 0);
}

// ============================================================================
// SECTION: Reads
// ============================================================================

#[tokio::test]
async fn throttled_list_is_retried_until_success() {
    let stub = StubTable::throttling_lists(2);
    let (server, _shutdown) = server_with_attempts(stub.clone(), 3).await;
    let transport = server.transport();
    let mut connection = transport.connect(&CallerContext::stdio(), Some("read_only")).unwrap();
    skip_ack(&mut connection.receiver).await;

    transport
        .submit(&connection.session_id, tool_call("list-1", "list_incidents", json!({})))
        .unwrap();
    let result = next_result(&mut connection.receiver).await;
    assert_eq!(result.request_id, "list-1");
    assert_eq!(result.status, ResultStatus::Success);
    assert!(result.payload.is_some());
    assert_eq!(stub.calls(), 3);
}

#[tokio::test]
async fn repeated_reads_return_identical_payloads() {
    let stub = StubTable::new();
    let (server, _shutdown) = server_with(stub.clone()).await;
    let transport = server.transport();
    let mut connection = transport.connect(&CallerContext::stdio(), Some("read_only")).unwrap();
    skip_ack(&mut connection.receiver).await;

    let mut payloads = Vec::new();
    for request_id in ["read-1", "read-2"] {
        transport
            .submit(
                &connection.session_id,
                tool_call(request_id, "get_incident", json!({"incident_id": "INC0010001"})),
            )
            .unwrap();
        let result = next_result(&mut connection.receiver).await;
        assert_eq!(result.status, ResultStatus::Success);
        payloads.push(result.payload.unwrap());
    }
    assert_eq!(payloads[0], payloads[1]);
    assert_eq!(payloads[0]["record"]["identifier"], "INC0010001");
    assert_eq!(stub.calls(), 2);
}

#[tokio::test]
async fn concurrent_results_are_delivered_once_each() {
    let stub = StubTable::new();
    let (server, _shutdown) = server_with(stub).await;
    let transport = server.transport();
    let mut connection = transport.connect(&CallerContext::stdio(), None).unwrap();
    skip_ack(&mut connection.receiver).await;

    let expected: BTreeSet<String> = ["a", "b", "c"].iter().map(ToString::to_string).collect();
    for request_id in &expected {
        transport
            .submit(
                &connection.session_id,
                tool_call(request_id, "list_incidents", json!({"limit": 5})),
            )
            .unwrap();
    }
    let mut seen = BTreeSet::new();
    for _ in 0..expected.len() {
        let result = next_result(&mut connection.receiver).await;
        assert!(seen.insert(result.request_id), "result delivered twice");
    }
    assert_eq!(seen, expected);
    let extra =
        tokio::time::timeout(Duration::from_millis(200), connection.receiver.recv()).await;
    assert!(extra.is_err(), "unexpected frame after all results");
    assert_eq!(transport.stats().results_delivered, 3);
}

// ============================================================================
// SECTION: Disconnects
// ============================================================================

#[tokio::test]
async fn dropped_connection_discards_in_flight_create() {
    let stub = StubTable::holding_creates();
    let (server, _shutdown) = server_with(stub.clone()).await;
    let transport = server.transport();
    let connection = transport.connect(&CallerContext::stdio(), None).unwrap();
    let session_id = connection.session_id.clone();

    transport
        .submit(
            &session_id,
            tool_call("create-1", "create_incident", json!({"short_description": "VPN down"})),
        )
        .unwrap();
    stub.wait_for_create().await;
    transport.disconnect(&session_id);
    drop(connection);
    assert_eq!(transport.registry().active_count(), 0);
    stub.release_create();

    tokio::time::timeout(Duration::from_secs(3), async {
        while transport.stats().results_discarded == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("result discarded");
    assert_eq!(stub.completed_creates(), 1);
    assert_eq!(transport.stats().results_delivered, 0);
}

// ============================================================================
// SECTION: REST Facade
// ============================================================================

#[tokio::test]
async fn rest_read_matches_streaming_payload() {
    let stub = StubTable::new();
    let (server, _shutdown) = server_with(stub).await;
    let transport = server.transport();
    let mut connection = transport.connect(&CallerContext::stdio(), None).unwrap();
    skip_ack(&mut connection.receiver).await;
    transport
        .submit(
            &connection.session_id,
            tool_call("read-1", "get_incident", json!({"incident_id": "INC0010001"})),
        )
        .unwrap();
    let streamed = next_result(&mut connection.receiver).await.payload.unwrap();

    let request = Request::builder()
        .method("GET")
        .uri("/incidents/INC0010001")
        .body(Body::empty())
        .unwrap();
    let response = server.router().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["payload"], streamed);
}
