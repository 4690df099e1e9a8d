// crates/incident-gate-mcp/tests/common/mod.rs
// ============================================================================
// Module: Common Test Utilities
// Description: Stub Table API and server builders for MCP integration tests.
// Purpose: Run the full server stack against a local HTTP backend.
// Dependencies: incident-gate-mcp, incident-gate-config, axum, tokio
// ============================================================================

//! ## Overview
//! Serves a minimal Table API on an ephemeral port. Every request is counted
//! and record creation can be held open so tests can drop connections while a
//! backend call is in flight.

#![allow(dead_code, reason = "Shared test helpers may be unused in some cases.")]
#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::extract::Request;
use axum::extract::State;
use axum::http::Method;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use incident_gate_config::BackendAuthConfig;
use incident_gate_config::IncidentGateConfig;
use incident_gate_config::RetryConfig;
use incident_gate_config::Secret;
use incident_gate_mcp::InboundFrame;
use incident_gate_mcp::McpServer;
use incident_gate_mcp::OutboundFrame;
use incident_gate_mcp::ToolCallResult;
use serde_json::Value;
use serde_json::json;
use tokio::sync::Notify;
use tokio::sync::mpsc;
use tokio::sync::oneshot;

// ============================================================================
// SECTION: Stub Table API
// ============================================================================

/// Path prefix of the managed table.
const TABLE_PATH: &str = "/api/now/table/incident";

/// Shared stub state.
pub struct StubTable {
    calls: AtomicUsize,
    completed_creates: AtomicUsize,
    hold_creates: AtomicBool,
    throttled_lists: AtomicUsize,
    create_started: Notify,
    create_released: Notify,
}

impl StubTable {
    /// Builds a stub that answers every request immediately.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            completed_creates: AtomicUsize::new(0),
            hold_creates: AtomicBool::new(false),
            throttled_lists: AtomicUsize::new(0),
            create_started: Notify::new(),
            create_released: Notify::new(),
        })
    }

    /// Builds a stub that holds record creation until released.
    pub fn holding_creates() -> Arc<Self> {
        let stub = Self::new();
        stub.hold_creates.store(true, Ordering::SeqCst);
        stub
    }

    /// Builds a stub that answers the first `count` list requests with 429.
    pub fn throttling_lists(count: usize) -> Arc<Self> {
        let stub = Self::new();
        stub.throttled_lists.store(count, Ordering::SeqCst);
        stub
    }

    /// Requests received so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Creates that returned a response.
    pub fn completed_creates(&self) -> usize {
        self.completed_creates.load(Ordering::SeqCst)
    }

    /// Waits until a create request arrives.
    pub async fn wait_for_create(&self) {
        tokio::time::timeout(Duration::from_secs(2), self.create_started.notified())
            .await
            .expect("create request within timeout");
    }

    /// Lets a held create respond.
    pub fn release_create(&self) {
        self.create_released.notify_one();
    }
}

/// Canonical incident row.
pub fn row(number: &str, short_description: &str) -> Value {
    json!({
        "sys_id": "46d44a5fa9fe198101f0f0e2ae5d7a2c",
        "number": number,
        "short_description": short_description,
        "priority": "3",
        "state": "New",
        "assigned_to": {"display_value": "", "value": ""},
        "opened_at": "2026-01-05 09:00:00",
        "sys_updated_on": "2026-01-05 09:00:00",
    })
}

/// Routes every request by method and path.
async fn table(State(stub): State<Arc<StubTable>>, request: Request) -> Response {
    stub.calls.fetch_add(1, Ordering::SeqCst);
    let path = request.uri().path().to_string();
    let query = request.uri().query().unwrap_or_default().to_string();
    let Some(rest) = path.strip_prefix(TABLE_PATH) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let method = request.method().clone();
    match (method, rest.trim_start_matches('/')) {
        (Method::GET, "") => {
            let throttled = stub
                .throttled_lists
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
                .is_ok();
            if throttled {
                return (
                    StatusCode::TOO_MANY_REQUESTS,
                    [("retry-after", "0")],
                    Json(json!({"error": {"message": "rate limited"}})),
                )
                    .into_response();
            }
            let number = query
                .split('&')
                .find_map(|pair| pair.strip_prefix("sysparm_query=number%3D"))
                .unwrap_or("INC0010001");
            Json(json!({"result": [row(number, "Printer jam")]})).into_response()
        }
        (Method::POST, "") => {
            if stub.hold_creates.load(Ordering::SeqCst) {
                let released = stub.create_released.notified();
                stub.create_started.notify_one();
                released.await;
            }
            stub.completed_creates.fetch_add(1, Ordering::SeqCst);
            (StatusCode::CREATED, Json(json!({"result": row("INC0010099", "Created")})))
                .into_response()
        }
        (Method::GET | Method::PATCH, _) => {
            Json(json!({"result": row("INC0010001", "Printer jam")})).into_response()
        }
        (Method::DELETE, _) => StatusCode::NO_CONTENT.into_response(),
        _ => StatusCode::METHOD_NOT_ALLOWED.into_response(),
    }
}

/// Serves the stub table and returns its base URL.
pub async fn spawn_table(stub: Arc<StubTable>) -> (String, oneshot::Sender<()>) {
    let app = Router::new().fallback(table).with_state(stub);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await;
    });
    (format!("http://{addr}"), shutdown_tx)
}

// ============================================================================
// SECTION: Server Builders
// ============================================================================

/// Configuration pointing at the stub table.
pub fn config_for(base_url: &str) -> IncidentGateConfig {
    let mut config = IncidentGateConfig::default();
    config.backend.instance_url = base_url.to_string();
    config.backend.allow_http = true;
    config.backend.timeout_ms = 2_000;
    config.backend.auth = BackendAuthConfig::Basic {
        username: "svc".to_string(),
        password: Secret::new("pw"),
    };
    config.backend.retry = RetryConfig {
        max_attempts: 1,
        initial_backoff_ms: 5,
        max_backoff_ms: 20,
    };
    config.server.audit.enabled = false;
    config
}

/// Builds a server over a fresh stub table.
pub async fn server_with(stub: Arc<StubTable>) -> (McpServer, oneshot::Sender<()>) {
    server_with_attempts(stub, 1).await
}

/// Builds a server whose backend makes up to `max_attempts` per call.
pub async fn server_with_attempts(
    stub: Arc<StubTable>,
    max_attempts: u32,
) -> (McpServer, oneshot::Sender<()>) {
    let (base_url, shutdown) = spawn_table(stub).await;
    let mut config = config_for(&base_url);
    config.backend.retry.max_attempts = max_attempts;
    let server = McpServer::from_config(config).expect("server");
    (server, shutdown)
}

// ============================================================================
// SECTION: Frame Helpers
// ============================================================================

/// Builds a tool call frame.
pub fn tool_call(request_id: &str, tool: &str, arguments: Value) -> InboundFrame {
    InboundFrame::ToolCall {
        request_id: Some(request_id.to_string()),
        tool_name: tool.to_string(),
        arguments,
    }
}

/// Reads the next queued frame.
pub async fn next_frame(receiver: &mut mpsc::Receiver<OutboundFrame>) -> Option<OutboundFrame> {
    tokio::time::timeout(Duration::from_secs(3), receiver.recv())
        .await
        .expect("frame within timeout")
}

/// Reads the next frame and requires a tool result.
pub async fn next_result(receiver: &mut mpsc::Receiver<OutboundFrame>) -> ToolCallResult {
    match next_frame(receiver).await {
        Some(OutboundFrame::Result(result)) => result,
        other => panic!("expected result frame, got {other:?}"),
    }
}

/// Skips the handshake acknowledgement queued on connect.
pub async fn skip_ack(receiver: &mut mpsc::Receiver<OutboundFrame>) {
    match next_frame(receiver).await {
        Some(OutboundFrame::HandshakeAck { .. }) => {}
        other => panic!("expected handshake ack, got {other:?}"),
    }
}
