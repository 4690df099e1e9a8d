//! Retry and classification tests for incident-gate-backend.
// crates/incident-gate-backend/tests/retry_behavior.rs
// =============================================================================
// Module: Backend Retry Tests
// Description: Validate bounded retries, create safety, and timeouts.
// Purpose: Ensure transient failures are retried within limits only.
// =============================================================================

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions use unwrap/expect for clarity."
)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use incident_gate_backend::BackendErrorKind;
use incident_gate_backend::ListQuery;
use incident_gate_backend::RecordBackend;
use incident_gate_backend::RecordFields;
use incident_gate_backend::TableApiBackend;
use incident_gate_config::BackendAuthConfig;
use incident_gate_config::BackendConfig;
use incident_gate_config::RetryConfig;
use incident_gate_config::Secret;
use serde_json::json;
use tokio::sync::oneshot;

// ============================================================================
// SECTION: Stub Backend
// ============================================================================

#[derive(Clone, Copy)]
enum Reply {
    Ok,
    Status(u16),
    Slow(Duration),
}

struct Script {
    replies: Mutex<VecDeque<Reply>>,
    fallback: Reply,
    calls: AtomicUsize,
    idempotency_keys: Mutex<Vec<String>>,
}

impl Script {
    fn new(replies: &[Reply], fallback: Reply) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().copied().collect()),
            fallback,
            calls: AtomicUsize::new(0),
            idempotency_keys: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn ok_body() -> serde_json::Value {
    json!({"result": {"sys_id": "46d44a5fa9fe198101f0f0e2ae5d7a2c", "number": "INC0010042"}})
}

async fn scripted(State(script): State<Arc<Script>>, headers: HeaderMap) -> Response {
    script.calls.fetch_add(1, Ordering::SeqCst);
    if let Some(key) = headers.get("idempotency-key").and_then(|value| value.to_str().ok()) {
        script.idempotency_keys.lock().unwrap().push(key.to_string());
    }
    let reply = script.replies.lock().unwrap().pop_front().unwrap_or(script.fallback);
    match reply {
        Reply::Ok => (StatusCode::OK, Json(ok_body())).into_response(),
        Reply::Status(code) => {
            let status = StatusCode::from_u16(code).unwrap();
            let mut response =
                (status, Json(json!({"error": {"message": "scripted failure"}}))).into_response();
            if code == 429 {
                response.headers_mut().insert("retry-after", "0".parse().unwrap());
            }
            response
        }
        Reply::Slow(delay) => {
            tokio::time::sleep(delay).await;
            (StatusCode::OK, Json(ok_body())).into_response()
        }
    }
}

async fn spawn(script: Arc<Script>) -> (String, oneshot::Sender<()>) {
    let app = Router::new().fallback(scripted).with_state(script);
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

fn backend(base_url: &str, timeout_ms: u64) -> TableApiBackend {
    let config = BackendConfig {
        instance_url: base_url.to_string(),
        allow_http: true,
        timeout_ms,
        auth: BackendAuthConfig::Basic {
            username: "svc".to_string(),
            password: Secret::new("pw"),
        },
        retry: RetryConfig {
            max_attempts: 3,
            initial_backoff_ms: 5,
            max_backoff_ms: 20,
        },
        ..BackendConfig::default()
    };
    TableApiBackend::from_config(&config).expect("backend")
}

fn new_incident() -> RecordFields {
    RecordFields {
        short_description: Some("VPN down".to_string()),
        ..RecordFields::default()
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[tokio::test]
async fn rate_limited_twice_then_success_makes_three_calls() {
    let script = Script::new(&[Reply::Status(429), Reply::Status(429)], Reply::Ok);
    let (base_url, shutdown) = spawn(Arc::clone(&script)).await;
    let record = backend(&base_url, 2_000).read("46d44a5fa9fe198101f0f0e2ae5d7a2c").await.unwrap();
    assert_eq!(record.identifier, "INC0010042");
    assert_eq!(script.calls(), 3);
    let _ = shutdown.send(());
}

#[tokio::test]
async fn persistent_unavailability_stops_at_attempt_cap() {
    let script = Script::new(&[], Reply::Status(503));
    let (base_url, shutdown) = spawn(Arc::clone(&script)).await;
    let err = backend(&base_url, 2_000).list(&ListQuery::default()).await.unwrap_err();
    assert_eq!(err.kind(), BackendErrorKind::Unavailable);
    assert_eq!(script.calls(), 3);
    let _ = shutdown.send(());
}

#[tokio::test]
async fn invalid_argument_is_not_retried() {
    let script = Script::new(&[], Reply::Status(422));
    let (base_url, shutdown) = spawn(Arc::clone(&script)).await;
    let err = backend(&base_url, 2_000).list(&ListQuery::default()).await.unwrap_err();
    assert_eq!(err.kind(), BackendErrorKind::InvalidArgument);
    assert_eq!(err.message(), "scripted failure");
    assert_eq!(script.calls(), 1);
    let _ = shutdown.send(());
}

#[tokio::test]
async fn create_without_idempotency_key_is_attempted_once() {
    let script = Script::new(&[], Reply::Status(503));
    let (base_url, shutdown) = spawn(Arc::clone(&script)).await;
    let err = backend(&base_url, 2_000).create(&new_incident(), None).await.unwrap_err();
    assert_eq!(err.kind(), BackendErrorKind::Unavailable);
    assert_eq!(script.calls(), 1);
    assert!(script.idempotency_keys.lock().unwrap().is_empty());
    let _ = shutdown.send(());
}

#[tokio::test]
async fn create_with_idempotency_key_is_retried_with_header() {
    let script = Script::new(&[Reply::Status(503)], Reply::Ok);
    let (base_url, shutdown) = spawn(Arc::clone(&script)).await;
    let record =
        backend(&base_url, 2_000).create(&new_incident(), Some("req-7f3a")).await.unwrap();
    assert_eq!(record.identifier, "INC0010042");
    assert_eq!(script.calls(), 2);
    assert_eq!(*script.idempotency_keys.lock().unwrap(), vec!["req-7f3a", "req-7f3a"]);
    let _ = shutdown.send(());
}

#[tokio::test]
async fn create_timeout_surfaces_unavailable_without_retry() {
    let script = Script::new(&[], Reply::Slow(Duration::from_millis(800)));
    let (base_url, shutdown) = spawn(Arc::clone(&script)).await;
    let err = backend(&base_url, 150).create(&new_incident(), None).await.unwrap_err();
    assert_eq!(err.kind(), BackendErrorKind::Unavailable);
    assert_eq!(script.calls(), 1);
    let _ = shutdown.send(());
}

#[tokio::test]
async fn rejected_credentials_classify_as_unauthorized() {
    let script = Script::new(&[], Reply::Status(401));
    let (base_url, shutdown) = spawn(Arc::clone(&script)).await;
    let err = backend(&base_url, 2_000).probe().await.unwrap_err();
    assert_eq!(err.kind(), BackendErrorKind::Unauthorized);
    assert_eq!(script.calls(), 1);
    let _ = shutdown.send(());
}

#[tokio::test]
async fn missing_record_classifies_as_not_found() {
    let script = Script::new(&[], Reply::Status(404));
    let (base_url, shutdown) = spawn(Arc::clone(&script)).await;
    let err = backend(&base_url, 2_000).read("46d44a5fa9fe198101f0f0e2ae5d7a2c").await.unwrap_err();
    assert_eq!(err.kind(), BackendErrorKind::NotFound);
    assert_eq!(script.calls(), 1);
    let _ = shutdown.send(());
}
