// crates/incident-gate-mcp/src/server.rs
// ============================================================================
// Module: MCP Server
// Description: Server assembly, SSE and stdio transports, health routes.
// Purpose: Wire catalog, registry, dispatch, and transports into a service.
// Dependencies: axum, incident-gate-backend, tokio, tokio-stream
// ============================================================================

//! ## Overview
//! [`McpServer`] builds the shared immutable catalog, the session registry,
//! the dispatch engine, and the transport manager once at startup, then serves
//! either an HTTP listener (SSE streams, message posts, the REST facade, and
//! health probes) or a single stdio session. Background tasks sweep idle
//! sessions, emit heartbeats, and broadcast backend reachability changes.
//! Security posture: frames are untrusted and size-limited before parsing.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::convert::Infallible;
use std::future::Future;
use std::net::IpAddr;
use std::net::SocketAddr;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use std::task::Context;
use std::task::Poll;
use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::ConnectInfo;
use axum::extract::DefaultBodyLimit;
use axum::extract::FromRequestParts;
use axum::extract::Query;
use axum::extract::State;
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::response::Sse;
use axum::response::sse::Event;
use axum::response::sse::KeepAlive;
use axum::routing::get;
use axum::routing::post;
use incident_gate_backend::RecordBackend;
use incident_gate_backend::TableApiBackend;
use incident_gate_config::IncidentGateConfig;
use incident_gate_config::ServerAuditConfig;
use incident_gate_config::ServerTransport;
use serde::Deserialize;
use serde_json::json;
use tokio::io::AsyncBufRead;
use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWrite;
use tokio::io::AsyncWriteExt;
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::Stream;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::access::AccessPolicy;
use crate::access::CALLER_IDENTITY_HEADER;
use crate::access::CallerContext;
use crate::access::TransportKind;
use crate::audit::AuditSink;
use crate::audit::FileAuditSink;
use crate::audit::NoopAuditSink;
use crate::audit::StderrAuditSink;
use crate::catalog::ToolCatalog;
use crate::dispatch::DispatchEngine;
use crate::health::HealthMonitor;
use crate::health::HealthStatus;
use crate::protocol::EventType;
use crate::protocol::InboundFrame;
use crate::protocol::OutboundFrame;
use crate::rest;
use crate::rest::RestState;
use crate::sessions::SessionError;
use crate::sessions::SessionLimits;
use crate::sessions::SessionNotice;
use crate::sessions::SessionRegistry;
use crate::telemetry::NoopMetrics;
use crate::transport::ConnectError;
use crate::transport::SubmitError;
use crate::transport::TransportLimits;
use crate::transport::TransportManager;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Path clients post frames to.
const MESSAGES_PATH: &str = "/messages";

// ============================================================================
// SECTION: MCP Server
// ============================================================================

/// MCP server instance.
pub struct McpServer {
    /// Server configuration.
    config: IncidentGateConfig,
    /// Connection and session owner.
    transport: Arc<TransportManager>,
    /// Backend reachability tracker.
    health: Arc<HealthMonitor>,
    /// Idle notices from the registry, consumed by `serve`.
    notices: mpsc::UnboundedReceiver<SessionNotice>,
}

impl McpServer {
    /// Builds a server backed by the configured record API.
    ///
    /// # Errors
    ///
    /// Returns [`McpServerError`] when configuration, the backend client, or
    /// the tool catalog is invalid.
    pub fn from_config(config: IncidentGateConfig) -> Result<Self, McpServerError> {
        config.validate().map_err(|err| McpServerError::Config(err.to_string()))?;
        let backend = TableApiBackend::from_config(&config.backend)
            .map_err(|err| McpServerError::Init(err.to_string()))?;
        Self::with_backend(config, Arc::new(backend))
    }

    /// Builds a server around an existing backend.
    ///
    /// # Errors
    ///
    /// Returns [`McpServerError`] when the catalog or audit sink cannot be
    /// loaded.
    pub fn with_backend(
        config: IncidentGateConfig,
        backend: Arc<dyn RecordBackend>,
    ) -> Result<Self, McpServerError> {
        let catalog = ToolCatalog::load(&config.catalog, backend.as_ref())
            .map_err(|err| McpServerError::Catalog(err.to_string()))?;
        let catalog = Arc::new(catalog);
        let audit = build_audit_sink(&config.server.audit)?;
        let (notice_tx, notices) = mpsc::unbounded_channel();
        let registry = SessionRegistry::new(
            Arc::clone(&catalog),
            AccessPolicy::from_config(&config.access),
            SessionLimits::from_config(&config.server.sessions),
            notice_tx,
        )
        .with_audit(Arc::clone(&audit));
        let engine = DispatchEngine::new(Arc::clone(&backend), config.catalog.strict_arguments)
            .with_audit(audit)
            .with_metrics(Arc::new(NoopMetrics));
        let transport = TransportManager::new(
            Arc::new(registry),
            Arc::new(engine),
            TransportLimits::from_config(&config.server.sessions),
        );
        let health = HealthMonitor::new(backend, &config.health);
        info!(
            tools = catalog.tools().len(),
            default_package = catalog.default_package(),
            "tool catalog loaded"
        );
        Ok(Self {
            config,
            transport: Arc::new(transport),
            health: Arc::new(health),
            notices,
        })
    }

    /// Returns the transport manager.
    #[must_use]
    pub const fn transport(&self) -> &Arc<TransportManager> {
        &self.transport
    }

    /// Returns the health monitor.
    #[must_use]
    pub const fn health(&self) -> &Arc<HealthMonitor> {
        &self.health
    }

    /// Builds the HTTP router: SSE, messages, REST facade, and health.
    #[must_use]
    pub fn router(&self) -> Router {
        let state = Arc::new(ServerState {
            transport: Arc::clone(&self.transport),
            health: Arc::clone(&self.health),
        });
        let rest_state = Arc::new(RestState {
            registry: Arc::clone(self.transport.registry()),
            engine: Arc::clone(self.transport.engine()),
        });
        Router::new()
            .route("/sse", get(handle_sse))
            .route(MESSAGES_PATH, post(handle_message))
            .route("/health", get(handle_readiness))
            .route("/health/live", get(handle_liveness))
            .with_state(state)
            .merge(rest::router(rest_state))
            .layer(DefaultBodyLimit::max(self.config.server.max_body_bytes))
    }

    /// Serves until ctrl-c, then drains every session.
    ///
    /// # Errors
    ///
    /// Returns [`McpServerError`] when the transport fails.
    pub async fn serve(self) -> Result<(), McpServerError> {
        self.serve_with_shutdown(async {
            if tokio::signal::ctrl_c().await.is_err() {
                warn!("ctrl-c handler unavailable; serving until the process exits");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Serves until `shutdown` resolves, then drains every session.
    ///
    /// # Errors
    ///
    /// Returns [`McpServerError`] when the transport fails.
    pub async fn serve_with_shutdown(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), McpServerError> {
        let router = self.router();
        let Self {
            config,
            transport,
            health,
            notices,
        } = self;
        let background = spawn_background(&config, &transport, &health, notices);
        let outcome = match config.server.transport {
            ServerTransport::Sse => {
                serve_sse(config.server.bind_address(), router, &transport, &health, shutdown)
                    .await
            }
            ServerTransport::Stdio => {
                let max_body_bytes = config.server.max_body_bytes;
                tokio::select! {
                    result = serve_stdio(Arc::clone(&transport), max_body_bytes) => result,
                    () = shutdown => {
                        health.begin_shutdown();
                        transport.shutdown().await;
                        Ok(())
                    }
                }
            }
        };
        for task in background {
            task.abort();
        }
        info!("server stopped");
        outcome
    }
}

/// Builds the configured audit sink.
fn build_audit_sink(config: &ServerAuditConfig) -> Result<Arc<dyn AuditSink>, McpServerError> {
    if !config.enabled {
        return Ok(Arc::new(NoopAuditSink));
    }
    match &config.path {
        Some(path) => {
            let sink = FileAuditSink::new(Path::new(path))
                .map_err(|err| McpServerError::Init(format!("audit log: {err}")))?;
            Ok(Arc::new(sink))
        }
        None => Ok(Arc::new(StderrAuditSink)),
    }
}

// ============================================================================
// SECTION: Background Tasks
// ============================================================================

/// Starts the idle sweeper, notice handler, heartbeat, and health prober.
fn spawn_background(
    config: &IncidentGateConfig,
    transport: &Arc<TransportManager>,
    health: &Arc<HealthMonitor>,
    mut notices: mpsc::UnboundedReceiver<SessionNotice>,
) -> Vec<JoinHandle<()>> {
    let sessions = &config.server.sessions;
    let mut tasks = Vec::new();

    let registry = Arc::clone(transport.registry());
    let sweep_every = Duration::from_millis(sessions.sweep_interval_ms);
    tasks.push(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_every);
        loop {
            ticker.tick().await;
            registry.sweep_idle(std::time::Instant::now());
        }
    }));

    let manager = Arc::clone(transport);
    tasks.push(tokio::spawn(async move {
        while let Some(notice) = notices.recv().await {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.handle_notice(notice).await });
        }
    }));

    if sessions.heartbeat_interval_ms > 0 {
        let manager = Arc::clone(transport);
        let every = Duration::from_millis(sessions.heartbeat_interval_ms);
        tasks.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                manager.broadcast(&OutboundFrame::event(
                    EventType::Heartbeat,
                    json!({ "timestamp_ms": unix_millis() }),
                ));
            }
        }));
    }

    if config.health.probe_interval_ms > 0 {
        let manager = Arc::clone(transport);
        let health = Arc::clone(health);
        let every = Duration::from_millis(config.health.probe_interval_ms);
        tasks.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                if let Some(change) = health.check_reachability().await {
                    info!(reachable = change.reachable, "backend reachability changed");
                    let detail = serde_json::to_value(change).unwrap_or_default();
                    manager.broadcast(&OutboundFrame::event(
                        EventType::BackendReachabilityChanged,
                        detail,
                    ));
                }
            }
        }));
    }
    tasks
}

/// Returns wall-clock milliseconds since the Unix epoch.
fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
}

// ============================================================================
// SECTION: HTTP Transport
// ============================================================================

/// Binds the listener and serves until shutdown.
async fn serve_sse(
    bind: &str,
    router: Router,
    transport: &Arc<TransportManager>,
    health: &Arc<HealthMonitor>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), McpServerError> {
    let addr: SocketAddr =
        bind.parse().map_err(|_| McpServerError::Config("invalid bind address".to_string()))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|err| McpServerError::Transport(format!("bind {addr} failed: {err}")))?;
    info!(%addr, "listening for sse connections");
    let transport = Arc::clone(transport);
    let health = Arc::clone(health);
    axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async move {
            shutdown.await;
            info!("shutdown requested; draining sessions");
            health.begin_shutdown();
            transport.shutdown().await;
        })
        .await
        .map_err(|err| McpServerError::Transport(format!("http server failed: {err}")))
}

/// Shared state for HTTP handlers.
struct ServerState {
    /// Connection and session owner.
    transport: Arc<TransportManager>,
    /// Backend reachability tracker.
    health: Arc<HealthMonitor>,
}

/// Caller facts taken from an HTTP request.
#[derive(Debug, Clone, Default)]
pub struct HttpOrigin {
    /// Peer address when the listener records it.
    peer_ip: Option<IpAddr>,
    /// Raw identity header value.
    identity: Option<String>,
}

impl HttpOrigin {
    /// Builds the caller context for `transport`.
    #[must_use]
    pub fn caller(&self, transport: TransportKind) -> CallerContext {
        CallerContext::http(transport, self.peer_ip, self.identity.as_deref())
    }
}

impl<S> FromRequestParts<S> for HttpOrigin
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer_ip = parts.extensions.get::<ConnectInfo<SocketAddr>>().map(|info| info.0.ip());
        let identity = parts
            .headers
            .get(CALLER_IDENTITY_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        Ok(Self {
            peer_ip,
            identity,
        })
    }
}

/// Query parameters for `GET /sse`.
#[derive(Debug, Deserialize)]
struct SseParams {
    /// Requested package.
    #[serde(default)]
    package: Option<String>,
}

/// Query parameters for `POST /messages`.
#[derive(Debug, Deserialize)]
struct MessageParams {
    /// Session the frame belongs to.
    session_id: String,
}

/// `GET /sse`: opens a session and streams its frames.
async fn handle_sse(
    State(state): State<Arc<ServerState>>,
    origin: HttpOrigin,
    Query(params): Query<SseParams>,
) -> Response {
    let caller = origin.caller(TransportKind::Sse);
    match state.transport.connect(&caller, params.package.as_deref()) {
        Ok(connection) => {
            let endpoint = Event::default()
                .event("endpoint")
                .data(format!("{MESSAGES_PATH}?session_id={}", connection.session_id));
            let stream = SessionStream {
                endpoint: Some(endpoint),
                receiver: connection.receiver,
                guard: DisconnectGuard {
                    transport: Arc::clone(&state.transport),
                    session_id: connection.session_id,
                },
            };
            Sse::new(stream).keep_alive(KeepAlive::default()).into_response()
        }
        Err(err) => {
            let status = match &err {
                ConnectError::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
                ConnectError::Rejected(SessionError::PackageDenied {
                    ..
                }) => StatusCode::FORBIDDEN,
                ConnectError::Rejected(_) => StatusCode::BAD_REQUEST,
            };
            error_response(status, "handshake_rejected", &err.to_string())
        }
    }
}

/// `POST /messages`: submits a frame to an open session.
async fn handle_message(
    State(state): State<Arc<ServerState>>,
    Query(params): Query<MessageParams>,
    body: Bytes,
) -> Response {
    let frame = match serde_json::from_slice::<InboundFrame>(&body) {
        Ok(frame) => frame,
        Err(err) => {
            let err = SubmitError::Malformed(err.to_string());
            return error_response(submit_status(&err), err.code(), &err.to_string());
        }
    };
    match state.transport.submit(&params.session_id, frame) {
        Ok(ack) => (StatusCode::ACCEPTED, Json(ack)).into_response(),
        Err(err) => error_response(submit_status(&err), err.code(), &err.to_string()),
    }
}

/// `GET /health`: readiness with a live backend probe.
async fn handle_readiness(State(state): State<Arc<ServerState>>) -> Response {
    let report = state.health.readiness(state.transport.registry().active_count()).await;
    let status = match report.status {
        HealthStatus::Down => StatusCode::SERVICE_UNAVAILABLE,
        HealthStatus::Ok | HealthStatus::Degraded => StatusCode::OK,
    };
    (status, Json(report)).into_response()
}

/// `GET /health/live`: process liveness.
async fn handle_liveness() -> Response {
    (StatusCode::OK, Json(json!({ "status": HealthStatus::Ok }))).into_response()
}

/// Maps a submission error to its HTTP status.
const fn submit_status(err: &SubmitError) -> StatusCode {
    match err {
        SubmitError::UnknownSession(_) => StatusCode::NOT_FOUND,
        SubmitError::Draining | SubmitError::DuplicateRequest(_) => StatusCode::CONFLICT,
        SubmitError::InflightLimit(_) | SubmitError::RequestIdLimit(_) => {
            StatusCode::TOO_MANY_REQUESTS
        }
        SubmitError::Malformed(_) => StatusCode::BAD_REQUEST,
        SubmitError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
    }
}

/// Builds a JSON error body.
fn error_response(status: StatusCode, code: &str, message: &str) -> Response {
    (status, Json(json!({ "error": { "code": code, "message": message } }))).into_response()
}

/// Converts an outbound frame to an SSE event.
fn frame_event(frame: &OutboundFrame) -> Event {
    Event::default().event(frame.sse_event_name()).json_data(frame).unwrap_or_else(|err| {
        warn!(error = %err, "frame serialization failed");
        Event::default().event("error").data("frame serialization failed")
    })
}

/// SSE body: the endpoint event, then every queued frame.
struct SessionStream {
    /// Endpoint event sent first.
    endpoint: Option<Event>,
    /// Connection send queue.
    receiver: mpsc::Receiver<OutboundFrame>,
    /// Disconnects the session when the client goes away.
    #[expect(dead_code, reason = "held only for its Drop side effect")]
    guard: DisconnectGuard,
}

impl Stream for SessionStream {
    type Item = Result<Event, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if let Some(endpoint) = self.endpoint.take() {
            return Poll::Ready(Some(Ok(endpoint)));
        }
        self.receiver.poll_recv(cx).map(|frame| frame.map(|frame| Ok(frame_event(&frame))))
    }
}

/// Treats a dropped SSE body as abrupt connection loss.
struct DisconnectGuard {
    /// Transport that owns the connection.
    transport: Arc<TransportManager>,
    /// Connection session.
    session_id: String,
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        debug!(session_id = %self.session_id, "sse stream ended");
        self.transport.disconnect(&self.session_id);
    }
}

// ============================================================================
// SECTION: Stdio Transport
// ============================================================================

/// Serves one session over stdin/stdout.
async fn serve_stdio(
    transport: Arc<TransportManager>,
    max_body_bytes: usize,
) -> Result<(), McpServerError> {
    let reader = BufReader::new(tokio::io::stdin());
    run_stdio(transport, reader, tokio::io::stdout(), max_body_bytes).await
}

/// Runs the stdio protocol over arbitrary streams.
///
/// The first frame must be a handshake. EOF is an abrupt disconnect; a
/// `close` frame drains the session and returns once the queue is flushed.
/// A server-side drain (idle timeout or shutdown) also returns once the
/// queue is flushed, without waiting for stdin to close.
pub(crate) async fn run_stdio<R, W>(
    transport: Arc<TransportManager>,
    mut reader: R,
    mut writer: W,
    max_body_bytes: usize,
) -> Result<(), McpServerError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let requested_package = match read_framed(&mut reader, max_body_bytes).await? {
        Frame::Payload(bytes) => match serde_json::from_slice::<InboundFrame>(&bytes) {
            Ok(InboundFrame::Handshake {
                requested_package,
            }) => requested_package,
            _ => {
                return Err(McpServerError::Transport("first frame must be handshake".to_string()));
            }
        },
        Frame::Oversized(_) | Frame::Closed => {
            return Err(McpServerError::Transport("stdio closed before handshake".to_string()));
        }
    };
    let connection = match transport.connect(&CallerContext::stdio(), requested_package.as_deref())
    {
        Ok(connection) => connection,
        Err(err) => {
            let frame = OutboundFrame::event(
                EventType::RequestRejected,
                json!({ "reason": err.to_string(), "kind": "handshake_rejected" }),
            );
            write_frame(&mut writer, &frame).await?;
            return Err(McpServerError::Transport(err.to_string()));
        }
    };
    let session_id = connection.session_id;
    let mut receiver = connection.receiver;
    let mut writer_task = tokio::spawn(async move {
        while let Some(frame) = receiver.recv().await {
            if let Err(err) = write_frame(&mut writer, &frame).await {
                warn!(error = %err, "stdio write failed");
                break;
            }
        }
    });

    loop {
        let read = tokio::select! {
            read = read_framed(&mut reader, max_body_bytes) => read,
            joined = &mut writer_task => {
                debug!(session_id = %session_id, "stdio session released by server");
                transport.disconnect(&session_id);
                return joined
                    .map_err(|err| McpServerError::Transport(format!("stdio writer: {err}")));
            }
        };
        let frame = match read {
            Ok(Frame::Payload(bytes)) => serde_json::from_slice::<InboundFrame>(&bytes)
                .map_err(|err| SubmitError::Malformed(err.to_string())),
            Ok(Frame::Oversized(len)) => {
                debug!(len, "oversized stdio frame skipped");
                Err(SubmitError::PayloadTooLarge(max_body_bytes))
            }
            Ok(Frame::Closed) => {
                transport.disconnect(&session_id);
                break;
            }
            Err(err) => {
                transport.disconnect(&session_id);
                writer_task.abort();
                return Err(err);
            }
        };
        let closing = matches!(frame, Ok(InboundFrame::Close));
        let request_id = match &frame {
            Ok(InboundFrame::ToolCall {
                request_id,
                ..
            }) => request_id.clone(),
            Ok(InboundFrame::ListTools {
                request_id,
            }) => request_id.clone(),
            _ => None,
        };
        let outcome = frame.and_then(|frame| transport.submit(&session_id, frame));
        if let Err(err) = outcome {
            let detail = json!({
                "request_id": request_id,
                "reason": err.to_string(),
                "kind": err.code(),
            });
            let rejected = OutboundFrame::event(EventType::RequestRejected, detail);
            transport.post_event(&session_id, rejected);
        } else if closing {
            break;
        }
    }
    writer_task.await.map_err(|err| McpServerError::Transport(format!("stdio writer: {err}")))
}

/// Serializes and writes one frame.
async fn write_frame<W>(writer: &mut W, frame: &OutboundFrame) -> Result<(), McpServerError>
where
    W: AsyncWrite + Unpin,
{
    let payload = serde_json::to_vec(frame)
        .map_err(|_| McpServerError::Transport("frame serialization failed".to_string()))?;
    write_framed(writer, &payload).await
}

// ============================================================================
// SECTION: Framing Helpers
// ============================================================================

/// Outcome of reading one framed message.
#[derive(Debug, PartialEq, Eq)]
enum Frame {
    /// A complete payload.
    Payload(Vec<u8>),
    /// A payload over the limit; its bytes were skipped.
    Oversized(usize),
    /// The stream ended between frames.
    Closed,
}

/// Reads one Content-Length framed payload.
async fn read_framed<R>(reader: &mut R, max_body_bytes: usize) -> Result<Frame, McpServerError>
where
    R: AsyncBufRead + Unpin,
{
    let mut content_length: Option<usize> = None;
    let mut line = String::new();
    let mut saw_header = false;
    loop {
        line.clear();
        let bytes = reader
            .read_line(&mut line)
            .await
            .map_err(|_| McpServerError::Transport("stdio read failed".to_string()))?;
        if bytes == 0 {
            if saw_header {
                return Err(McpServerError::Transport("stdio closed mid-frame".to_string()));
            }
            return Ok(Frame::Closed);
        }
        if line.trim().is_empty() {
            if saw_header {
                break;
            }
            continue;
        }
        saw_header = true;
        if let Some(value) = line.strip_prefix("Content-Length:") {
            let parsed = value
                .trim()
                .parse::<usize>()
                .map_err(|_| McpServerError::Transport("invalid content length".to_string()))?;
            content_length = Some(parsed);
        }
    }
    let len = content_length
        .ok_or_else(|| McpServerError::Transport("missing content length".to_string()))?;
    if len > max_body_bytes {
        let skip = u64::try_from(len).unwrap_or(u64::MAX);
        tokio::io::copy(&mut reader.take(skip), &mut tokio::io::sink())
            .await
            .map_err(|_| McpServerError::Transport("stdio read failed".to_string()))?;
        return Ok(Frame::Oversized(len));
    }
    let mut buf = vec![0u8; len];
    reader
        .read_exact(&mut buf)
        .await
        .map_err(|_| McpServerError::Transport("stdio read failed".to_string()))?;
    Ok(Frame::Payload(buf))
}

/// Writes one Content-Length framed payload.
async fn write_framed<W>(writer: &mut W, payload: &[u8]) -> Result<(), McpServerError>
where
    W: AsyncWrite + Unpin,
{
    let header = format!("Content-Length: {}\r\n\r\n", payload.len());
    writer
        .write_all(header.as_bytes())
        .await
        .map_err(|_| McpServerError::Transport("stdio write failed".to_string()))?;
    writer
        .write_all(payload)
        .await
        .map_err(|_| McpServerError::Transport("stdio write failed".to_string()))?;
    writer.flush().await.map_err(|_| McpServerError::Transport("stdio write failed".to_string()))
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// MCP server errors.
#[derive(Debug, thiserror::Error)]
pub enum McpServerError {
    /// Configuration errors.
    #[error("config error: {0}")]
    Config(String),
    /// Initialization errors.
    #[error("init error: {0}")]
    Init(String),
    /// Tool catalog errors.
    #[error("catalog error: {0}")]
    Catalog(String),
    /// Transport errors.
    #[error("transport error: {0}")]
    Transport(String),
}

// ============================================================================
// SECTION: Tests
// ============================================================================
