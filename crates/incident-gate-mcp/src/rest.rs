// crates/incident-gate-mcp/src/rest.rs
// ============================================================================
// Module: REST Facade
// Description: Request/response record routes over the dispatch engine.
// Purpose: Serve clients that prefer plain HTTP to the streaming protocol.
// Dependencies: axum, incident-gate-backend, uuid
// ============================================================================

//! ## Overview
//! Each route maps to one backend operation. The facade resolves the package
//! from the `x-tool-package` header (or the default), picks the package's tool
//! bound to that operation, and dispatches through the same engine the
//! streaming transports use, so validation and error mapping are identical.
//! A package without a tool for the route's operation answers `403`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::Path;
use axum::extract::Query;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use incident_gate_backend::BackendOperation;
use incident_gate_backend::operation::INPUT_IDEMPOTENCY_KEY;
use incident_gate_backend::operation::INPUT_INCIDENT_ID;
use incident_gate_backend::operation::INPUT_LIMIT;
use incident_gate_backend::operation::INPUT_OFFSET;
use incident_gate_backend::operation::INPUT_QUERY;
use serde_json::Map;
use serde_json::Value;
use uuid::Uuid;

use crate::access::TransportKind;
use crate::dispatch::DispatchContext;
use crate::dispatch::DispatchEngine;
use crate::protocol::ErrorKind;
use crate::protocol::ResultStatus;
use crate::protocol::ToolCallRequest;
use crate::protocol::ToolCallResult;
use crate::server::HttpOrigin;
use crate::sessions::SessionError;
use crate::sessions::SessionRegistry;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Header naming the package for a REST request.
pub const TOOL_PACKAGE_HEADER: &str = "x-tool-package";
/// Header carrying a caller-chosen request identifier.
pub const REQUEST_ID_HEADER: &str = "x-request-id";
/// Header carrying an idempotency key for creates.
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";
/// Legacy name accepted for the list filter.
const QUERY_ALIAS: &str = "sysparm_query";

// ============================================================================
// SECTION: Router
// ============================================================================

/// Shared state for REST handlers.
pub struct RestState {
    /// Registry used for package grants.
    pub registry: Arc<SessionRegistry>,
    /// Dispatch engine shared with the streaming transports.
    pub engine: Arc<DispatchEngine>,
}

/// Builds the record routes.
pub fn router(state: Arc<RestState>) -> Router {
    Router::new()
        .route("/incidents", get(list_incidents).post(create_incident))
        .route(
            "/incidents/{id}",
            get(read_incident).patch(update_incident).delete(delete_incident),
        )
        .route("/incidents/{id}/assign", post(assign_incident))
        .route("/incidents/{id}/resolve", post(resolve_incident))
        .with_state(state)
}

// ============================================================================
// SECTION: Handlers
// ============================================================================

/// `GET /incidents`.
async fn list_incidents(
    State(state): State<Arc<RestState>>,
    origin: HttpOrigin,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let mut arguments = Map::new();
    for name in [INPUT_LIMIT, INPUT_OFFSET] {
        if let Some(raw) = params.get(name) {
            let value =
                raw.trim().parse::<i64>().map_or_else(|_| Value::from(raw.as_str()), Value::from);
            arguments.insert(name.to_string(), value);
        }
    }
    if let Some(query) = params.get(INPUT_QUERY).or_else(|| params.get(QUERY_ALIAS)) {
        arguments.insert(INPUT_QUERY.to_string(), Value::from(query.as_str()));
    }
    dispatch(&state, &origin, &headers, BackendOperation::List, Value::Object(arguments)).await
}

/// `POST /incidents`.
async fn create_incident(
    State(state): State<Arc<RestState>>,
    origin: HttpOrigin,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let mut arguments = match body_object(&body) {
        Ok(arguments) => arguments,
        Err(response) => return response,
    };
    if let Some(key) = header_value(&headers, IDEMPOTENCY_KEY_HEADER) {
        arguments.entry(INPUT_IDEMPOTENCY_KEY).or_insert_with(|| Value::from(key));
    }
    dispatch(&state, &origin, &headers, BackendOperation::Create, Value::Object(arguments)).await
}

/// `GET /incidents/{id}`.
async fn read_incident(
    State(state): State<Arc<RestState>>,
    origin: HttpOrigin,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    let arguments = with_incident_id(Map::new(), id);
    dispatch(&state, &origin, &headers, BackendOperation::Read, arguments).await
}

/// `PATCH /incidents/{id}`.
async fn update_incident(
    State(state): State<Arc<RestState>>,
    origin: HttpOrigin,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Bytes,
) -> Response {
    match body_object(&body) {
        Ok(arguments) => {
            let arguments = with_incident_id(arguments, id);
            dispatch(&state, &origin, &headers, BackendOperation::Update, arguments).await
        }
        Err(response) => response,
    }
}

/// `DELETE /incidents/{id}`.
async fn delete_incident(
    State(state): State<Arc<RestState>>,
    origin: HttpOrigin,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    let arguments = with_incident_id(Map::new(), id);
    dispatch(&state, &origin, &headers, BackendOperation::Delete, arguments).await
}

/// `POST /incidents/{id}/assign`.
async fn assign_incident(
    State(state): State<Arc<RestState>>,
    origin: HttpOrigin,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Bytes,
) -> Response {
    match body_object(&body) {
        Ok(arguments) => {
            let arguments = with_incident_id(arguments, id);
            dispatch(&state, &origin, &headers, BackendOperation::Assign, arguments).await
        }
        Err(response) => response,
    }
}

/// `POST /incidents/{id}/resolve`.
async fn resolve_incident(
    State(state): State<Arc<RestState>>,
    origin: HttpOrigin,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Bytes,
) -> Response {
    match body_object(&body) {
        Ok(arguments) => {
            let arguments = with_incident_id(arguments, id);
            dispatch(&state, &origin, &headers, BackendOperation::Resolve, arguments).await
        }
        Err(response) => response,
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the package and tool for `operation` and dispatches the call.
async fn dispatch(
    state: &RestState,
    origin: &HttpOrigin,
    headers: &HeaderMap,
    operation: BackendOperation,
    arguments: Value,
) -> Response {
    let request_id = header_value(headers, REQUEST_ID_HEADER)
        .map_or_else(|| Uuid::new_v4().to_string(), str::to_string);
    let caller = origin.caller(TransportKind::Rest);
    let package =
        match state.registry.grant_package(&caller, header_value(headers, TOOL_PACKAGE_HEADER)) {
            Ok(package) => package,
            Err(err) => {
                let kind = match err {
                    SessionError::PackageDenied {
                        ..
                    } => ErrorKind::Forbidden,
                    _ => ErrorKind::InvalidArgument,
                };
                let result = ToolCallResult::failure(request_id, kind, err.to_string());
                return respond(operation, result);
            }
        };
    let Some(tool) = package.tool_for_operation(operation) else {
        let message = format!(
            "operation {} is not available in package {}",
            operation.as_str(),
            package.name()
        );
        let result = ToolCallResult::failure(request_id, ErrorKind::Forbidden, message);
        return respond(operation, result);
    };
    let request = ToolCallRequest {
        request_id,
        tool_name: tool.name.clone(),
        arguments,
    };
    let context = DispatchContext {
        session_id: None,
        package: Arc::clone(&package),
        caller,
    };
    let result = state.engine.dispatch(&context, request).await;
    respond(operation, result)
}

/// Converts a result to an HTTP response.
fn respond(operation: BackendOperation, result: ToolCallResult) -> Response {
    let status = match (result.status, result.error_kind()) {
        (ResultStatus::Success, _) if operation == BackendOperation::Create => StatusCode::CREATED,
        (ResultStatus::Success, _) | (ResultStatus::Error, None) => StatusCode::OK,
        (ResultStatus::Error, Some(kind)) => status_for_kind(kind),
    };
    (status, Json(result)).into_response()
}

/// Maps an error kind to its HTTP status.
#[must_use]
pub const fn status_for_kind(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::InvalidArgument => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        ErrorKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Unauthorized | ErrorKind::Unknown => StatusCode::BAD_GATEWAY,
    }
}

/// Parses a request body as a JSON object; empty bodies become `{}`.
fn body_object(body: &Bytes) -> Result<Map<String, Value>, Response> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Map::new());
    }
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(object)) => Ok(object),
        Ok(_) => Err(bad_body("body must be a JSON object")),
        Err(_) => Err(bad_body("body must be valid JSON")),
    }
}

/// Builds a `400` for an unreadable body.
fn bad_body(message: &str) -> Response {
    let result =
        ToolCallResult::failure(Uuid::new_v4().to_string(), ErrorKind::InvalidArgument, message);
    (StatusCode::BAD_REQUEST, Json(result)).into_response()
}

/// Sets the path identifier on the argument object.
fn with_incident_id(mut arguments: Map<String, Value>, id: String) -> Value {
    arguments.insert(INPUT_INCIDENT_ID.to_string(), Value::String(id));
    Value::Object(arguments)
}

/// Returns a trimmed, non-empty header value.
fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

// ============================================================================
// SECTION: Tests
// ============================================================================
