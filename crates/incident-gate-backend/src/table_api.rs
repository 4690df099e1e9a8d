// crates/incident-gate-backend/src/table_api.rs
// ============================================================================
// Module: Table API Backend
// Description: RecordBackend implementation over a ServiceNow-style Table API.
// Purpose: Issue authenticated, time-bounded, retried record requests.
// Dependencies: reqwest, serde_json, tokio, tracing, url
// ============================================================================

//! ## Overview
//! Requests target `{instance_url}/api/now/table/{table}`. Identifiers that
//! are not 32-hex `sys_id` values are treated as ticket numbers and looked up
//! with `sysparm_query=number=<id>` before record-level calls. Every request
//! carries the configured timeout; transient failures are retried under the
//! configured [`RetryPolicy`], except creates without an idempotency key.
//!
//! Security posture: identifiers are validated before they are embedded in
//! URLs or encoded queries; responses are parsed defensively.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use async_trait::async_trait;
use incident_gate_config::BackendConfig;
use reqwest::Client;
use reqwest::RequestBuilder;
use reqwest::Response;
use reqwest::StatusCode;
use reqwest::header::RETRY_AFTER;
use serde_json::Value;
use serde_json::json;
use tracing::debug;
use tracing::warn;
use url::Url;

use crate::auth::Credentials;
use crate::backend::RecordBackend;
use crate::error::BackendError;
use crate::error::classify_status;
use crate::error::parse_retry_after;
use crate::operation::BackendOperation;
use crate::record::ListQuery;
use crate::record::MAX_LIST_LIMIT;
use crate::record::Record;
use crate::record::RecordFields;
use crate::record::Resolution;
use crate::record::is_sys_id;
use crate::retry::RetryPolicy;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Header forwarding the caller's idempotency key on create.
const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";
/// Workflow state code for a resolved incident.
const RESOLVED_STATE: &str = "6";
/// Maximum identifier length accepted for lookups.
const MAX_IDENTIFIER_LENGTH: usize = 64;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Table API record backend.
///
/// # Invariants
/// - `table_url` is `{instance_url}/api/now/table/{table}`.
/// - The client never follows redirects.
#[derive(Debug)]
pub struct TableApiBackend {
    /// HTTP client with timeout and user agent applied.
    client: Client,
    /// Table endpoint.
    table_url: Url,
    /// Request credentials.
    credentials: Credentials,
    /// Retry policy for transient failures.
    retry: RetryPolicy,
    /// Maximum response body size.
    max_response_bytes: usize,
}

/// Resolved record key plus the identifier reported to callers.
struct RecordKey {
    /// Backend primary key.
    sys_id: String,
    /// Ticket number when known, otherwise the caller's identifier.
    identifier: String,
}

impl TableApiBackend {
    /// Builds a backend from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] when the URL, credentials, or HTTP client are
    /// invalid.
    pub fn from_config(config: &BackendConfig) -> Result<Self, BackendError> {
        let mut instance_url = Url::parse(config.instance_url.trim())
            .map_err(|_| BackendError::InvalidArgument("invalid instance url".to_string()))?;
        if !instance_url.path().ends_with('/') {
            let path = format!("{}/", instance_url.path());
            instance_url.set_path(&path);
        }
        let table_url = instance_url
            .join(&format!("api/now/table/{}", config.table))
            .map_err(|_| BackendError::InvalidArgument("invalid table name".to_string()))?;
        let timeout = Duration::from_millis(config.timeout_ms);
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .user_agent(config.user_agent.clone())
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|err| BackendError::Unavailable(format!("http client build failed: {err}")))?;
        let credentials = Credentials::from_config(&config.auth, &instance_url)?;
        Ok(Self {
            client,
            table_url,
            credentials,
            retry: RetryPolicy::from_config(&config.retry),
            max_response_bytes: config.max_response_bytes,
        })
    }

    /// Returns the URL of one record.
    fn record_url(&self, sys_id: &str) -> Result<Url, BackendError> {
        let mut url = self.table_url.clone();
        url.path_segments_mut()
            .map_err(|_| BackendError::Unknown("instance url cannot carry a path".to_string()))?
            .push(sys_id);
        url.query_pairs_mut().append_pair("sysparm_display_value", "true");
        Ok(url)
    }

    /// Returns the list URL for a page request.
    fn list_url(&self, query: &ListQuery) -> Url {
        let mut url = self.table_url.clone();
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("sysparm_limit", &query.limit.clamp(1, MAX_LIST_LIMIT).to_string());
            if query.offset > 0 {
                pairs.append_pair("sysparm_offset", &query.offset.to_string());
            }
            pairs.append_pair("sysparm_display_value", "true");
            if let Some(filter) = query.query.as_deref().filter(|filter| !filter.is_empty()) {
                pairs.append_pair("sysparm_query", filter);
            }
        }
        url
    }

    /// Sends a request under the retry policy and returns the JSON body.
    async fn execute<F>(
        &self,
        operation: BackendOperation,
        retryable: bool,
        build: F,
    ) -> Result<Option<Value>, BackendError>
    where
        F: Fn(&Client) -> RequestBuilder + Send + Sync,
    {
        let policy = if retryable { self.retry } else { RetryPolicy::single_attempt() };
        let mut completed: u32 = 0;
        loop {
            completed = completed.saturating_add(1);
            match self.attempt(operation, &build).await {
                Ok(body) => return Ok(body),
                Err(err) if err.is_retryable() && policy.allows_another(completed) => {
                    let delay = policy.delay_after(completed, err.retry_after());
                    warn!(
                        operation = operation.as_str(),
                        attempt = completed,
                        error_kind = err.kind().as_str(),
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "retrying backend call"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Performs one attempt, refreshing OAuth credentials once on 401.
    async fn attempt<F>(
        &self,
        operation: BackendOperation,
        build: &F,
    ) -> Result<Option<Value>, BackendError>
    where
        F: Fn(&Client) -> RequestBuilder + Send + Sync,
    {
        let mut refreshed = false;
        loop {
            let request = self.credentials.apply(&self.client, build(&self.client)).await?;
            debug!(operation = operation.as_str(), "sending backend request");
            let mut response = request.send().await.map_err(transport_error)?;
            let status = response.status();
            if status == StatusCode::UNAUTHORIZED
                && !refreshed
                && self.credentials.invalidate().await
            {
                refreshed = true;
                continue;
            }
            if status.is_success() {
                if status == StatusCode::NO_CONTENT {
                    return Ok(None);
                }
                let bytes = read_response_limited(&mut response, self.max_response_bytes).await?;
                if bytes.is_empty() {
                    return Ok(None);
                }
                return serde_json::from_slice(&bytes).map(Some).map_err(|_| {
                    BackendError::Unknown("malformed backend response body".to_string())
                });
            }
            let retry_after = parse_retry_after(
                response.headers().get(RETRY_AFTER).and_then(|value| value.to_str().ok()),
            );
            let text = read_response_limited(&mut response, self.max_response_bytes)
                .await
                .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
                .unwrap_or_default();
            return Err(classify_status(status.as_u16(), &text, retry_after));
        }
    }

    /// Looks up a record by ticket number.
    async fn find_by_number(&self, number: &str) -> Result<Record, BackendError> {
        let query = ListQuery {
            limit: 1,
            offset: 0,
            query: Some(format!("number={number}")),
        };
        let url = self.list_url(&query);
        let body = self
            .execute(BackendOperation::Read, true, |client| client.get(url.clone()))
            .await?;
        records_from(body)?
            .into_iter()
            .next()
            .ok_or_else(|| BackendError::NotFound(format!("no record with number {number}")))
    }

    /// Resolves a caller identifier into a backend key.
    async fn resolve_key(&self, id: &str) -> Result<RecordKey, BackendError> {
        let id = validate_identifier(id)?;
        if is_sys_id(id) {
            return Ok(RecordKey {
                sys_id: id.to_ascii_lowercase(),
                identifier: id.to_string(),
            });
        }
        let record = self.find_by_number(id).await?;
        Ok(RecordKey {
            sys_id: record.sys_id,
            identifier: record.identifier,
        })
    }

    /// Sends a PATCH with `body` to the record behind `id`.
    async fn patch(
        &self,
        operation: BackendOperation,
        id: &str,
        body: Value,
    ) -> Result<Record, BackendError> {
        let key = self.resolve_key(id).await?;
        let url = self.record_url(&key.sys_id)?;
        let response = self
            .execute(operation, true, |client| client.patch(url.clone()).json(&body))
            .await?;
        record_from(response)
    }
}

#[async_trait]
impl RecordBackend for TableApiBackend {
    async fn list(&self, query: &ListQuery) -> Result<Vec<Record>, BackendError> {
        if let Some(filter) = &query.query {
            validate_query(filter)?;
        }
        let url = self.list_url(query);
        let body = self
            .execute(BackendOperation::List, true, |client| client.get(url.clone()))
            .await?;
        records_from(body)
    }

    async fn read(&self, id: &str) -> Result<Record, BackendError> {
        let id = validate_identifier(id)?;
        if !is_sys_id(id) {
            return self.find_by_number(id).await;
        }
        let url = self.record_url(&id.to_ascii_lowercase())?;
        let body = self
            .execute(BackendOperation::Read, true, |client| client.get(url.clone()))
            .await?;
        record_from(body)
    }

    async fn create(
        &self,
        fields: &RecordFields,
        idempotency_key: Option<&str>,
    ) -> Result<Record, BackendError> {
        if fields.short_description.as_deref().is_none_or(|text| text.trim().is_empty()) {
            return Err(BackendError::InvalidArgument("short_description required".to_string()));
        }
        let mut url = self.table_url.clone();
        url.query_pairs_mut().append_pair("sysparm_display_value", "true");
        let body = fields.to_table_body();
        let key = idempotency_key.map(str::to_string);
        let response = self
            .execute(BackendOperation::Create, key.is_some(), |client| {
                let request = client.post(url.clone()).json(&body);
                match &key {
                    Some(key) => request.header(IDEMPOTENCY_HEADER, key.as_str()),
                    None => request,
                }
            })
            .await?;
        record_from(response)
    }

    async fn update(&self, id: &str, fields: &RecordFields) -> Result<Record, BackendError> {
        if fields.is_empty() {
            return Err(BackendError::InvalidArgument("no fields to update".to_string()));
        }
        self.patch(BackendOperation::Update, id, fields.to_table_body()).await
    }

    async fn delete(&self, id: &str) -> Result<String, BackendError> {
        let key = self.resolve_key(id).await?;
        let url = self.record_url(&key.sys_id)?;
        self.execute(BackendOperation::Delete, true, |client| client.delete(url.clone())).await?;
        Ok(key.identifier)
    }

    async fn assign(&self, id: &str, assignee: &str) -> Result<Record, BackendError> {
        if assignee.trim().is_empty() {
            return Err(BackendError::InvalidArgument("assignee required".to_string()));
        }
        self.patch(BackendOperation::Assign, id, json!({ "assigned_to": assignee })).await
    }

    async fn resolve(&self, id: &str, resolution: &Resolution) -> Result<Record, BackendError> {
        let body = json!({
            "state": RESOLVED_STATE,
            "close_code": resolution.code,
            "close_notes": resolution.notes,
        });
        self.patch(BackendOperation::Resolve, id, body).await
    }

    async fn probe(&self) -> Result<(), BackendError> {
        let mut url = self.table_url.clone();
        url.query_pairs_mut()
            .append_pair("sysparm_limit", "1")
            .append_pair("sysparm_fields", "sys_id");
        self.execute(BackendOperation::List, false, |client| client.get(url.clone())).await?;
        Ok(())
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Maps transport failures into the taxonomy.
fn transport_error(err: reqwest::Error) -> BackendError {
    if err.is_timeout() {
        BackendError::Unavailable("backend request timed out".to_string())
    } else if err.is_connect() {
        BackendError::Unavailable("backend connection failed".to_string())
    } else if err.is_builder() {
        BackendError::Unknown("backend request could not be built".to_string())
    } else {
        BackendError::Unavailable(format!("backend transport error: {err}"))
    }
}

/// Reads a response body, failing once it exceeds `max_bytes`.
///
/// A declared `Content-Length` over the limit fails before any body bytes
/// are read; otherwise chunks are accumulated until the limit is crossed.
async fn read_response_limited(
    response: &mut Response,
    max_bytes: usize,
) -> Result<Vec<u8>, BackendError> {
    let max_bytes_u64 = u64::try_from(max_bytes)
        .map_err(|_| BackendError::Unknown("response size limit exceeds u64".to_string()))?;
    if let Some(expected) = response.content_length()
        && expected > max_bytes_u64
    {
        return Err(BackendError::Unknown("backend response exceeds size limit".to_string()));
    }
    let mut buf = Vec::new();
    while let Some(chunk) = response.chunk().await.map_err(transport_error)? {
        if buf.len().saturating_add(chunk.len()) > max_bytes {
            return Err(BackendError::Unknown("backend response exceeds size limit".to_string()));
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf)
}

/// Validates a caller identifier before it reaches a URL or encoded query.
fn validate_identifier(id: &str) -> Result<&str, BackendError> {
    let trimmed = id.trim();
    let valid = !trimmed.is_empty()
        && trimmed.len() <= MAX_IDENTIFIER_LENGTH
        && trimmed.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-');
    if valid {
        Ok(trimmed)
    } else {
        Err(BackendError::InvalidArgument("invalid incident identifier".to_string()))
    }
}

/// Rejects control characters in encoded queries.
fn validate_query(query: &str) -> Result<(), BackendError> {
    if query.chars().any(char::is_control) {
        return Err(BackendError::InvalidArgument("query contains control characters".to_string()));
    }
    Ok(())
}

/// Extracts the `result` member of a response body.
fn result_member(body: Option<Value>) -> Result<Value, BackendError> {
    match body {
        Some(Value::Object(mut object)) => object
            .remove("result")
            .ok_or_else(|| BackendError::Unknown("backend response missing result".to_string())),
        _ => Err(BackendError::Unknown("backend response missing result".to_string())),
    }
}

/// Parses a single-record response.
fn record_from(body: Option<Value>) -> Result<Record, BackendError> {
    match result_member(body)? {
        Value::Object(row) => Record::from_row(&row),
        _ => Err(BackendError::Unknown("backend result is not a record".to_string())),
    }
}

/// Parses a list response.
fn records_from(body: Option<Value>) -> Result<Vec<Record>, BackendError> {
    match result_member(body)? {
        Value::Array(rows) => rows
            .iter()
            .map(|row| {
                row.as_object().ok_or_else(|| {
                    BackendError::Unknown("backend result row is not an object".to_string())
                })
                .and_then(Record::from_row)
            })
            .collect(),
        _ => Err(BackendError::Unknown("backend result is not a list".to_string())),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
