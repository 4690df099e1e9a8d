// crates/incident-gate-mcp/src/dispatch.rs
// ============================================================================
// Module: Dispatch Engine
// Description: Tool authorization, argument validation, and backend calls.
// Purpose: Turn a tool call into exactly one normalized result.
// Dependencies: incident-gate-backend, serde_json, tracing
// ============================================================================

//! ## Overview
//! [`DispatchEngine::dispatch`] authorizes the tool against the session's
//! resolved package, validates arguments against the tool's ordered schema
//! into tagged [`ArgumentValue`]s, builds a typed [`BackendCall`], and maps
//! the outcome into a [`ToolCallResult`]. Validation failures never reach the
//! backend. The engine holds no locks; the only suspension point is the
//! backend call itself.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use incident_gate_backend::BackendCall;
use incident_gate_backend::BackendOperation;
use incident_gate_backend::InputType;
use incident_gate_backend::ListQuery;
use incident_gate_backend::RecordBackend;
use incident_gate_backend::RecordFields;
use incident_gate_backend::Resolution;
use incident_gate_backend::operation::INPUT_ASSIGNEE;
use incident_gate_backend::operation::INPUT_CALLER;
use incident_gate_backend::operation::INPUT_CATEGORY;
use incident_gate_backend::operation::INPUT_DESCRIPTION;
use incident_gate_backend::operation::INPUT_IDEMPOTENCY_KEY;
use incident_gate_backend::operation::INPUT_IMPACT;
use incident_gate_backend::operation::INPUT_INCIDENT_ID;
use incident_gate_backend::operation::INPUT_LIMIT;
use incident_gate_backend::operation::INPUT_OFFSET;
use incident_gate_backend::operation::INPUT_PRIORITY;
use incident_gate_backend::operation::INPUT_QUERY;
use incident_gate_backend::operation::INPUT_RESOLUTION_CODE;
use incident_gate_backend::operation::INPUT_RESOLUTION_NOTES;
use incident_gate_backend::operation::INPUT_SHORT_DESCRIPTION;
use incident_gate_backend::operation::INPUT_STATE;
use incident_gate_backend::operation::INPUT_URGENCY;
use incident_gate_backend::record::DEFAULT_LIST_LIMIT;
use serde_json::Map;
use serde_json::Value;
use serde_json::json;
use tracing::debug;
use tracing::warn;

use crate::access::CallerContext;
use crate::audit::AuditSink;
use crate::audit::NoopAuditSink;
use crate::audit::ToolCallAuditEvent;
use crate::audit::ToolCallAuditParams;
use crate::catalog::ResolvedPackage;
use crate::catalog::ToolDefinition;
use crate::protocol::ErrorKind;
use crate::protocol::ToolCallRequest;
use crate::protocol::ToolCallResult;
use crate::telemetry::McpMetricEvent;
use crate::telemetry::McpMetrics;
use crate::telemetry::McpOutcome;
use crate::telemetry::NoopMetrics;

// ============================================================================
// SECTION: Arguments
// ============================================================================

/// Argument value after schema validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgumentValue {
    /// String argument.
    String(String),
    /// Integer argument.
    Integer(i64),
    /// Boolean argument.
    Boolean(bool),
}

/// Arguments that passed schema validation, keyed by parameter name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidatedArguments {
    /// Present arguments.
    values: BTreeMap<String, ArgumentValue>,
}

impl ValidatedArguments {
    /// Returns the argument named `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ArgumentValue> {
        self.values.get(name)
    }

    /// Removes and returns a string argument.
    fn take_string(&mut self, name: &str) -> Option<String> {
        match self.values.remove(name) {
            Some(ArgumentValue::String(value)) => Some(value),
            _ => None,
        }
    }

    /// Removes and returns a required string argument.
    fn require_string(&mut self, name: &str) -> Result<String, String> {
        self.take_string(name).ok_or_else(|| format!("{name} required"))
    }

    /// Returns an integer argument.
    fn integer(&self, name: &str) -> Option<i64> {
        match self.values.get(name) {
            Some(ArgumentValue::Integer(value)) => Some(*value),
            _ => None,
        }
    }
}

/// Validates raw JSON arguments against a tool's ordered schema.
///
/// # Errors
///
/// Returns the caller-facing message when arguments are not an object, a
/// required argument is missing, null, or blank, a value has the wrong type,
/// or (when `strict`) an undeclared argument is present.
pub fn validate_arguments(
    tool: &ToolDefinition,
    arguments: &Value,
    strict: bool,
) -> Result<ValidatedArguments, String> {
    let empty = Map::new();
    let object = match arguments {
        Value::Object(object) => object,
        Value::Null => &empty,
        _ => return Err("arguments must be an object".to_string()),
    };
    let mut values = BTreeMap::new();
    for parameter in &tool.parameters {
        let raw = object.get(&parameter.name).filter(|value| !value.is_null());
        let Some(raw) = raw else {
            if parameter.required {
                return Err(format!("{} required", parameter.name));
            }
            continue;
        };
        let value = match (parameter.kind, raw) {
            (InputType::String, Value::String(text)) => {
                if parameter.required && text.trim().is_empty() {
                    return Err(format!("{} required", parameter.name));
                }
                ArgumentValue::String(text.clone())
            }
            (InputType::Integer, Value::Number(number)) => match number.as_i64() {
                Some(integer) => ArgumentValue::Integer(integer),
                None => return Err(format!("{} must be integer", parameter.name)),
            },
            (InputType::Boolean, Value::Bool(flag)) => ArgumentValue::Boolean(*flag),
            (kind, _) => return Err(format!("{} must be {kind}", parameter.name)),
        };
        values.insert(parameter.name.clone(), value);
    }
    if strict
        && let Some(unknown) = object.keys().find(|key| tool.parameter(key).is_none())
    {
        return Err(format!("unknown argument {unknown}"));
    }
    Ok(ValidatedArguments {
        values,
    })
}

/// Translates validated arguments into a typed backend call.
///
/// # Errors
///
/// Returns the caller-facing message when values are out of range.
pub fn build_call(
    operation: BackendOperation,
    mut arguments: ValidatedArguments,
) -> Result<BackendCall, String> {
    let call = match operation {
        BackendOperation::List => {
            let limit = match arguments.integer(INPUT_LIMIT) {
                None => DEFAULT_LIST_LIMIT,
                Some(value) if value < 1 => return Err(format!("{INPUT_LIMIT} must be positive")),
                Some(value) => u32::try_from(value).unwrap_or(u32::MAX),
            };
            let offset = match arguments.integer(INPUT_OFFSET) {
                None => 0,
                Some(value) if value < 0 => {
                    return Err(format!("{INPUT_OFFSET} must not be negative"));
                }
                Some(value) => u32::try_from(value).unwrap_or(u32::MAX),
            };
            BackendCall::List(ListQuery {
                limit,
                offset,
                query: arguments.take_string(INPUT_QUERY).filter(|query| !query.trim().is_empty()),
            })
        }
        BackendOperation::Read => BackendCall::Read {
            id: arguments.require_string(INPUT_INCIDENT_ID)?,
        },
        BackendOperation::Create => {
            let idempotency_key = arguments.take_string(INPUT_IDEMPOTENCY_KEY);
            BackendCall::Create {
                fields: record_fields(&mut arguments),
                idempotency_key,
            }
        }
        BackendOperation::Update => {
            let id = arguments.require_string(INPUT_INCIDENT_ID)?;
            let fields = record_fields(&mut arguments);
            if fields.is_empty() {
                return Err("no fields to update".to_string());
            }
            BackendCall::Update {
                id,
                fields,
            }
        }
        BackendOperation::Delete => BackendCall::Delete {
            id: arguments.require_string(INPUT_INCIDENT_ID)?,
        },
        BackendOperation::Assign => BackendCall::Assign {
            id: arguments.require_string(INPUT_INCIDENT_ID)?,
            assignee: arguments.require_string(INPUT_ASSIGNEE)?,
        },
        BackendOperation::Resolve => BackendCall::Resolve {
            id: arguments.require_string(INPUT_INCIDENT_ID)?,
            resolution: Resolution {
                code: arguments.require_string(INPUT_RESOLUTION_CODE)?,
                notes: arguments.require_string(INPUT_RESOLUTION_NOTES)?,
            },
        },
    };
    Ok(call)
}

/// Collects record field arguments.
fn record_fields(arguments: &mut ValidatedArguments) -> RecordFields {
    RecordFields {
        short_description: arguments.take_string(INPUT_SHORT_DESCRIPTION),
        description: arguments.take_string(INPUT_DESCRIPTION),
        priority: arguments.take_string(INPUT_PRIORITY),
        urgency: arguments.take_string(INPUT_URGENCY),
        impact: arguments.take_string(INPUT_IMPACT),
        category: arguments.take_string(INPUT_CATEGORY),
        caller: arguments.take_string(INPUT_CALLER),
        state: arguments.take_string(INPUT_STATE),
    }
}

// ============================================================================
// SECTION: Engine
// ============================================================================

/// Per-call dispatch context borrowed from the session.
#[derive(Debug, Clone)]
pub struct DispatchContext {
    /// Session identifier (absent for REST calls).
    pub session_id: Option<String>,
    /// Package the call is authorized against.
    pub package: Arc<ResolvedPackage>,
    /// Caller context.
    pub caller: CallerContext,
}

/// Routes tool calls to the backend.
pub struct DispatchEngine {
    /// Shared backend adapter.
    backend: Arc<dyn RecordBackend>,
    /// Reject undeclared arguments.
    strict_arguments: bool,
    /// Audit sink for call outcomes.
    audit: Arc<dyn AuditSink>,
    /// Metrics sink.
    metrics: Arc<dyn McpMetrics>,
}

impl DispatchEngine {
    /// Creates an engine with no-op audit and metrics sinks.
    #[must_use]
    pub fn new(backend: Arc<dyn RecordBackend>, strict_arguments: bool) -> Self {
        Self {
            backend,
            strict_arguments,
            audit: Arc::new(NoopAuditSink),
            metrics: Arc::new(NoopMetrics),
        }
    }

    /// Returns a copy with the given audit sink.
    #[must_use]
    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// Returns a copy with the given metrics sink.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<dyn McpMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Dispatches one tool call and returns its result.
    pub async fn dispatch(
        &self,
        context: &DispatchContext,
        request: ToolCallRequest,
    ) -> ToolCallResult {
        let started = Instant::now();
        let result = self.execute(context, &request).await;
        let latency = started.elapsed();
        let error_kind = result.error_kind();
        self.audit.record_tool_call(&ToolCallAuditEvent::new(ToolCallAuditParams {
            session_id: context.session_id.clone(),
            request_id: request.request_id.clone(),
            transport: context.caller.transport,
            identity: context.caller.identity.clone(),
            package: context.package.name().to_string(),
            tool: request.tool_name.clone(),
            error_kind,
            latency_ms: latency.as_millis(),
        }));
        let event = McpMetricEvent {
            transport: context.caller.transport,
            tool: request.tool_name,
            outcome: if error_kind.is_some() { McpOutcome::Error } else { McpOutcome::Ok },
            error_kind,
        };
        self.metrics.record_request(event.clone());
        self.metrics.record_latency(event, latency);
        result
    }

    /// Authorizes, validates, and executes a call.
    async fn execute(
        &self,
        context: &DispatchContext,
        request: &ToolCallRequest,
    ) -> ToolCallResult {
        let request_id = request.request_id.as_str();
        let Some(tool) = context.package.get(&request.tool_name) else {
            debug!(
                request_id,
                tool = %request.tool_name,
                package = context.package.name(),
                "tool not in session package"
            );
            return ToolCallResult::failure(
                request_id,
                ErrorKind::Forbidden,
                format!(
                    "tool {} is not available in package {}",
                    request.tool_name,
                    context.package.name()
                ),
            );
        };
        let call = match validate_arguments(tool, &request.arguments, self.strict_arguments)
            .and_then(|arguments| build_call(tool.operation, arguments))
        {
            Ok(call) => call,
            Err(message) => {
                return ToolCallResult::failure(request_id, ErrorKind::InvalidArgument, message);
            }
        };
        match call.execute(self.backend.as_ref()).await {
            Ok(outcome) => ToolCallResult::success(request_id, outcome.into_payload()),
            Err(err) => {
                warn!(
                    request_id,
                    tool = %tool.name,
                    kind = err.kind().as_str(),
                    "backend call failed"
                );
                ToolCallResult::failure(request_id, ErrorKind::from(err.kind()), err.message())
            }
        }
    }

    /// Returns the discovery payload for a package.
    #[must_use]
    pub fn list_tools(package: &ResolvedPackage) -> Value {
        json!({
            "package": package.name(),
            "tools": package.tools(),
        })
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
