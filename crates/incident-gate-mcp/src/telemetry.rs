// crates/incident-gate-mcp/src/telemetry.rs
// ============================================================================
// Module: Telemetry
// Description: Metrics hooks for tool dispatch.
// Purpose: Provide metric events without hard deps.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A thin metrics interface for tool call counters and latency histograms.
//! Deployments plug in their own exporter; the default sink discards events.
//! Labels carry tool names and error kinds only, never argument values.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use crate::access::TransportKind;
use crate::protocol::ErrorKind;

// ============================================================================
// SECTION: Metric Labels
// ============================================================================

/// Tool call outcome classification.
///
/// # Invariants
/// - Variants are stable for telemetry labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum McpOutcome {
    /// Successful call.
    Ok,
    /// Failed call.
    Error,
}

/// Tool call metric event payload.
#[derive(Debug, Clone)]
pub struct McpMetricEvent {
    /// Transport carrying the call.
    pub transport: TransportKind,
    /// Requested tool name.
    pub tool: String,
    /// Call outcome.
    pub outcome: McpOutcome,
    /// Error kind when the call failed.
    pub error_kind: Option<ErrorKind>,
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Metrics sink for tool calls and latencies.
pub trait McpMetrics: Send + Sync {
    /// Records a call counter event.
    fn record_request(&self, event: McpMetricEvent);
    /// Records a latency observation for the call.
    fn record_latency(&self, event: McpMetricEvent, latency: Duration);
}

/// No-op metrics sink.
pub struct NoopMetrics;

impl McpMetrics for NoopMetrics {
    fn record_request(&self, _event: McpMetricEvent) {}

    fn record_latency(&self, _event: McpMetricEvent, _latency: Duration) {}
}
