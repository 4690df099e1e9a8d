// crates/incident-gate-mcp/src/lib.rs
// ============================================================================
// Module: Incident Gate MCP
// Description: Streaming tool protocol server for incident records.
// Purpose: Expose package-scoped incident tools over SSE, stdio, and REST.
// Dependencies: incident-gate-backend, incident-gate-config, axum, tokio
// ============================================================================

//! ## Overview
//! Incident Gate MCP accepts streaming connections, negotiates a tool package
//! per session, and routes tool calls through one [`DispatchEngine`] to the
//! record backend. Results flow back through a per-connection send queue,
//! correlated by request id and delivered at most once. The REST facade and
//! the streaming transports share the same catalog and engine.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod access;
pub mod audit;
pub mod catalog;
pub mod dispatch;
pub mod health;
pub mod protocol;
pub mod rest;
pub mod server;
pub mod sessions;
pub mod telemetry;
pub mod transport;


// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use access::AccessPolicy;
pub use access::CallerContext;
pub use access::TransportKind;
pub use audit::AuditSink;
pub use audit::FileAuditSink;
pub use audit::NoopAuditSink;
pub use audit::StderrAuditSink;
pub use catalog::CatalogError;
pub use catalog::ResolvedPackage;
pub use catalog::ToolCatalog;
pub use catalog::ToolDefinition;
pub use dispatch::DispatchContext;
pub use dispatch::DispatchEngine;
pub use health::HealthMonitor;
pub use health::HealthStatus;
pub use health::ReadinessReport;
pub use protocol::ErrorKind;
pub use protocol::InboundFrame;
pub use protocol::OutboundFrame;
pub use protocol::ToolCallRequest;
pub use protocol::ToolCallResult;
pub use server::McpServer;
pub use server::McpServerError;
pub use sessions::SessionError;
pub use sessions::SessionRegistry;
pub use telemetry::McpMetrics;
pub use telemetry::NoopMetrics;
pub use transport::ConnectError;
pub use transport::SubmitError;
pub use transport::TransportManager;
