// crates/incident-gate-backend/src/lib.rs
// ============================================================================
// Module: Incident Gate Backend Library
// Description: Typed async adapter for the downstream record API.
// Purpose: Build authenticated requests, classify failures, bound retries.
// Dependencies: reqwest, serde_json, tokio, incident-gate-config
// ============================================================================

//! ## Overview
//! `incident-gate-backend` owns every byte exchanged with the ticketing
//! platform. Callers see the [`RecordBackend`] trait, vendor-neutral
//! [`Record`] values, and a [`BackendError`] that has already been classified
//! into the normalized taxonomy. [`TableApiBackend`] is the production
//! implementation against a ServiceNow-style Table API.
//!
//! Security posture: backend responses are untrusted; credentials never
//! appear in errors or logs.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod auth;
pub mod backend;
pub mod call;
pub mod error;
pub mod operation;
pub mod record;
pub mod retry;
pub mod table_api;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use backend::RecordBackend;
pub use call::BackendCall;
pub use call::BackendOutcome;
pub use error::BackendError;
pub use error::BackendErrorKind;
pub use operation::BackendOperation;
pub use operation::InputType;
pub use record::ListQuery;
pub use record::Record;
pub use record::RecordFields;
pub use record::Resolution;
pub use retry::RetryPolicy;
pub use table_api::TableApiBackend;
