// crates/incident-gate-backend/src/call.rs
// ============================================================================
// Module: Backend Calls
// Description: Typed, fully validated backend invocation.
// Purpose: Carry validated arguments from dispatch to the adapter.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! A [`BackendCall`] is what dispatch produces after schema validation. It
//! cannot be built from unchecked JSON, so adapters never probe argument
//! shapes themselves.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Serialize;
use serde_json::Value;
use serde_json::json;

use crate::backend::RecordBackend;
use crate::error::BackendError;
use crate::operation::BackendOperation;
use crate::record::ListQuery;
use crate::record::Record;
use crate::record::RecordFields;
use crate::record::Resolution;

// ============================================================================
// SECTION: Types
// ============================================================================

/// One validated backend invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    /// List records.
    List(ListQuery),
    /// Read one record.
    Read {
        /// Record identifier.
        id: String,
    },
    /// Create a record.
    Create {
        /// New field values.
        fields: RecordFields,
        /// Optional idempotency key enabling retries.
        idempotency_key: Option<String>,
    },
    /// Update a record.
    Update {
        /// Record identifier.
        id: String,
        /// Changed field values.
        fields: RecordFields,
    },
    /// Delete a record.
    Delete {
        /// Record identifier.
        id: String,
    },
    /// Assign a record.
    Assign {
        /// Record identifier.
        id: String,
        /// Assignee user.
        assignee: String,
    },
    /// Resolve a record.
    Resolve {
        /// Record identifier.
        id: String,
        /// Resolution details.
        resolution: Resolution,
    },
}

/// Successful backend outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum BackendOutcome {
    /// A page of records.
    Records(Vec<Record>),
    /// A single record.
    Record(Record),
    /// Identifier of a deleted record.
    Deleted(String),
}

impl BackendOutcome {
    /// Renders the vendor-neutral payload.
    #[must_use]
    pub fn into_payload(self) -> Value {
        match self {
            Self::Records(records) => json!({ "count": records.len(), "records": records }),
            Self::Record(record) => json!({ "record": record }),
            Self::Deleted(identifier) => json!({ "deleted": identifier }),
        }
    }
}

impl BackendCall {
    /// Returns the operation this call performs.
    #[must_use]
    pub const fn operation(&self) -> BackendOperation {
        match self {
            Self::List(_) => BackendOperation::List,
            Self::Read {
                ..
            } => BackendOperation::Read,
            Self::Create {
                ..
            } => BackendOperation::Create,
            Self::Update {
                ..
            } => BackendOperation::Update,
            Self::Delete {
                ..
            } => BackendOperation::Delete,
            Self::Assign {
                ..
            } => BackendOperation::Assign,
            Self::Resolve {
                ..
            } => BackendOperation::Resolve,
        }
    }

    /// Invokes the call against `backend`.
    ///
    /// # Errors
    ///
    /// Returns the backend's classified [`BackendError`].
    pub async fn execute(
        &self,
        backend: &dyn RecordBackend,
    ) -> Result<BackendOutcome, BackendError> {
        match self {
            Self::List(query) => backend.list(query).await.map(BackendOutcome::Records),
            Self::Read {
                id,
            } => backend.read(id).await.map(BackendOutcome::Record),
            Self::Create {
                fields,
                idempotency_key,
            } => {
                backend.create(fields, idempotency_key.as_deref()).await.map(BackendOutcome::Record)
            }
            Self::Update {
                id,
                fields,
            } => backend.update(id, fields).await.map(BackendOutcome::Record),
            Self::Delete {
                id,
            } => backend.delete(id).await.map(BackendOutcome::Deleted),
            Self::Assign {
                id,
                assignee,
            } => backend.assign(id, assignee).await.map(BackendOutcome::Record),
            Self::Resolve {
                id,
                resolution,
            } => backend.resolve(id, resolution).await.map(BackendOutcome::Record),
        }
    }
}
