// crates/incident-gate-backend/src/backend.rs
// ============================================================================
// Module: Record Backend Interface
// Description: Async trait implemented by record API adapters.
// Purpose: Decouple dispatch from the concrete ticketing platform.
// Dependencies: async-trait
// ============================================================================

//! ## Overview
//! [`RecordBackend`] has one method per record operation plus a cheap
//! reachability probe. Implementations classify their own failures and apply
//! their own timeouts and retries; callers only see [`BackendError`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use async_trait::async_trait;

use crate::error::BackendError;
use crate::operation::BackendOperation;
use crate::record::ListQuery;
use crate::record::Record;
use crate::record::RecordFields;
use crate::record::Resolution;

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Record API adapter.
///
/// `id` arguments accept either the ticket number or the backend key.
#[async_trait]
pub trait RecordBackend: Send + Sync {
    /// Returns a page of records.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] when the backend call fails.
    async fn list(&self, query: &ListQuery) -> Result<Vec<Record>, BackendError>;

    /// Returns one record.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::NotFound`] when no record matches.
    async fn read(&self, id: &str) -> Result<Record, BackendError>;

    /// Creates a record.
    ///
    /// Without an idempotency key the call is attempted at most once.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] when the backend call fails.
    async fn create(
        &self,
        fields: &RecordFields,
        idempotency_key: Option<&str>,
    ) -> Result<Record, BackendError>;

    /// Updates record fields.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] when the backend call fails.
    async fn update(&self, id: &str, fields: &RecordFields) -> Result<Record, BackendError>;

    /// Deletes a record and returns its identifier.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] when the backend call fails.
    async fn delete(&self, id: &str) -> Result<String, BackendError>;

    /// Assigns a record.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] when the backend call fails.
    async fn assign(&self, id: &str, assignee: &str) -> Result<Record, BackendError>;

    /// Resolves a record.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] when the backend call fails.
    async fn resolve(&self, id: &str, resolution: &Resolution) -> Result<Record, BackendError>;

    /// Checks reachability and credentials with a minimal request.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] when the backend is unreachable or rejects
    /// credentials.
    async fn probe(&self) -> Result<(), BackendError>;

    /// Returns true when the adapter implements `operation`.
    fn supports(&self, operation: BackendOperation) -> bool {
        let _ = operation;
        true
    }
}
