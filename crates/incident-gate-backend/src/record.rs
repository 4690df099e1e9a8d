// crates/incident-gate-backend/src/record.rs
// ============================================================================
// Module: Records
// Description: Vendor-neutral record model and operation inputs.
// Purpose: Keep Table API field names out of the protocol surface.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! [`Record`] is the payload every tool returns. It is built from a Table API
//! row where reference fields may arrive as plain strings or as
//! `{"display_value": ..., "link": ...}` objects depending on
//! `sysparm_display_value`. Empty strings are treated as absent.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

use crate::error::BackendError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default page size when the caller does not supply one.
pub const DEFAULT_LIST_LIMIT: u32 = 100;
/// Largest page size forwarded to the backend.
pub const MAX_LIST_LIMIT: u32 = 1_000;

// ============================================================================
// SECTION: Record
// ============================================================================

/// Vendor-neutral incident record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Human-facing ticket number (e.g. `INC0010001`).
    pub identifier: String,
    /// Backend primary key.
    pub sys_id: String,
    /// One-line summary.
    pub short_description: Option<String>,
    /// Full description.
    pub description: Option<String>,
    /// Priority.
    pub priority: Option<String>,
    /// Urgency.
    pub urgency: Option<String>,
    /// Impact.
    pub impact: Option<String>,
    /// Category.
    pub category: Option<String>,
    /// Assigned user.
    pub assignee: Option<String>,
    /// Workflow state.
    pub state: Option<String>,
    /// Open timestamp as reported by the backend.
    pub opened_at: Option<String>,
    /// Last update timestamp as reported by the backend.
    pub updated_at: Option<String>,
}

impl Record {
    /// Builds a record from a Table API row.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Unknown`] when the row lacks `sys_id`.
    pub fn from_row(row: &Map<String, Value>) -> Result<Self, BackendError> {
        let sys_id = text_field(row, "sys_id")
            .ok_or_else(|| BackendError::Unknown("record row missing sys_id".to_string()))?;
        Ok(Self {
            identifier: text_field(row, "number").unwrap_or_else(|| sys_id.clone()),
            sys_id,
            short_description: text_field(row, "short_description"),
            description: text_field(row, "description"),
            priority: text_field(row, "priority"),
            urgency: text_field(row, "urgency"),
            impact: text_field(row, "impact"),
            category: text_field(row, "category"),
            assignee: text_field(row, "assigned_to"),
            state: text_field(row, "state"),
            opened_at: text_field(row, "opened_at"),
            updated_at: text_field(row, "sys_updated_on"),
        })
    }
}

/// Reads a scalar or reference field as text.
fn text_field(row: &Map<String, Value>, name: &str) -> Option<String> {
    let value = match row.get(name)? {
        Value::String(text) => text.clone(),
        Value::Number(number) => number.to_string(),
        Value::Bool(flag) => flag.to_string(),
        Value::Object(reference) => {
            return ["display_value", "value", "name"]
                .iter()
                .find_map(|key| reference.get(*key).and_then(Value::as_str))
                .filter(|text| !text.is_empty())
                .map(str::to_string);
        }
        Value::Null | Value::Array(_) => return None,
    };
    (!value.is_empty()).then_some(value)
}

// ============================================================================
// SECTION: Inputs
// ============================================================================

/// Page request for list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    /// Page size, clamped to [`MAX_LIST_LIMIT`].
    pub limit: u32,
    /// Records to skip.
    pub offset: u32,
    /// Encoded backend query (`sysparm_query`).
    pub query: Option<String>,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIST_LIMIT,
            offset: 0,
            query: None,
        }
    }
}

/// Field values for create and update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFields {
    /// One-line summary.
    pub short_description: Option<String>,
    /// Full description.
    pub description: Option<String>,
    /// Priority.
    pub priority: Option<String>,
    /// Urgency.
    pub urgency: Option<String>,
    /// Impact.
    pub impact: Option<String>,
    /// Category.
    pub category: Option<String>,
    /// Reporting caller (create only).
    pub caller: Option<String>,
    /// Workflow state (update only).
    pub state: Option<String>,
}

impl RecordFields {
    /// Returns true when no field is set.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.short_description.is_none()
            && self.description.is_none()
            && self.priority.is_none()
            && self.urgency.is_none()
            && self.impact.is_none()
            && self.category.is_none()
            && self.caller.is_none()
            && self.state.is_none()
    }

    /// Renders the Table API request body.
    #[must_use]
    pub fn to_table_body(&self) -> Value {
        let pairs = [
            ("short_description", &self.short_description),
            ("description", &self.description),
            ("priority", &self.priority),
            ("urgency", &self.urgency),
            ("impact", &self.impact),
            ("category", &self.category),
            ("caller_id", &self.caller),
            ("state", &self.state),
        ];
        let body: Map<String, Value> = pairs
            .into_iter()
            .filter_map(|(key, value)| {
                value.as_ref().map(|value| (key.to_string(), Value::String(value.clone())))
            })
            .collect();
        Value::Object(body)
    }
}

/// Resolution details.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Close code (e.g. `Solved (Permanently)`).
    pub code: String,
    /// Close notes.
    pub notes: String,
}

/// Returns true when `value` looks like a 32-character hex `sys_id`.
#[must_use]
pub fn is_sys_id(value: &str) -> bool {
    value.len() == 32 && value.bytes().all(|byte| byte.is_ascii_hexdigit())
}

// ============================================================================
// SECTION: Tests
// ============================================================================
