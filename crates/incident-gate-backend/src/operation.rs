// crates/incident-gate-backend/src/operation.rs
// ============================================================================
// Module: Backend Operations
// Description: Closed set of record operations and their canonical inputs.
// Purpose: Let the tool catalog bind tools to operations and verify schemas.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A [`BackendOperation`] names one record API capability. Each operation
//! declares the canonical argument names it understands and which of them it
//! cannot run without; catalog validation uses both so a misconfigured tool
//! is rejected at startup rather than at call time.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Input Names
// ============================================================================

/// Record identifier (ticket number or 32-hex `sys_id`).
pub const INPUT_INCIDENT_ID: &str = "incident_id";
/// Page size for list.
pub const INPUT_LIMIT: &str = "limit";
/// Page offset for list.
pub const INPUT_OFFSET: &str = "offset";
/// Encoded backend query for list.
pub const INPUT_QUERY: &str = "query";
/// One-line summary.
pub const INPUT_SHORT_DESCRIPTION: &str = "short_description";
/// Full description.
pub const INPUT_DESCRIPTION: &str = "description";
/// Priority code.
pub const INPUT_PRIORITY: &str = "priority";
/// Urgency code.
pub const INPUT_URGENCY: &str = "urgency";
/// Impact code.
pub const INPUT_IMPACT: &str = "impact";
/// Category label.
pub const INPUT_CATEGORY: &str = "category";
/// Reporting caller.
pub const INPUT_CALLER: &str = "caller";
/// Workflow state code.
pub const INPUT_STATE: &str = "state";
/// Assignee user.
pub const INPUT_ASSIGNEE: &str = "assignee";
/// Resolution code.
pub const INPUT_RESOLUTION_CODE: &str = "resolution_code";
/// Resolution notes.
pub const INPUT_RESOLUTION_NOTES: &str = "resolution_notes";
/// Caller-supplied idempotency key for create.
pub const INPUT_IDEMPOTENCY_KEY: &str = "idempotency_key";

// ============================================================================
// SECTION: Types
// ============================================================================

/// Primitive argument type accepted by an operation input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputType {
    /// UTF-8 string.
    String,
    /// Signed integer.
    Integer,
    /// Boolean.
    Boolean,
}

impl InputType {
    /// Returns the schema label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
        }
    }
}

impl fmt::Display for InputType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record operation offered by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendOperation {
    /// Page through records.
    List,
    /// Fetch one record.
    Read,
    /// Create a record.
    Create,
    /// Modify record fields.
    Update,
    /// Remove a record.
    Delete,
    /// Set the assignee.
    Assign,
    /// Resolve with code and notes.
    Resolve,
}

/// Field inputs shared by create and update.
const FIELD_INPUTS: [(&str, InputType); 6] = [
    (INPUT_SHORT_DESCRIPTION, InputType::String),
    (INPUT_DESCRIPTION, InputType::String),
    (INPUT_PRIORITY, InputType::String),
    (INPUT_URGENCY, InputType::String),
    (INPUT_IMPACT, InputType::String),
    (INPUT_CATEGORY, InputType::String),
];

impl BackendOperation {
    /// Every operation, in declaration order.
    pub const ALL: [Self; 7] = [
        Self::List,
        Self::Read,
        Self::Create,
        Self::Update,
        Self::Delete,
        Self::Assign,
        Self::Resolve,
    ];

    /// Returns the stable operation label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::List => "list",
            Self::Read => "read",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Assign => "assign",
            Self::Resolve => "resolve",
        }
    }

    /// Inputs the operation cannot run without.
    #[must_use]
    pub const fn required_inputs(self) -> &'static [&'static str] {
        match self {
            Self::List => &[],
            Self::Read | Self::Update | Self::Delete => &[INPUT_INCIDENT_ID],
            Self::Create => &[INPUT_SHORT_DESCRIPTION],
            Self::Assign => &[INPUT_INCIDENT_ID, INPUT_ASSIGNEE],
            Self::Resolve => &[INPUT_INCIDENT_ID, INPUT_RESOLUTION_CODE, INPUT_RESOLUTION_NOTES],
        }
    }

    /// Returns the expected type when `name` is an input of this operation.
    #[must_use]
    pub fn input_type(self, name: &str) -> Option<InputType> {
        let lookup = |pairs: &[(&'static str, InputType)]| find_input(pairs, name);
        match self {
            Self::List => lookup(&[
                (INPUT_LIMIT, InputType::Integer),
                (INPUT_OFFSET, InputType::Integer),
                (INPUT_QUERY, InputType::String),
            ]),
            Self::Read | Self::Delete => lookup(&[(INPUT_INCIDENT_ID, InputType::String)]),
            Self::Create => lookup(&FIELD_INPUTS).or_else(|| {
                lookup(&[
                    (INPUT_CALLER, InputType::String),
                    (INPUT_IDEMPOTENCY_KEY, InputType::String),
                ])
            }),
            Self::Update => lookup(&FIELD_INPUTS).or_else(|| {
                lookup(&[(INPUT_INCIDENT_ID, InputType::String), (INPUT_STATE, InputType::String)])
            }),
            Self::Assign => lookup(&[
                (INPUT_INCIDENT_ID, InputType::String),
                (INPUT_ASSIGNEE, InputType::String),
            ]),
            Self::Resolve => lookup(&[
                (INPUT_INCIDENT_ID, InputType::String),
                (INPUT_RESOLUTION_CODE, InputType::String),
                (INPUT_RESOLUTION_NOTES, InputType::String),
            ]),
        }
    }
}

/// Finds the type of `name` in an input table.
fn find_input(pairs: &[(&'static str, InputType)], name: &str) -> Option<InputType> {
    pairs.iter().find(|(candidate, _)| *candidate == name).map(|(_, kind)| *kind)
}

impl fmt::Display for BackendOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendOperation {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|operation| operation.as_str() == value)
            .ok_or_else(|| format!("unknown backend operation: {value}"))
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
