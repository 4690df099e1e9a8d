// crates/incident-gate-mcp/src/catalog.rs
// ============================================================================
// Module: Tool Catalog
// Description: Declarative tool definitions and capability packages.
// Purpose: Map packages to tools and tools to backend operations.
// Dependencies: incident-gate-backend, serde, toml
// ============================================================================

//! ## Overview
//! The catalog is loaded once at startup from the embedded default or an
//! external TOML file and then shared as an immutable `Arc<ToolCatalog>`.
//! Every inconsistency is fatal at load: duplicate names, package members that
//! do not exist, operations the backend cannot perform, or schemas that omit
//! an input the operation requires.
//!
//! Security posture: the catalog file is operator input; it is size-limited
//! and parsed with unknown fields denied.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use incident_gate_backend::BackendOperation;
use incident_gate_backend::InputType;
use incident_gate_backend::RecordBackend;
use incident_gate_config::CatalogConfig;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Package that resolves to no tools and cannot be redefined.
pub const EMPTY_PACKAGE: &str = "none";
/// Embedded default catalog.
pub(crate) const BUILTIN_CATALOG: &str = include_str!("../catalog/default.toml");
/// Maximum size of an external catalog file (bytes).
const MAX_CATALOG_BYTES: u64 = 1024 * 1024;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Catalog load and lookup errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    /// Catalog file could not be read.
    #[error("catalog io error: {0}")]
    Io(String),
    /// Catalog file failed to parse.
    #[error("catalog parse error: {0}")]
    Parse(String),
    /// Two tools share a name.
    #[error("duplicate tool: {0}")]
    DuplicateTool(String),
    /// A tool declares the same parameter twice.
    #[error("duplicate parameter {parameter} on tool {tool}")]
    DuplicateParameter {
        /// Tool name.
        tool: String,
        /// Parameter name.
        parameter: String,
    },
    /// A package lists a tool that does not exist.
    #[error("package {package} lists unknown tool {tool}")]
    UnknownMember {
        /// Package name.
        package: String,
        /// Missing tool name.
        tool: String,
    },
    /// The backend cannot perform a tool's operation.
    #[error("tool {tool} uses unsupported operation {operation}")]
    UnsupportedOperation {
        /// Tool name.
        tool: String,
        /// Operation label.
        operation: &'static str,
    },
    /// A tool's schema omits or relaxes an input its operation requires.
    #[error("tool {tool} must declare required parameter {parameter}")]
    MissingRequiredInput {
        /// Tool name.
        tool: String,
        /// Input name.
        parameter: &'static str,
    },
    /// A tool declares a parameter its operation does not consume.
    #[error("tool {tool} declares parameter {parameter} not accepted by {operation}")]
    UnexpectedParameter {
        /// Tool name.
        tool: String,
        /// Parameter name.
        parameter: String,
        /// Operation label.
        operation: &'static str,
    },
    /// A parameter's declared type disagrees with the operation input.
    #[error("tool {tool} parameter {parameter} must be {expected}")]
    ParameterType {
        /// Tool name.
        tool: String,
        /// Parameter name.
        parameter: String,
        /// Expected type.
        expected: InputType,
    },
    /// A name is blank.
    #[error("catalog contains a blank {0} name")]
    BlankName(&'static str),
    /// The reserved empty package was redefined.
    #[error("package {EMPTY_PACKAGE} is reserved")]
    ReservedPackage,
    /// The configured default package is not defined.
    #[error("default package not defined: {0}")]
    UnknownDefaultPackage(String),
    /// Lookup of an undefined package.
    #[error("unknown package: {0}")]
    UnknownPackage(String),
    /// Lookup of an undefined tool.
    #[error("unknown tool: {0}")]
    UnknownTool(String),
}

// ============================================================================
// SECTION: Types
// ============================================================================

/// One declared tool parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParameterSpec {
    /// Argument name.
    pub name: String,
    /// Primitive type.
    #[serde(rename = "type")]
    pub kind: InputType,
    /// Whether the argument must be present and non-null.
    #[serde(default)]
    pub required: bool,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
}

/// Tool definition bound to a backend operation.
///
/// # Invariants
/// - Immutable after catalog load.
/// - `parameters` keeps declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolDefinition {
    /// Tool name.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Ordered parameter schema.
    #[serde(rename = "parameters", alias = "params", default)]
    pub parameters: Vec<ParameterSpec>,
    /// Backend operation the tool performs.
    #[serde(skip_serializing)]
    pub operation: BackendOperation,
}

impl ToolDefinition {
    /// Returns the parameter named `name`.
    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&ParameterSpec> {
        self.parameters.iter().find(|parameter| parameter.name == name)
    }
}

/// A package resolved to its tool definitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPackage {
    /// Package name.
    name: String,
    /// Tools in listing order.
    tools: Vec<ToolDefinition>,
}

impl ResolvedPackage {
    /// Returns the package name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the package's tools in listing order.
    #[must_use]
    pub fn tools(&self) -> &[ToolDefinition] {
        &self.tools
    }

    /// Returns the tool named `name` when it belongs to the package.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.iter().find(|tool| tool.name == name)
    }

    /// Returns the first tool in the package bound to `operation`.
    #[must_use]
    pub fn tool_for_operation(&self, operation: BackendOperation) -> Option<&ToolDefinition> {
        self.tools.iter().find(|tool| tool.operation == operation)
    }
}

/// On-disk catalog shape.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CatalogFile {
    /// Tool definitions.
    #[serde(default)]
    tools: Vec<ToolDefinition>,
    /// Package name to member tool names.
    #[serde(default)]
    packages: BTreeMap<String, Vec<String>>,
}

// ============================================================================
// SECTION: Catalog
// ============================================================================

/// Validated, immutable tool catalog.
#[derive(Debug, Clone)]
pub struct ToolCatalog {
    /// Tools in declaration order.
    tools: Vec<ToolDefinition>,
    /// Resolved packages keyed by name, including the empty package.
    packages: BTreeMap<String, Arc<ResolvedPackage>>,
    /// Package used when a client requests none.
    default_package: String,
}

impl ToolCatalog {
    /// Loads the configured catalog and checks it against `backend`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] when the file cannot be read or the catalog
    /// is inconsistent.
    pub fn load(config: &CatalogConfig, backend: &dyn RecordBackend) -> Result<Self, CatalogError> {
        let content = match config.path.as_deref() {
            Some(path) => read_catalog_file(Path::new(path))?,
            None => BUILTIN_CATALOG.to_string(),
        };
        Self::from_toml_str(
            &content,
            |operation| backend.supports(operation),
            &config.default_package,
        )
    }

    /// Parses and validates a catalog document.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] when the document is malformed or inconsistent.
    pub fn from_toml_str(
        content: &str,
        supports: impl Fn(BackendOperation) -> bool,
        default_package: &str,
    ) -> Result<Self, CatalogError> {
        let file: CatalogFile =
            toml::from_str(content).map_err(|err| CatalogError::Parse(err.to_string()))?;
        let mut index = BTreeMap::new();
        for (position, tool) in file.tools.iter().enumerate() {
            validate_tool(tool, &supports)?;
            if index.insert(tool.name.clone(), position).is_some() {
                return Err(CatalogError::DuplicateTool(tool.name.clone()));
            }
        }

        let mut packages = BTreeMap::new();
        packages.insert(
            EMPTY_PACKAGE.to_string(),
            Arc::new(ResolvedPackage {
                name: EMPTY_PACKAGE.to_string(),
                tools: Vec::new(),
            }),
        );
        for (name, members) in &file.packages {
            if name.trim().is_empty() {
                return Err(CatalogError::BlankName("package"));
            }
            if name == EMPTY_PACKAGE {
                return Err(CatalogError::ReservedPackage);
            }
            let mut seen = BTreeSet::new();
            let mut tools = Vec::with_capacity(members.len());
            for member in members {
                let position = index.get(member).ok_or_else(|| CatalogError::UnknownMember {
                    package: name.clone(),
                    tool: member.clone(),
                })?;
                if seen.insert(member.as_str()) {
                    tools.push(file.tools[*position].clone());
                }
            }
            packages.insert(
                name.clone(),
                Arc::new(ResolvedPackage {
                    name: name.clone(),
                    tools,
                }),
            );
        }

        if !packages.contains_key(default_package) {
            return Err(CatalogError::UnknownDefaultPackage(default_package.to_string()));
        }
        Ok(Self {
            tools: file.tools,
            packages,
            default_package: default_package.to_string(),
        })
    }

    /// Resolves a package by name.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::UnknownPackage`] when the package is undefined.
    pub fn resolve(&self, name: &str) -> Result<Arc<ResolvedPackage>, CatalogError> {
        self.packages
            .get(name)
            .cloned()
            .ok_or_else(|| CatalogError::UnknownPackage(name.to_string()))
    }

    /// Returns a tool by name regardless of package.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::UnknownTool`] when no tool has that name.
    pub fn get(&self, name: &str) -> Result<&ToolDefinition, CatalogError> {
        self.tools
            .iter()
            .find(|tool| tool.name == name)
            .ok_or_else(|| CatalogError::UnknownTool(name.to_string()))
    }

    /// Returns every package name, including the empty package.
    #[must_use]
    pub fn package_names(&self) -> Vec<&str> {
        self.packages.keys().map(String::as_str).collect()
    }

    /// Returns the package used when a client requests none.
    #[must_use]
    pub fn default_package(&self) -> &str {
        &self.default_package
    }

    /// Returns every tool in declaration order.
    #[must_use]
    pub fn tools(&self) -> &[ToolDefinition] {
        &self.tools
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Reads an external catalog file with a size cap.
fn read_catalog_file(path: &Path) -> Result<String, CatalogError> {
    let metadata = std::fs::metadata(path)
        .map_err(|err| CatalogError::Io(format!("{}: {err}", path.display())))?;
    if metadata.len() > MAX_CATALOG_BYTES {
        return Err(CatalogError::Io(format!("{}: catalog exceeds size limit", path.display())));
    }
    let bytes =
        std::fs::read(path).map_err(|err| CatalogError::Io(format!("{}: {err}", path.display())))?;
    String::from_utf8(bytes)
        .map_err(|_| CatalogError::Parse(format!("{}: catalog must be utf-8", path.display())))
}

/// Checks one tool against its operation's input contract.
fn validate_tool(
    tool: &ToolDefinition,
    supports: &impl Fn(BackendOperation) -> bool,
) -> Result<(), CatalogError> {
    if tool.name.trim().is_empty() {
        return Err(CatalogError::BlankName("tool"));
    }
    if !supports(tool.operation) {
        return Err(CatalogError::UnsupportedOperation {
            tool: tool.name.clone(),
            operation: tool.operation.as_str(),
        });
    }
    let mut seen = BTreeSet::new();
    for parameter in &tool.parameters {
        if parameter.name.trim().is_empty() {
            return Err(CatalogError::BlankName("parameter"));
        }
        if !seen.insert(parameter.name.as_str()) {
            return Err(CatalogError::DuplicateParameter {
                tool: tool.name.clone(),
                parameter: parameter.name.clone(),
            });
        }
        let expected = tool.operation.input_type(&parameter.name).ok_or_else(|| {
            CatalogError::UnexpectedParameter {
                tool: tool.name.clone(),
                parameter: parameter.name.clone(),
                operation: tool.operation.as_str(),
            }
        })?;
        if expected != parameter.kind {
            return Err(CatalogError::ParameterType {
                tool: tool.name.clone(),
                parameter: parameter.name.clone(),
                expected,
            });
        }
    }
    for required in tool.operation.required_inputs().iter().copied() {
        if !tool.parameter(required).is_some_and(|parameter| parameter.required) {
            return Err(CatalogError::MissingRequiredInput {
                tool: tool.name.clone(),
                parameter: required,
            });
        }
    }
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================
