// crates/incident-gate-config/src/lib.rs
// ============================================================================
// Module: Incident Gate Config Library
// Description: Canonical config model, environment overlay, and validation.
// Purpose: Single source of truth for incident-gate.toml semantics.
// Dependencies: serde, toml, url
// ============================================================================

//! ## Overview
//! `incident-gate-config` defines the canonical configuration model for
//! Incident Gate. Configuration is read from TOML, overlaid with the
//! deployment environment, and validated fail-closed before any server
//! component is built.
//!
//! Security posture: config inputs are untrusted; secrets are redacted from
//! debug output.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;
pub mod env;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
pub use env::EnvLookup;
pub use env::ProcessEnv;
