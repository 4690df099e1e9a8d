// crates/incident-gate-config/src/env.rs
// ============================================================================
// Module: Environment Overlay
// Description: Environment variable overrides for Incident Gate config.
// Purpose: Let deployments supply instance and credential settings via env.
// Dependencies: none
// ============================================================================

//! ## Overview
//! Deployments commonly provide the instance URL and credentials through the
//! environment instead of the config file. Environment values take precedence
//! over file values. Lookups go through [`EnvLookup`] so tests can supply a
//! fixed map instead of mutating the process environment.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use crate::config::BackendAuthConfig;
use crate::config::ConfigError;
use crate::config::DEFAULT_API_KEY_HEADER;
use crate::config::IncidentGateConfig;
use crate::config::Secret;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Instance base URL.
pub const ENV_INSTANCE_URL: &str = "SERVICENOW_INSTANCE_URL";
/// Credential type selector (`basic`, `api_key`, `oauth`).
pub const ENV_AUTH_TYPE: &str = "SERVICENOW_AUTH_TYPE";
/// Basic or OAuth account name.
pub const ENV_USERNAME: &str = "SERVICENOW_USERNAME";
/// Basic or OAuth account password.
pub const ENV_PASSWORD: &str = "SERVICENOW_PASSWORD";
/// API key value.
pub const ENV_API_KEY: &str = "SERVICENOW_API_KEY";
/// API key header name.
pub const ENV_API_KEY_HEADER: &str = "SERVICENOW_API_KEY_HEADER";
/// OAuth client identifier.
pub const ENV_CLIENT_ID: &str = "SERVICENOW_CLIENT_ID";
/// OAuth client secret.
pub const ENV_CLIENT_SECRET: &str = "SERVICENOW_CLIENT_SECRET";
/// OAuth token endpoint.
pub const ENV_TOKEN_URL: &str = "SERVICENOW_TOKEN_URL";
/// Backend request timeout in whole seconds.
pub const ENV_TIMEOUT: &str = "SERVICENOW_TIMEOUT";
/// SSE bind host.
pub const ENV_HOST: &str = "SERVICENOW_HOST";
/// SSE bind port.
pub const ENV_PORT: &str = "SERVICENOW_PORT";
/// Default tool package.
pub const ENV_TOOL_PACKAGE: &str = "MCP_TOOL_PACKAGE";

// ============================================================================
// SECTION: Lookup
// ============================================================================

/// Source of environment values.
pub trait EnvLookup {
    /// Returns the value for `key`, or `None` when unset or empty.
    fn var(&self, key: &str) -> Option<String>;
}

/// Reads from the process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvLookup for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|value| !value.trim().is_empty())
    }
}

impl EnvLookup for BTreeMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).filter(|value| !value.trim().is_empty()).cloned()
    }
}

// ============================================================================
// SECTION: Overlay
// ============================================================================

impl IncidentGateConfig {
    /// Applies environment overrides on top of file values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when a variable cannot be interpreted.
    pub fn apply_env(&mut self, env: &dyn EnvLookup) -> Result<(), ConfigError> {
        if let Some(url) = env.var(ENV_INSTANCE_URL) {
            self.backend.instance_url = url.trim().trim_end_matches('/').to_string();
        }
        if let Some(timeout) = env.var(ENV_TIMEOUT) {
            let seconds: u64 = timeout.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!("{ENV_TIMEOUT} must be a whole number of seconds"))
            })?;
            self.backend.timeout_ms = seconds.saturating_mul(1_000);
        }
        if let Some(package) = env.var(ENV_TOOL_PACKAGE) {
            self.catalog.default_package = package.trim().to_string();
        }
        self.apply_bind_env(env)?;
        self.apply_auth_env(env)
    }

    /// Rebuilds the bind address from host/port overrides.
    fn apply_bind_env(&mut self, env: &dyn EnvLookup) -> Result<(), ConfigError> {
        let host = env.var(ENV_HOST);
        let port = env.var(ENV_PORT);
        if host.is_none() && port.is_none() {
            return Ok(());
        }
        let current = self.server.bind_address().to_string();
        let (current_host, current_port) = current
            .rsplit_once(':')
            .map_or((current.as_str(), "8080"), |(host, port)| (host, port));
        let port = match port {
            Some(port) => {
                let parsed: u16 = port.trim().parse().map_err(|_| {
                    ConfigError::Invalid(format!("{ENV_PORT} must be a port number"))
                })?;
                parsed.to_string()
            }
            None => current_port.to_string(),
        };
        let host = host.map_or_else(|| current_host.to_string(), |host| host.trim().to_string());
        self.server.bind = Some(format!("{host}:{port}"));
        Ok(())
    }

    /// Selects the credential type and overlays credential fields.
    fn apply_auth_env(&mut self, env: &dyn EnvLookup) -> Result<(), ConfigError> {
        if let Some(kind) = env.var(ENV_AUTH_TYPE) {
            let kind = kind.trim().to_ascii_lowercase();
            if kind != self.backend.auth.kind_label() {
                self.backend.auth = empty_auth(&kind)?;
            }
        }
        match &mut self.backend.auth {
            BackendAuthConfig::Basic {
                username,
                password,
            } => {
                overlay_string(env, ENV_USERNAME, username);
                overlay_secret(env, ENV_PASSWORD, password);
            }
            BackendAuthConfig::ApiKey {
                api_key,
                header_name,
            } => {
                overlay_secret(env, ENV_API_KEY, api_key);
                overlay_string(env, ENV_API_KEY_HEADER, header_name);
            }
            BackendAuthConfig::OAuth {
                client_id,
                client_secret,
                username,
                password,
                token_url,
            } => {
                overlay_string(env, ENV_CLIENT_ID, client_id);
                overlay_secret(env, ENV_CLIENT_SECRET, client_secret);
                overlay_string(env, ENV_USERNAME, username);
                overlay_secret(env, ENV_PASSWORD, password);
                if let Some(value) = env.var(ENV_TOKEN_URL) {
                    *token_url = Some(value.trim().to_string());
                }
            }
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns an unfilled credential variant for the named type.
fn empty_auth(kind: &str) -> Result<BackendAuthConfig, ConfigError> {
    match kind {
        "basic" => Ok(BackendAuthConfig::Basic {
            username: String::new(),
            password: Secret::default(),
        }),
        "api_key" => Ok(BackendAuthConfig::ApiKey {
            api_key: Secret::default(),
            header_name: DEFAULT_API_KEY_HEADER.to_string(),
        }),
        "oauth" => Ok(BackendAuthConfig::OAuth {
            client_id: String::new(),
            client_secret: Secret::default(),
            username: String::new(),
            password: Secret::default(),
            token_url: None,
        }),
        other => Err(ConfigError::Invalid(format!(
            "{ENV_AUTH_TYPE} must be basic, api_key, or oauth (got {other})"
        ))),
    }
}

/// Replaces `target` when `key` is set.
fn overlay_string(env: &dyn EnvLookup, key: &str, target: &mut String) {
    if let Some(value) = env.var(key) {
        *target = value.trim().to_string();
    }
}

/// Replaces `target` when `key` is set.
fn overlay_secret(env: &dyn EnvLookup, key: &str, target: &mut Secret) {
    if let Some(value) = env.var(key) {
        *target = Secret::new(value);
    }
}
