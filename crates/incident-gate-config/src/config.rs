// crates/incident-gate-config/src/config.rs
// ============================================================================
// Module: Incident Gate Configuration
// Description: Configuration loading and validation for Incident Gate.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: serde, toml, url
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits,
//! then overlaid with environment variables (see [`crate::env`]). When no file
//! is named and the default file is absent, defaults plus environment are
//! used, matching how the server is usually deployed next to a `.env` file.
//! Missing or invalid configuration fails closed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use url::Url;

use crate::env::EnvLookup;
use crate::env::ProcessEnv;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "incident-gate.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "INCIDENT_GATE_CONFIG";
/// Maximum configuration file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum accepted request body size.
pub(crate) const MAX_BODY_BYTES_LIMIT: usize = 16 * 1024 * 1024;
/// Maximum per-connection send queue capacity.
pub(crate) const MAX_QUEUE_CAPACITY: usize = 65_536;
/// Maximum in-flight requests per session.
pub(crate) const MAX_INFLIGHT_LIMIT: usize = 4_096;
/// Maximum request identifiers a single session may use.
pub(crate) const MAX_REQUEST_IDS_LIMIT: usize = 1_048_576;
/// Maximum accepted backend response body size.
pub(crate) const MAX_RESPONSE_BYTES_LIMIT: usize = 64 * 1024 * 1024;
/// Minimum backend request timeout in milliseconds.
pub(crate) const MIN_BACKEND_TIMEOUT_MS: u64 = 100;
/// Maximum backend request timeout in milliseconds.
pub(crate) const MAX_BACKEND_TIMEOUT_MS: u64 = 300_000;
/// Maximum total backend attempts per call.
pub(crate) const MAX_RETRY_ATTEMPTS: u32 = 10;
/// Maximum number of access grants.
pub(crate) const MAX_ACCESS_GRANTS: usize = 1_024;
/// Default API key header used by the Table API.
pub const DEFAULT_API_KEY_HEADER: &str = "X-ServiceNow-API-Key";
/// Default package when none is configured.
pub const DEFAULT_PACKAGE: &str = "full";
/// Default HTTP bind address for the SSE transport.
pub const DEFAULT_BIND: &str = "127.0.0.1:8080";

// ============================================================================
// SECTION: Secrets
// ============================================================================

/// String secret that never appears in debug output.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    /// Wraps a secret value.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the secret value for use on the wire.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Returns true when the secret is empty or whitespace.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

// ============================================================================
// SECTION: Configuration Types
// ============================================================================

/// Incident Gate configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IncidentGateConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Downstream record API configuration.
    #[serde(default)]
    pub backend: BackendConfig,
    /// Tool catalog configuration.
    #[serde(default)]
    pub catalog: CatalogConfig,
    /// Health monitor configuration.
    #[serde(default)]
    pub health: HealthConfig,
    /// Package access policy.
    #[serde(default)]
    pub access: AccessConfig,
}

impl IncidentGateConfig {
    /// Loads configuration from disk and the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(path, &ProcessEnv)
    }

    /// Loads configuration using an explicit environment source.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load_with_env(path: Option<&Path>, env: &dyn EnvLookup) -> Result<Self, ConfigError> {
        let mut config = match resolve_path(path, env)? {
            Some(resolved) => Self::from_file(&resolved)?,
            None => Self::default(),
        };
        config.apply_env(env)?;
        config.validate()?;
        Ok(config)
    }

    /// Parses configuration from a TOML string without environment overlay.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        if content.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a config file (validation happens after env overlay).
    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        validate_path(path)?;
        let bytes = fs::read(path).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.backend.validate()?;
        self.catalog.validate()?;
        self.health.validate()?;
        self.access.validate()?;
        Ok(())
    }
}

// ============================================================================
// SECTION: Server
// ============================================================================

/// Server transport selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerTransport {
    /// Content-Length framed JSON over stdin/stdout (single session).
    Stdio,
    /// HTTP server with SSE streams, the REST facade, and health probes.
    #[default]
    Sse,
}

impl ServerTransport {
    /// Returns a stable label for logging.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stdio => "stdio",
            Self::Sse => "sse",
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Transport type.
    #[serde(default)]
    pub transport: ServerTransport,
    /// Bind address for the SSE transport.
    #[serde(default)]
    pub bind: Option<String>,
    /// Maximum request body size in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Default tracing filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Session lifecycle settings.
    #[serde(default)]
    pub sessions: SessionConfig,
    /// Audit logging configuration.
    #[serde(default)]
    pub audit: ServerAuditConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            transport: ServerTransport::Sse,
            bind: None,
            max_body_bytes: default_max_body_bytes(),
            log_level: default_log_level(),
            sessions: SessionConfig::default(),
            audit: ServerAuditConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Returns the effective bind address for the SSE transport.
    #[must_use]
    pub fn bind_address(&self) -> &str {
        self.bind.as_deref().map_or(DEFAULT_BIND, str::trim)
    }

    /// Validates server configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_body_bytes == 0 {
            return Err(ConfigError::Invalid(
                "max_body_bytes must be greater than zero".to_string(),
            ));
        }
        if self.max_body_bytes > MAX_BODY_BYTES_LIMIT {
            return Err(ConfigError::Invalid("max_body_bytes too large".to_string()));
        }
        if self.log_level.trim().is_empty() {
            return Err(ConfigError::Invalid("server.log_level must be non-empty".to_string()));
        }
        if self.transport == ServerTransport::Sse {
            self.bind_address()
                .parse::<SocketAddr>()
                .map_err(|_| ConfigError::Invalid("invalid bind address".to_string()))?;
        }
        self.sessions.validate()?;
        self.audit.validate()
    }
}

/// Session lifecycle configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Idle threshold after which a session is drained and closed.
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,
    /// Interval between idle sweeps.
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
    /// Grace period for in-flight requests while draining.
    #[serde(default = "default_drain_grace_ms")]
    pub drain_grace_ms: u64,
    /// Interval between heartbeat events (0 disables heartbeats).
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    /// Per-connection send queue capacity.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Maximum in-flight requests per session.
    #[serde(default = "default_max_inflight")]
    pub max_inflight: usize,
    /// Request identifiers a session may use before it must reconnect.
    ///
    /// Identifiers stay reserved for the life of the session, so this bounds
    /// per-session memory the way `max_inflight` bounds concurrency.
    #[serde(default = "default_max_request_ids")]
    pub max_request_ids: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_ms: default_idle_timeout_ms(),
            sweep_interval_ms: default_sweep_interval_ms(),
            drain_grace_ms: default_drain_grace_ms(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            queue_capacity: default_queue_capacity(),
            max_inflight: default_max_inflight(),
            max_request_ids: default_max_request_ids(),
        }
    }
}

impl SessionConfig {
    /// Validates session limits.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.idle_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "sessions.idle_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.sweep_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "sessions.sweep_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.sweep_interval_ms > self.idle_timeout_ms {
            return Err(ConfigError::Invalid(
                "sessions.sweep_interval_ms must not exceed idle_timeout_ms".to_string(),
            ));
        }
        if self.queue_capacity == 0 || self.queue_capacity > MAX_QUEUE_CAPACITY {
            return Err(ConfigError::Invalid(format!(
                "sessions.queue_capacity must be between 1 and {MAX_QUEUE_CAPACITY}"
            )));
        }
        if self.max_inflight == 0 || self.max_inflight > MAX_INFLIGHT_LIMIT {
            return Err(ConfigError::Invalid(format!(
                "sessions.max_inflight must be between 1 and {MAX_INFLIGHT_LIMIT}"
            )));
        }
        if self.max_request_ids < self.max_inflight || self.max_request_ids > MAX_REQUEST_IDS_LIMIT
        {
            return Err(ConfigError::Invalid(format!(
                "sessions.max_request_ids must be between max_inflight and {MAX_REQUEST_IDS_LIMIT}"
            )));
        }
        Ok(())
    }
}

/// Audit sink configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerAuditConfig {
    /// Enable audit events.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Optional JSONL file path (stderr when unset).
    #[serde(default)]
    pub path: Option<String>,
}

impl Default for ServerAuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
        }
    }
}

impl ServerAuditConfig {
    /// Validates audit configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(path) = &self.path {
            validate_path_string("server.audit.path", path)?;
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Backend
// ============================================================================

/// Downstream record API configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    /// Instance base URL (e.g. `https://instance.service-now.com`).
    #[serde(default)]
    pub instance_url: String,
    /// Table holding the managed records.
    #[serde(default = "default_table")]
    pub table: String,
    /// Per-request timeout in milliseconds.
    #[serde(default = "default_backend_timeout_ms")]
    pub timeout_ms: u64,
    /// Maximum response body size accepted from the backend.
    #[serde(default = "default_max_response_bytes")]
    pub max_response_bytes: usize,
    /// Allow cleartext `http://` instance URLs.
    #[serde(default)]
    pub allow_http: bool,
    /// User agent for outbound requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Credentials used for every backend call.
    #[serde(default)]
    pub auth: BackendAuthConfig,
    /// Retry policy for transient failures.
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            instance_url: String::new(),
            table: default_table(),
            timeout_ms: default_backend_timeout_ms(),
            max_response_bytes: default_max_response_bytes(),
            allow_http: false,
            user_agent: default_user_agent(),
            auth: BackendAuthConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl BackendConfig {
    /// Validates backend configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        let trimmed = self.instance_url.trim();
        if trimmed.is_empty() {
            return Err(ConfigError::Invalid(
                "backend.instance_url is required (or SERVICENOW_INSTANCE_URL)".to_string(),
            ));
        }
        let url = Url::parse(trimmed)
            .map_err(|_| ConfigError::Invalid("backend.instance_url is not a url".to_string()))?;
        match url.scheme() {
            "https" => {}
            "http" if self.allow_http => {}
            "http" => {
                return Err(ConfigError::Invalid(
                    "backend.instance_url uses http:// without allow_http".to_string(),
                ));
            }
            _ => {
                return Err(ConfigError::Invalid(
                    "backend.instance_url must use http:// or https://".to_string(),
                ));
            }
        }
        if !url.username().is_empty() || url.password().is_some() {
            return Err(ConfigError::Invalid(
                "backend.instance_url must not embed credentials".to_string(),
            ));
        }
        if self.table.is_empty()
            || !self.table.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
        {
            return Err(ConfigError::Invalid(
                "backend.table must be a non-empty identifier".to_string(),
            ));
        }
        if !(MIN_BACKEND_TIMEOUT_MS..=MAX_BACKEND_TIMEOUT_MS).contains(&self.timeout_ms) {
            return Err(ConfigError::Invalid(format!(
                "backend.timeout_ms must be between {MIN_BACKEND_TIMEOUT_MS} and \
                 {MAX_BACKEND_TIMEOUT_MS}"
            )));
        }
        if self.max_response_bytes == 0 || self.max_response_bytes > MAX_RESPONSE_BYTES_LIMIT {
            return Err(ConfigError::Invalid(format!(
                "backend.max_response_bytes must be between 1 and {MAX_RESPONSE_BYTES_LIMIT}"
            )));
        }
        if self.user_agent.trim().is_empty() {
            return Err(ConfigError::Invalid("backend.user_agent must be non-empty".to_string()));
        }
        self.auth.validate()?;
        self.retry.validate()
    }
}

/// Backend credential configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackendAuthConfig {
    /// HTTP basic authentication.
    Basic {
        /// Account name.
        #[serde(default)]
        username: String,
        /// Account password.
        #[serde(default)]
        password: Secret,
    },
    /// Static API key sent in a custom header.
    ApiKey {
        /// API key value.
        #[serde(default)]
        api_key: Secret,
        /// Header carrying the key.
        #[serde(default = "default_api_key_header")]
        header_name: String,
    },
    /// OAuth password grant.
    #[serde(rename = "oauth")]
    OAuth {
        /// OAuth client identifier.
        #[serde(default)]
        client_id: String,
        /// OAuth client secret.
        #[serde(default)]
        client_secret: Secret,
        /// Resource owner name.
        #[serde(default)]
        username: String,
        /// Resource owner password.
        #[serde(default)]
        password: Secret,
        /// Token endpoint (defaults to `{instance_url}/oauth_token.do`).
        #[serde(default)]
        token_url: Option<String>,
    },
}

impl Default for BackendAuthConfig {
    fn default() -> Self {
        Self::Basic {
            username: String::new(),
            password: Secret::default(),
        }
    }
}

impl BackendAuthConfig {
    /// Returns a stable label for the credential type.
    #[must_use]
    pub const fn kind_label(&self) -> &'static str {
        match self {
            Self::Basic {
                ..
            } => "basic",
            Self::ApiKey {
                ..
            } => "api_key",
            Self::OAuth {
                ..
            } => "oauth",
        }
    }

    /// Validates that required credential fields are present.
    fn validate(&self) -> Result<(), ConfigError> {
        match self {
            Self::Basic {
                username,
                password,
            } => {
                if username.trim().is_empty() || password.is_blank() {
                    return Err(ConfigError::Invalid(
                        "basic auth requires username and password".to_string(),
                    ));
                }
            }
            Self::ApiKey {
                api_key,
                header_name,
            } => {
                if api_key.is_blank() {
                    return Err(ConfigError::Invalid("api_key auth requires api_key".to_string()));
                }
                if header_name.trim().is_empty() {
                    return Err(ConfigError::Invalid(
                        "api_key auth requires header_name".to_string(),
                    ));
                }
            }
            Self::OAuth {
                client_id,
                client_secret,
                username,
                password,
                token_url,
            } => {
                if client_id.trim().is_empty()
                    || client_secret.is_blank()
                    || username.trim().is_empty()
                    || password.is_blank()
                {
                    return Err(ConfigError::Invalid(
                        "oauth auth requires client_id, client_secret, username, and password"
                            .to_string(),
                    ));
                }
                if let Some(token_url) = token_url {
                    Url::parse(token_url.trim()).map_err(|_| {
                        ConfigError::Invalid("oauth token_url is not a url".to_string())
                    })?;
                }
            }
        }
        Ok(())
    }
}

/// Retry policy for transient backend failures.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per call, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Backoff before the second attempt.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// Upper bound for any single backoff.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl RetryConfig {
    /// Validates retry bounds.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 || self.max_attempts > MAX_RETRY_ATTEMPTS {
            return Err(ConfigError::Invalid(format!(
                "backend.retry.max_attempts must be between 1 and {MAX_RETRY_ATTEMPTS}"
            )));
        }
        if self.initial_backoff_ms > self.max_backoff_ms {
            return Err(ConfigError::Invalid(
                "backend.retry.initial_backoff_ms must not exceed max_backoff_ms".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Catalog
// ============================================================================

/// Tool catalog configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogConfig {
    /// Optional external catalog file; the built-in catalog is used otherwise.
    #[serde(default)]
    pub path: Option<String>,
    /// Package used when a handshake does not request one.
    #[serde(default = "default_package")]
    pub default_package: String,
    /// Reject unknown tool arguments instead of ignoring them.
    #[serde(default)]
    pub strict_arguments: bool,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            path: None,
            default_package: default_package(),
            strict_arguments: false,
        }
    }
}

impl CatalogConfig {
    /// Validates catalog selection.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.default_package.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "catalog.default_package must be non-empty".to_string(),
            ));
        }
        if let Some(path) = &self.path {
            validate_path_string("catalog.path", path)?;
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Health
// ============================================================================

/// Health monitor configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct HealthConfig {
    /// Timeout for the readiness backend probe.
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    /// Interval between background reachability probes (0 disables).
    #[serde(default = "default_probe_interval_ms")]
    pub probe_interval_ms: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            probe_timeout_ms: default_probe_timeout_ms(),
            probe_interval_ms: default_probe_interval_ms(),
        }
    }
}

impl HealthConfig {
    /// Validates health probe timing.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.probe_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "health.probe_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Access
// ============================================================================

/// Package access policy keyed by caller identity.
#[derive(Debug, Clone, Deserialize)]
pub struct AccessConfig {
    /// Whether identities without a grant (and anonymous callers) may open
    /// any package.
    #[serde(default = "default_true")]
    pub allow_unlisted: bool,
    /// Explicit per-identity package grants.
    #[serde(default)]
    pub grants: Vec<AccessGrant>,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            allow_unlisted: true,
            grants: Vec::new(),
        }
    }
}

impl AccessConfig {
    /// Validates access grants.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.grants.len() > MAX_ACCESS_GRANTS {
            return Err(ConfigError::Invalid("too many access grants".to_string()));
        }
        for grant in &self.grants {
            if grant.identity.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "access grant identity must be non-empty".to_string(),
                ));
            }
            if grant.packages.iter().any(|package| package.trim().is_empty()) {
                return Err(ConfigError::Invalid(format!(
                    "access grant for {} lists an empty package",
                    grant.identity
                )));
            }
        }
        Ok(())
    }
}

/// Packages an identity may open.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AccessGrant {
    /// Caller identity as attached by the identity service.
    pub identity: String,
    /// Package names the identity may select.
    #[serde(default)]
    pub packages: Vec<String>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Defaults
// ============================================================================

/// Default max body bytes.
const fn default_max_body_bytes() -> usize {
    1024 * 1024
}

/// Default log level.
fn default_log_level() -> String {
    "info".to_string()
}

/// Default idle timeout ms.
const fn default_idle_timeout_ms() -> u64 {
    15 * 60 * 1_000
}

/// Default sweep interval ms.
const fn default_sweep_interval_ms() -> u64 {
    30_000
}

/// Default drain grace ms.
const fn default_drain_grace_ms() -> u64 {
    10_000
}

/// Default heartbeat interval ms.
const fn default_heartbeat_interval_ms() -> u64 {
    30_000
}

/// Default queue capacity.
const fn default_queue_capacity() -> usize {
    256
}

/// Default max inflight.
const fn default_max_inflight() -> usize {
    64
}

/// Default request identifiers per session.
const fn default_max_request_ids() -> usize {
    65_536
}

/// Default max backend response bytes.
const fn default_max_response_bytes() -> usize {
    4 * 1024 * 1024
}

/// Serde default for flags that start enabled.
const fn default_true() -> bool {
    true
}

/// Default table.
fn default_table() -> String {
    "incident".to_string()
}

/// Default backend timeout ms.
const fn default_backend_timeout_ms() -> u64 {
    30_000
}

/// Default user agent.
fn default_user_agent() -> String {
    format!("incident-gate/{}", env!("CARGO_PKG_VERSION"))
}

/// Default api key header.
fn default_api_key_header() -> String {
    DEFAULT_API_KEY_HEADER.to_string()
}

/// Default max attempts.
const fn default_max_attempts() -> u32 {
    3
}

/// Default initial backoff ms.
const fn default_initial_backoff_ms() -> u64 {
    200
}

/// Default max backoff ms.
const fn default_max_backoff_ms() -> u64 {
    5_000
}

/// Default package.
fn default_package() -> String {
    DEFAULT_PACKAGE.to_string()
}

/// Default probe timeout ms.
const fn default_probe_timeout_ms() -> u64 {
    2_000
}

/// Default probe interval ms.
const fn default_probe_interval_ms() -> u64 {
    15_000
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from CLI, environment, or the default filename.
///
/// Returns `None` when nothing was named and the default file does not exist.
fn resolve_path(path: Option<&Path>, env: &dyn EnvLookup) -> Result<Option<PathBuf>, ConfigError> {
    if let Some(path) = path {
        return Ok(Some(path.to_path_buf()));
    }
    if let Some(env_path) = env.var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(Some(PathBuf::from(env_path)));
    }
    let default = PathBuf::from(DEFAULT_CONFIG_NAME);
    Ok(default.is_file().then_some(default))
}

/// Validates the resolved path against security limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a path string against length constraints.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in Path::new(trimmed).components() {
        if component.as_os_str().to_string_lossy().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================
