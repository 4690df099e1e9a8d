// crates/incident-gate-backend/src/auth.rs
// ============================================================================
// Module: Backend Credentials
// Description: Request authentication for the record API.
// Purpose: Attach basic, API key, or OAuth bearer credentials to requests.
// Dependencies: reqwest, tokio, url, incident-gate-config
// ============================================================================

//! ## Overview
//! [`Credentials`] are built once from configuration and shared read-only by
//! every request. OAuth uses the password grant; the access token is cached
//! until shortly before expiry and can be invalidated after a 401 so the next
//! attempt fetches a fresh one.
//!
//! Security posture: secrets are held in [`Secret`] and never formatted into
//! errors or logs.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::time::Duration;
use std::time::Instant;

use incident_gate_config::BackendAuthConfig;
use incident_gate_config::Secret;
use reqwest::Client;
use reqwest::RequestBuilder;
use reqwest::header::CONTENT_TYPE;
use reqwest::header::HeaderName;
use reqwest::header::HeaderValue;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;
use url::Url;
use url::form_urlencoded;

use crate::error::BackendError;
use crate::error::classify_status;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Token endpoint path relative to the instance URL.
const DEFAULT_TOKEN_PATH: &str = "oauth_token.do";
/// Refresh tokens this long before the reported expiry.
const TOKEN_EXPIRY_SKEW: Duration = Duration::from_secs(30);

// ============================================================================
// SECTION: Credentials
// ============================================================================

/// Credentials attached to every backend request.
pub enum Credentials {
    /// HTTP basic authentication.
    Basic {
        /// Account name.
        username: String,
        /// Account password.
        password: Secret,
    },
    /// Static key in a custom header.
    ApiKey {
        /// Header carrying the key.
        header: HeaderName,
        /// Sensitive header value.
        value: HeaderValue,
    },
    /// OAuth password grant with a cached bearer token.
    OAuth(OAuthTokenSource),
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Basic {
                username, ..
            } => f.debug_struct("Basic").field("username", username).finish_non_exhaustive(),
            Self::ApiKey {
                header, ..
            } => f.debug_struct("ApiKey").field("header", header).finish_non_exhaustive(),
            Self::OAuth(source) => {
                f.debug_struct("OAuth").field("token_url", &source.token_url.as_str()).finish()
            }
        }
    }
}

impl Credentials {
    /// Builds credentials from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::InvalidArgument`] when a header name, header
    /// value, or token URL is malformed.
    pub fn from_config(
        config: &BackendAuthConfig,
        instance_url: &Url,
    ) -> Result<Self, BackendError> {
        match config {
            BackendAuthConfig::Basic {
                username,
                password,
            } => Ok(Self::Basic {
                username: username.clone(),
                password: password.clone(),
            }),
            BackendAuthConfig::ApiKey {
                api_key,
                header_name,
            } => {
                let header = HeaderName::from_bytes(header_name.trim().as_bytes()).map_err(|_| {
                    BackendError::InvalidArgument("invalid api key header name".to_string())
                })?;
                let mut value = HeaderValue::from_str(api_key.expose()).map_err(|_| {
                    BackendError::InvalidArgument("invalid api key value".to_string())
                })?;
                value.set_sensitive(true);
                Ok(Self::ApiKey {
                    header,
                    value,
                })
            }
            BackendAuthConfig::OAuth {
                client_id,
                client_secret,
                username,
                password,
                token_url,
            } => {
                let token_url = match token_url {
                    Some(raw) => Url::parse(raw.trim()),
                    None => instance_url.join(DEFAULT_TOKEN_PATH),
                }
                .map_err(|_| BackendError::InvalidArgument("invalid oauth token url".to_string()))?;
                Ok(Self::OAuth(OAuthTokenSource {
                    token_url,
                    client_id: client_id.clone(),
                    client_secret: client_secret.clone(),
                    username: username.clone(),
                    password: password.clone(),
                    cached: Mutex::new(None),
                }))
            }
        }
    }

    /// Attaches credentials to a request.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] when an OAuth token cannot be obtained.
    pub async fn apply(
        &self,
        client: &Client,
        request: RequestBuilder,
    ) -> Result<RequestBuilder, BackendError> {
        match self {
            Self::Basic {
                username,
                password,
            } => Ok(request.basic_auth(username, Some(password.expose()))),
            Self::ApiKey {
                header,
                value,
            } => Ok(request.header(header.clone(), value.clone())),
            Self::OAuth(source) => {
                let token = source.token(client).await?;
                Ok(request.bearer_auth(token.expose()))
            }
        }
    }

    /// Drops any cached token; returns true when a fresh attempt may succeed.
    pub async fn invalidate(&self) -> bool {
        match self {
            Self::OAuth(source) => {
                *source.cached.lock().await = None;
                true
            }
            Self::Basic {
                ..
            }
            | Self::ApiKey {
                ..
            } => false,
        }
    }
}

// ============================================================================
// SECTION: OAuth
// ============================================================================

/// Password-grant token source.
pub struct OAuthTokenSource {
    /// Token endpoint.
    token_url: Url,
    /// Client identifier.
    client_id: String,
    /// Client secret.
    client_secret: Secret,
    /// Resource owner.
    username: String,
    /// Resource owner password.
    password: Secret,
    /// Cached token; the lock also serializes refreshes.
    cached: Mutex<Option<CachedToken>>,
}

/// Cached bearer token.
struct CachedToken {
    /// Bearer token.
    access_token: Secret,
    /// Refresh deadline, if the server reported a lifetime.
    refresh_at: Option<Instant>,
}

/// Token endpoint response.
#[derive(Deserialize)]
struct TokenResponse {
    /// Bearer token.
    access_token: String,
    /// Lifetime in seconds.
    #[serde(default)]
    expires_in: Option<u64>,
}

impl OAuthTokenSource {
    /// Returns a valid access token, fetching one when needed.
    async fn token(&self, client: &Client) -> Result<Secret, BackendError> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref()
            && token.refresh_at.is_none_or(|deadline| Instant::now() < deadline)
        {
            return Ok(token.access_token.clone());
        }
        let fetched = self.fetch(client).await?;
        let token = fetched.access_token.clone();
        *cached = Some(fetched);
        Ok(token)
    }

    /// Performs the password grant.
    async fn fetch(&self, client: &Client) -> Result<CachedToken, BackendError> {
        debug!(token_url = %self.token_url, "requesting oauth token");
        let body = form_urlencoded::Serializer::new(String::new())
            .append_pair("grant_type", "password")
            .append_pair("client_id", &self.client_id)
            .append_pair("client_secret", self.client_secret.expose())
            .append_pair("username", &self.username)
            .append_pair("password", self.password.expose())
            .finish();
        let response = client
            .post(self.token_url.clone())
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await
            .map_err(|err| BackendError::Unavailable(format!("token request failed: {err}")))?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                400 | 401 | 403 => {
                    BackendError::Unauthorized("oauth token request rejected".to_string())
                }
                code => classify_status(code, &text, None),
            });
        }
        let parsed: TokenResponse = response
            .json()
            .await
            .map_err(|_| BackendError::Unknown("malformed oauth token response".to_string()))?;
        let refresh_at = parsed.expires_in.map(|seconds| {
            Instant::now() + Duration::from_secs(seconds).saturating_sub(TOKEN_EXPIRY_SKEW)
        });
        Ok(CachedToken {
            access_token: Secret::new(parsed.access_token),
            refresh_at,
        })
    }
}
