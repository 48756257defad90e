//! OAuth configuration types
//!
//! `FlowConfig` is the caller-supplied configuration bag. It either names
//! the endpoints explicitly or carries an `issuer_path` for OpenID
//! discovery. `ResolvedConfig` is the immutable result of resolution
//! (see [`crate::discovery`]); the engine only ever reads from it.

use crate::error::{OAuthError, OAuthResult};
use serde::{Deserialize, Serialize};

/// The OAuth 2.0 grant type driving the engine
///
/// The serialized names double as the wire values: `password` and
/// `client_credentials` are `grant_type` values, `code` and `token` are
/// `response_type` values for the redirect-based flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GrantType {
    /// Resource-owner password credentials grant
    #[serde(rename = "password")]
    Resource,
    /// Authorization code grant (optionally with PKCE)
    #[serde(rename = "code")]
    AuthorizationCode,
    /// Implicit grant
    #[serde(rename = "token")]
    Implicit,
    /// Client credentials grant
    #[serde(rename = "client_credentials")]
    ClientCredential,
}

impl GrantType {
    /// The wire value for this grant type
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Resource => "password",
            Self::AuthorizationCode => "code",
            Self::Implicit => "token",
            Self::ClientCredential => "client_credentials",
        }
    }
}

impl std::fmt::Display for GrantType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-grant-type flow configuration
///
/// Exactly one of `issuer_path` or the explicit endpoint paths is
/// expected. When `issuer_path` is set, discovery fills in whatever the
/// caller left unset; explicitly supplied values always win.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlowConfig {
    /// OAuth client ID
    pub client_id: String,
    /// Optional client secret for confidential clients
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    /// OpenID issuer base URL for discovery
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer_path: Option<String>,
    /// Authorization endpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorize_path: Option<String>,
    /// Token endpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_path: Option<String>,
    /// Token revocation endpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revoke_path: Option<String>,
    /// Userinfo endpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_path: Option<String>,
    /// Token introspection endpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub introspection_path: Option<String>,
    /// End-session endpoint for RP-initiated logout
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logout_path: Option<String>,
    /// Where the authorization server should send the user after logout
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logout_redirect_uri: Option<String>,
    /// Scopes to request, space separated
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Whether to use PKCE for the authorization code flow
    #[serde(default)]
    pub pkce: bool,
}

impl FlowConfig {
    /// Create a configuration with just a client ID; endpoints are filled
    /// in with the builder-style setters or by discovery.
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            ..Self::default()
        }
    }
}

/// Top-level engine configuration
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    /// The grant type the engine drives
    pub grant_type: GrantType,
    /// Flow configuration (explicit endpoints or issuer)
    pub config: FlowConfig,
    /// Storage key under which the token is persisted
    pub storage_key: String,
    /// URL patterns the request decorator must not touch
    pub ignore_paths: Vec<String>,
}

impl OAuthConfig {
    /// Create an engine configuration with the default storage key
    pub fn new(grant_type: GrantType, config: FlowConfig) -> Self {
        Self {
            grant_type,
            config,
            storage_key: "token".to_string(),
            ignore_paths: Vec::new(),
        }
    }
}

/// The effective configuration after (optional) discovery
///
/// Produced exactly once at engine construction and never mutated; the
/// caller-supplied [`FlowConfig`] is left untouched.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    inner: FlowConfig,
}

impl ResolvedConfig {
    pub(crate) fn new(inner: FlowConfig) -> Self {
        Self { inner }
    }

    /// The token endpoint, or an error when the flow requires one
    pub fn require_token_path(&self) -> OAuthResult<&str> {
        self.inner
            .token_path
            .as_deref()
            .ok_or(OAuthError::MissingConfig("token_path"))
    }

    /// The authorization endpoint, or an error when the flow requires one
    pub fn require_authorize_path(&self) -> OAuthResult<&str> {
        self.inner
            .authorize_path
            .as_deref()
            .ok_or(OAuthError::MissingConfig("authorize_path"))
    }
}

impl std::ops::Deref for ResolvedConfig {
    type Target = FlowConfig;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}
