//! OAuth error types

use thiserror::Error;

/// Errors that can occur during OAuth operations
#[derive(Error, Debug)]
pub enum OAuthError {
    /// Required configuration value is missing
    #[error("Missing configuration value: {0}")]
    MissingConfig(&'static str),

    /// OpenID Connect discovery failed. This is a configuration-time
    /// fatal condition, not a runtime auth failure.
    #[error("OpenID discovery failed: {0}")]
    Discovery(String),

    /// The authorization server returned an explicit error
    #[error("Authorization denied: {error}")]
    Denied {
        /// The `error` field from the server response
        error: String,
        /// The optional `error_description` field
        error_description: Option<String>,
    },

    /// Token exchange failed
    #[error("Token exchange failed: {0}")]
    TokenExchangeFailed(String),

    /// Token refresh failed
    #[error("Token refresh failed: {0}")]
    TokenRefreshFailed(String),

    /// The nonce embedded in the ID token did not match the stored nonce
    #[error("Nonce mismatch in ID token - possible token substitution")]
    NonceMismatch,

    /// The login parameters do not match the configured grant type
    #[error("Login parameters do not match grant type {0}")]
    ParameterMismatch(&'static str),

    /// No access token is available for an authorized-only operation
    #[error("No access token available")]
    NotAuthorized,

    /// Invalid header value
    #[error("Invalid header value")]
    InvalidHeader,

    /// HTTP request error
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// JSON parsing error
    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// File I/O error
    #[error("File I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl OAuthError {
    /// Create a discovery error
    pub fn discovery(msg: impl Into<String>) -> Self {
        Self::Discovery(msg.into())
    }

    /// Create a denied error from server `error` / `error_description` fields
    pub fn denied(error: impl Into<String>, description: Option<String>) -> Self {
        Self::Denied {
            error: error.into(),
            error_description: description,
        }
    }

    /// Create a token exchange failed error
    pub fn token_exchange_failed(msg: impl Into<String>) -> Self {
        Self::TokenExchangeFailed(msg.into())
    }

    /// Create a token refresh failed error
    pub fn token_refresh_failed(msg: impl Into<String>) -> Self {
        Self::TokenRefreshFailed(msg.into())
    }
}

/// Result type alias for OAuth operations
pub type OAuthResult<T> = Result<T, OAuthError>;
