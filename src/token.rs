//! The persisted credential bundle and the authorization status derived
//! from it
//!
//! A token with `error` set never authorizes. Status is always derived
//! from the current token, never stored on its own.

use crate::config::GrantType;
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

/// Authorization status derived from the current token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthorizationStatus {
    /// No usable token
    NotAuthorized,
    /// The current token carries an access token
    Authorized,
    /// The authorization server explicitly denied access
    Denied,
}

/// The OAuth token bundle as received from the authorization server
///
/// Replaced wholesale on every successful flow step, refresh and logout.
/// `expires` is derived from `expires_in` at store-write time; `nonce`
/// and `code_verifier` are transient values stashed while a redirect
/// flow is in progress.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OAuthToken {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    /// Token lifetime in seconds, as received
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "number_or_string"
    )]
    pub expires_in: Option<i64>,
    /// Absolute expiry in epoch milliseconds, computed at write time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// Nonce stashed when an `openid` authorization URL was built
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    /// PKCE verifier stashed until the code exchange
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_verifier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
    /// Which grant flow produced this token
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub grant: Option<GrantType>,
    /// Any further fields the server returned
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl OAuthToken {
    /// Build an error token from server `error` / `error_description`
    pub fn from_error(error: impl Into<String>, description: Option<String>) -> Self {
        Self {
            error: Some(error.into()),
            error_description: description,
            ..Self::default()
        }
    }

    /// Build a token from parsed redirect parameters
    pub fn from_params(params: &HashMap<String, String>) -> Self {
        let get = |key: &str| params.get(key).cloned();
        Self {
            access_token: get("access_token"),
            id_token: get("id_token"),
            token_type: get("token_type"),
            expires_in: get("expires_in").and_then(|v| v.parse().ok()),
            scope: get("scope"),
            state: get("state"),
            error: get("error"),
            error_description: get("error_description"),
            ..Self::default()
        }
    }

    /// Whether this is the cleared (logged-out) token
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Derive the authorization status
    pub fn status(&self) -> AuthorizationStatus {
        let has_access = self.access_token.as_deref().is_some_and(|t| !t.is_empty());
        let has_error = self.error.as_deref().is_some_and(|e| !e.is_empty());
        if has_access {
            AuthorizationStatus::Authorized
        } else if has_error {
            AuthorizationStatus::Denied
        } else {
            AuthorizationStatus::NotAuthorized
        }
    }

    /// Whether the token has expired by `now` (epoch milliseconds)
    ///
    /// A token without an `expires` value never expires; `expires_in = 0`
    /// produces an `expires` equal to its write time, so it reads as
    /// already expired.
    pub fn is_expired(&self, now_millis: i64) -> bool {
        self.expires.is_some_and(|expires| now_millis >= expires)
    }

    /// Overlay `patch` on top of this token, field by field
    ///
    /// A refresh response usually omits the refresh token itself; the
    /// overlay keeps whatever the patch does not replace.
    pub fn merged(&self, patch: Self) -> Self {
        let mut extra = self.extra.clone();
        extra.extend(patch.extra);
        Self {
            access_token: patch.access_token.or_else(|| self.access_token.clone()),
            refresh_token: patch.refresh_token.or_else(|| self.refresh_token.clone()),
            id_token: patch.id_token.or_else(|| self.id_token.clone()),
            token_type: patch.token_type.or_else(|| self.token_type.clone()),
            expires_in: patch.expires_in.or(self.expires_in),
            expires: patch.expires.or(self.expires),
            scope: patch.scope.or_else(|| self.scope.clone()),
            state: patch.state.or_else(|| self.state.clone()),
            nonce: patch.nonce.or_else(|| self.nonce.clone()),
            code_verifier: patch.code_verifier.or_else(|| self.code_verifier.clone()),
            error: patch.error.or_else(|| self.error.clone()),
            error_description: patch
                .error_description
                .or_else(|| self.error_description.clone()),
            grant: patch.grant.or(self.grant),
            extra,
        }
    }

    /// The nonce claim embedded in the ID token, if any
    pub fn id_token_nonce(&self) -> Option<String> {
        let claims = decode_jwt_claims(self.id_token.as_deref()?)?;
        claims.get("nonce")?.as_str().map(str::to_string)
    }
}

/// Decode the payload segment of a JWT without verifying its signature
///
/// Only used to read the nonce claim back out of an ID token; signature
/// verification belongs to the authorization server relationship, not to
/// this client engine.
pub fn decode_jwt_claims(jwt: &str) -> Option<serde_json::Value> {
    let payload = jwt.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload).ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// Standard OIDC userinfo claims
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub given_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub family_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn number_or_string<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    match value {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::Number(n)) => Ok(n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))),
        Some(serde_json::Value::String(s)) => Ok(s.parse().ok()),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected number or string for expires_in, got {other}"
        ))),
    }
}
