//! OpenID Connect discovery and configuration resolution
//!
//! When the caller supplies only an `issuer_path`, the engine fetches
//! `{issuer}/.well-known/openid-configuration` once and merges the
//! advertised endpoints into the effective configuration. Explicitly
//! supplied values always win over discovered ones. A failed discovery
//! fetch is fatal to resolution: a half-configured client is worse than
//! a loud startup error.

use crate::config::{FlowConfig, ResolvedConfig};
use crate::error::{OAuthError, OAuthResult};
use serde::{Deserialize, Serialize};

/// The discovery document fields this engine consumes
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpenIdConfiguration {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization_endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revocation_endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub userinfo_endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub introspection_endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_session_endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scopes_supported: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_challenge_methods_supported: Option<Vec<String>>,
}

/// Resolve the effective configuration, running discovery when an
/// issuer is configured
///
/// Without `issuer_path` the configuration passes through unchanged.
/// The caller-supplied value is never mutated; resolution produces a
/// fresh immutable [`ResolvedConfig`].
pub async fn resolve(config: &FlowConfig, http: &reqwest::Client) -> OAuthResult<ResolvedConfig> {
    let Some(issuer) = config.issuer_path.as_deref() else {
        return Ok(ResolvedConfig::new(config.clone()));
    };

    let url = format!(
        "{}/.well-known/openid-configuration",
        issuer.trim_end_matches('/')
    );
    let response = http
        .get(&url)
        .send()
        .await
        .map_err(|e| OAuthError::discovery(format!("GET {url} failed: {e}")))?;

    if !response.status().is_success() {
        return Err(OAuthError::discovery(format!(
            "GET {url} returned HTTP {}",
            response.status()
        )));
    }

    let document: OpenIdConfiguration = response
        .json()
        .await
        .map_err(|e| OAuthError::discovery(format!("invalid discovery document: {e}")))?;

    Ok(ResolvedConfig::new(merge(config, &document)))
}

/// Merge a discovery document into the unset fields of a configuration
fn merge(config: &FlowConfig, document: &OpenIdConfiguration) -> FlowConfig {
    let mut merged = config.clone();

    let fill = |slot: &mut Option<String>, discovered: &Option<String>| {
        if slot.is_none() {
            *slot = discovered.clone();
        }
    };
    fill(&mut merged.authorize_path, &document.authorization_endpoint);
    fill(&mut merged.token_path, &document.token_endpoint);
    fill(&mut merged.revoke_path, &document.revocation_endpoint);
    fill(&mut merged.user_path, &document.userinfo_endpoint);
    fill(
        &mut merged.introspection_path,
        &document.introspection_endpoint,
    );
    fill(&mut merged.logout_path, &document.end_session_endpoint);

    if let Some(methods) = &document.code_challenge_methods_supported {
        merged.pkce = methods.iter().any(|m| m == "S256");
    }
    if merged.scope.is_none() {
        merged.scope = Some("openid".to_string());
    }

    merged
}
