//! Form-encoded token endpoint requests
//!
//! One POST per grant: password, client_credentials, authorization_code
//! and refresh_token, plus best-effort RFC 7009 revocation. A non-2xx
//! response with a JSON error body surfaces as [`OAuthError::Denied`]
//! carrying the server's `error` / `error_description` so callers can
//! turn it into a denied token.

use crate::config::ResolvedConfig;
use crate::error::{OAuthError, OAuthResult};
use crate::token::OAuthToken;

/// Token endpoint client for the grant flows
#[derive(Debug, Clone)]
pub struct TokenGrants {
    http: reqwest::Client,
    config: ResolvedConfig,
}

impl TokenGrants {
    /// Create a grants client over an effective configuration
    pub fn new(http: reqwest::Client, config: ResolvedConfig) -> Self {
        Self { http, config }
    }

    /// Resource-owner password credentials grant
    pub async fn password(&self, username: &str, password: &str) -> OAuthResult<OAuthToken> {
        let mut form = self.base_form("password");
        if let Some(scope) = &self.config.scope {
            form.push(("scope", scope.clone()));
        }
        form.push(("username", username.to_string()));
        form.push(("password", password.to_string()));
        self.post_token(form).await
    }

    /// Client credentials grant
    pub async fn client_credentials(&self) -> OAuthResult<OAuthToken> {
        let mut form = self.base_form("client_credentials");
        if let Some(scope) = &self.config.scope {
            form.push(("scope", scope.clone()));
        }
        self.post_token(form).await
    }

    /// Exchange an authorization code for a token
    pub async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
        code_verifier: Option<&str>,
    ) -> OAuthResult<OAuthToken> {
        let mut form = self.base_form("authorization_code");
        form.push(("code", code.to_string()));
        form.push(("redirect_uri", redirect_uri.to_string()));
        if let Some(scope) = &self.config.scope {
            form.push(("scope", scope.clone()));
        }
        if let Some(verifier) = code_verifier {
            form.push(("code_verifier", verifier.to_string()));
        }
        self.post_token(form).await
    }

    /// Refresh-token grant
    pub async fn refresh(&self, refresh_token: &str) -> OAuthResult<OAuthToken> {
        let mut form = self.base_form("refresh_token");
        form.push(("refresh_token", refresh_token.to_string()));
        if let Some(scope) = &self.config.scope {
            form.push(("scope", scope.clone()));
        }
        self.post_token(form)
            .await
            .map_err(|e| OAuthError::token_refresh_failed(e.to_string()))
    }

    /// Revoke a single token part with its `token_type_hint`
    ///
    /// No-op when no revocation endpoint is configured. Failures are
    /// reported as errors for the caller to swallow.
    pub async fn revoke(&self, token: &str, token_type_hint: &str) -> OAuthResult<()> {
        let Some(revoke_path) = self.config.revoke_path.as_deref() else {
            return Ok(());
        };

        let mut form = vec![("client_id", self.config.client_id.clone())];
        if let Some(secret) = &self.config.client_secret {
            form.push(("client_secret", secret.clone()));
        }
        form.push(("token", token.to_string()));
        form.push(("token_type_hint", token_type_hint.to_string()));

        let response = self.http.post(revoke_path).form(&form).send().await?;
        if !response.status().is_success() {
            return Err(OAuthError::token_exchange_failed(format!(
                "revocation returned HTTP {}",
                response.status()
            )));
        }
        Ok(())
    }

    fn base_form(&self, grant_type: &str) -> Vec<(&'static str, String)> {
        let mut form = vec![
            ("grant_type", grant_type.to_string()),
            ("client_id", self.config.client_id.clone()),
        ];
        if let Some(secret) = &self.config.client_secret {
            form.push(("client_secret", secret.clone()));
        }
        form
    }

    async fn post_token(&self, form: Vec<(&'static str, String)>) -> OAuthResult<OAuthToken> {
        let token_path = self.config.require_token_path()?;
        let response = self.http.post(token_path).form(&form).send().await?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            // Token endpoints return {"error": ..., "error_description": ...}
            // on 4xx; preserve those fields for the denied token.
            if let Ok(error_token) = serde_json::from_str::<OAuthToken>(&body)
                && let Some(error) = error_token.error
            {
                return Err(OAuthError::denied(error, error_token.error_description));
            }
            return Err(OAuthError::token_exchange_failed(format!(
                "HTTP {status}: {body}"
            )));
        }

        serde_json::from_str::<OAuthToken>(&body).map_err(|e| {
            OAuthError::token_exchange_failed(format!("failed to parse token response: {e}"))
        })
    }
}
