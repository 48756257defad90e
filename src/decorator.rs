//! Outgoing-request decoration with the current bearer token
//!
//! The decorator reads the current valid token (triggering a transparent
//! refresh when the stored one has expired) and sets the `Authorization`
//! header, unless the target URL matches one of the configured ignore
//! patterns. A 401 response on a non-ignored URL invalidates the shared
//! token; the HTTP error itself is never swallowed here.

use crate::grants::TokenGrants;
use crate::store::TokenStore;
use crate::token::OAuthToken;
use regex::Regex;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use std::sync::Arc;

/// Attaches bearer headers and reacts to 401 responses
pub struct AuthDecorator {
    store: Arc<TokenStore>,
    grants: Arc<TokenGrants>,
    ignore_patterns: Vec<Regex>,
}

impl AuthDecorator {
    /// Build a decorator over a token store
    ///
    /// Malformed ignore patterns are skipped with a warning so one bad
    /// entry never disables the matching of the rest.
    pub fn new(store: Arc<TokenStore>, grants: Arc<TokenGrants>, ignore_paths: &[String]) -> Self {
        let ignore_patterns = ignore_paths
            .iter()
            .filter_map(|pattern| match Regex::new(pattern) {
                Ok(re) => Some(re),
                Err(e) => {
                    tracing::warn!("Skipping malformed ignore pattern {:?}: {}", pattern, e);
                    None
                }
            })
            .collect();
        Self {
            store,
            grants,
            ignore_patterns,
        }
    }

    /// Whether a URL is excluded from decoration
    pub fn is_ignored(&self, url: &str) -> bool {
        self.ignore_patterns.iter().any(|re| re.is_match(url))
    }

    /// Set the `Authorization` header for a request to `url`
    ///
    /// No-op for ignored URLs and when no access token is available.
    /// An expired stored token is refreshed before the header is built.
    pub async fn decorate(&self, url: &str, headers: &mut HeaderMap) {
        if self.is_ignored(url) {
            return;
        }

        let token = self.store.valid_token(&self.grants).await;
        let Some(access_token) = token.access_token.as_deref() else {
            return;
        };
        let token_type = token.token_type.as_deref().unwrap_or("Bearer");

        match HeaderValue::from_str(&format!("{token_type} {access_token}")) {
            Ok(value) => {
                headers.insert(AUTHORIZATION, value);
            }
            Err(_) => tracing::warn!("Access token is not a valid header value"),
        }
    }

    /// React to a response status for a request to `url`
    ///
    /// A 401 on a non-ignored URL writes an error token, driving the
    /// status to denied. The caller still owns and propagates the
    /// original error.
    pub fn handle_response(&self, url: &str, status: u16, message: &str) {
        if status == 401 && !self.is_ignored(url) {
            tracing::debug!("401 from {}, invalidating token", url);
            self.store
                .set_token(OAuthToken::from_error("401", Some(message.to_string())));
        }
    }
}
