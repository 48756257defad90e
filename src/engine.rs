//! The OAuth engine: startup callback handling, login dispatch, logout,
//! revocation and timer-driven refresh
//!
//! On construction the engine resolves the effective configuration
//! (running OpenID discovery when an issuer is configured), inspects the
//! current URL for a redirect callback, and otherwise falls back to the
//! persisted token. From then on it exposes the derived authorization
//! status and the `state` values seen on callbacks as replay-last-value
//! streams.

use crate::config::{GrantType, OAuthConfig, ResolvedConfig};
use crate::decorator::AuthDecorator;
use crate::discovery;
use crate::error::{OAuthError, OAuthResult};
use crate::grants::TokenGrants;
use crate::location::LocationProvider;
use crate::pkce::{self, PkceChallenge};
use crate::redirect;
use crate::storage::TokenStorage;
use crate::store::{TokenStore, now_millis};
use crate::token::{AuthorizationStatus, OAuthToken, UserInfo};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Pacing between the access-token and refresh-token revocation POSTs,
/// so the server does not treat the second call as cancelling the first
const REVOKE_PACING: Duration = Duration::from_millis(300);

/// Login parameters, discriminated by grant type
///
/// The caller picks the variant matching the configured grant; a
/// mismatch is rejected instead of silently guessed at.
#[derive(Debug, Clone)]
pub enum LoginParameters {
    /// Resource-owner password credentials
    Resource {
        username: String,
        password: String,
    },
    /// Redirect-based flows (authorization code or implicit)
    Authorization {
        redirect_uri: String,
        /// `code` or `token`
        response_type: GrantType,
        state: Option<String>,
    },
    /// Client credentials: no end-user input
    None,
}

/// Client-side OAuth 2.0 / OpenID Connect token lifecycle engine
pub struct OAuthEngine {
    grant_type: GrantType,
    config: ResolvedConfig,
    http: reqwest::Client,
    store: Arc<TokenStore>,
    grants: Arc<TokenGrants>,
    location: Arc<dyn LocationProvider>,
    ignore_paths: Vec<String>,
    state_tx: watch::Sender<Option<String>>,
    refresh_loop: JoinHandle<()>,
}

impl OAuthEngine {
    /// Build the engine: resolve configuration, then run the startup
    /// algorithm exactly once
    ///
    /// Fails only on a configuration-time defect (discovery fetch
    /// failure); flow-level failures during startup are converted into a
    /// denied token instead.
    pub async fn new(
        oauth_config: OAuthConfig,
        location: Arc<dyn LocationProvider>,
        storage: Arc<dyn TokenStorage>,
    ) -> OAuthResult<Self> {
        let http = reqwest::Client::new();
        let config = discovery::resolve(&oauth_config.config, &http).await?;
        let store = Arc::new(TokenStore::new(storage, oauth_config.storage_key));
        let grants = Arc::new(TokenGrants::new(http.clone(), config.clone()));
        let (state_tx, _) = watch::channel(None);
        let refresh_loop = spawn_refresh_loop(store.clone(), grants.clone());

        let engine = Self {
            grant_type: oauth_config.grant_type,
            config,
            http,
            store,
            grants,
            location,
            ignore_paths: oauth_config.ignore_paths,
            state_tx,
            refresh_loop,
        };
        engine.init().await;
        Ok(engine)
    }

    /// The startup algorithm: redirect callback, else persisted token
    async fn init(&self) {
        let fragment = self.location.hash();
        let query = self.location.search();

        if redirect::is_implicit_callback(&fragment) {
            self.handle_implicit_callback(&fragment);
        } else if redirect::is_code_callback(&query) {
            self.handle_code_callback(&query).await;
        } else {
            let saved = self.store.token();
            if saved.access_token.is_some() && saved.refresh_token.is_some() {
                // Eager refresh on cold start: a manual page reload may
                // hold a soon-to-expire token.
                self.store.refresh(&self.grants).await;
            }
        }
    }

    fn handle_implicit_callback(&self, fragment: &str) {
        let params = redirect::parse_params(fragment);
        let stashed = self.store.token();
        self.emit_state(&params);
        self.location.set_hash(&redirect::clean_fragment(fragment));

        let mut token = OAuthToken::from_params(&params);
        if token.error.is_some() {
            tracing::debug!("Implicit callback denied: {:?}", token.error);
            self.store.set_token(token);
            return;
        }

        if let Some(expected) = stashed.nonce.as_deref()
            && token.id_token.is_some()
            && token.id_token_nonce().as_deref() != Some(expected)
        {
            tracing::warn!("ID token nonce does not match the stored nonce");
            self.store.set_token(OAuthToken::from_error(
                "invalid_nonce",
                Some("nonce mismatch in id_token".to_string()),
            ));
            return;
        }

        token.grant = Some(GrantType::Implicit);
        self.store.set_token(token);
    }

    async fn handle_code_callback(&self, query: &str) {
        let params = redirect::parse_params(query);
        let stashed = self.store.token();
        self.emit_state(&params);

        let cleaned = redirect::cleaned_query(query);
        let pathname = self.location.pathname();

        if params.contains_key("error") {
            tracing::debug!("Authorization code callback denied: {:?}", params.get("error"));
            self.store.set_token(OAuthToken::from_params(&params));
            self.location.replace_state(&format!("{pathname}{cleaned}"));
            return;
        }

        let Some(code) = params.get("code") else {
            self.location.replace_state(&format!("{pathname}{cleaned}"));
            return;
        };

        // The redirect URI must match what the authorization request
        // carried: the current URL minus the OAuth keys.
        let redirect_uri = format!("{}{}{}", self.location.origin(), pathname, cleaned);
        match self
            .grants
            .exchange_code(code, &redirect_uri, stashed.code_verifier.as_deref())
            .await
        {
            Ok(mut token) => {
                token.grant = Some(GrantType::AuthorizationCode);
                self.store.set_token(token);
            }
            Err(e) => {
                tracing::warn!("Authorization code exchange failed: {}", e);
                self.store.set_token(denied_token(&e));
            }
        }
        // Replace-state so back-navigation does not replay the callback
        self.location.replace_state(&format!("{pathname}{cleaned}"));
    }

    /// Log in with the configured grant
    ///
    /// Password and client-credentials grants run to completion here and
    /// also return the failure for inline display; the redirect flows
    /// navigate away and produce their token on the next startup.
    pub async fn login(&self, parameters: LoginParameters) -> OAuthResult<()> {
        match (self.grant_type, parameters) {
            (GrantType::Resource, LoginParameters::Resource { username, password }) => {
                self.credentials_login(self.grants.password(&username, &password), GrantType::Resource)
                    .await
            }
            (GrantType::ClientCredential, LoginParameters::None) => {
                self.credentials_login(self.grants.client_credentials(), GrantType::ClientCredential)
                    .await
            }
            (
                GrantType::AuthorizationCode | GrantType::Implicit,
                LoginParameters::Authorization {
                    redirect_uri,
                    response_type,
                    state,
                },
            ) => {
                let url = self.authorization_url(&redirect_uri, response_type, state.as_deref())?;
                self.location.replace(&url);
                Ok(())
            }
            (expected, _) => Err(OAuthError::ParameterMismatch(expected.as_str())),
        }
    }

    async fn credentials_login(
        &self,
        request: impl Future<Output = OAuthResult<OAuthToken>>,
        grant: GrantType,
    ) -> OAuthResult<()> {
        match request.await {
            Ok(mut token) => {
                token.grant = Some(grant);
                self.store.set_token(token);
                Ok(())
            }
            Err(e) => {
                self.store.set_token(denied_token(&e));
                Err(e)
            }
        }
    }

    /// Build the authorization URL for the redirect flows
    ///
    /// Appends a nonce when the effective scope contains `openid` and a
    /// PKCE challenge when the configuration asks for one; both secrets
    /// are stashed on the in-memory token for the callback leg.
    fn authorization_url(
        &self,
        redirect_uri: &str,
        response_type: GrantType,
        state: Option<&str>,
    ) -> OAuthResult<String> {
        let authorize_path = self.config.require_authorize_path()?;
        let scope = self.config.scope.as_deref().unwrap_or("");

        let mut url = String::from(authorize_path);
        url.push(if url.contains('?') { '&' } else { '?' });
        url.push_str(&format!(
            "client_id={}&redirect_uri={}&response_type={}&scope={}&state={}",
            self.config.client_id,
            urlencoding::encode(redirect_uri),
            response_type.as_str(),
            urlencoding::encode(scope),
            urlencoding::encode(state.unwrap_or("")),
        ));

        let mut stash = self.store.token();
        let mut stash_dirty = false;

        if scope.split(' ').any(|s| s == "openid") {
            let nonce = pkce::random_string(pkce::NONCE_LENGTH);
            url.push_str(&format!("&nonce={nonce}"));
            stash.nonce = Some(nonce);
            stash_dirty = true;
        }

        if self.config.pkce {
            let challenge = PkceChallenge::generate();
            url.push_str(&format!(
                "&code_challenge={}&code_challenge_method={}",
                challenge.challenge,
                PkceChallenge::challenge_method(),
            ));
            stash.code_verifier = Some(challenge.verifier);
            stash_dirty = true;
        }

        if stash_dirty {
            self.store.set_token(stash);
        }
        Ok(url)
    }

    /// Log out: best-effort revocation, clear the token, optionally
    /// navigate to the end-session endpoint
    pub fn logout(&self, use_logout_url: bool) {
        let token = self.store.token();
        let grants = self.grants.clone();
        // Revocation must not block logout; it runs in the background
        // against the token captured before the clear.
        tokio::spawn(async move {
            revoke_parts(&grants, &token).await;
        });

        self.store.clear();

        if use_logout_url
            && let Some(logout_path) = self.config.logout_path.as_deref()
        {
            let redirect = self.config.logout_redirect_uri.clone().unwrap_or_else(|| {
                format!("{}{}", self.location.origin(), self.location.pathname())
            });
            self.location.replace(&format!(
                "{logout_path}?post_logout_redirect_uri={}",
                urlencoding::encode(&redirect),
            ));
        }
    }

    /// Revoke the current token parts, paced, failures swallowed
    pub async fn revoke(&self) {
        let token = self.store.token();
        revoke_parts(&self.grants, &token).await;
    }

    /// Fetch the OIDC userinfo document with the current valid token
    pub async fn user_info(&self) -> OAuthResult<UserInfo> {
        let user_path = self
            .config
            .user_path
            .as_deref()
            .ok_or(OAuthError::MissingConfig("user_path"))?;

        let token = self.store.valid_token(&self.grants).await;
        let access_token = token.access_token.as_deref().ok_or(OAuthError::NotAuthorized)?;
        let token_type = token.token_type.as_deref().unwrap_or("Bearer");

        let user_info = self
            .http
            .get(user_path)
            .header(
                reqwest::header::AUTHORIZATION,
                format!("{token_type} {access_token}"),
            )
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(user_info)
    }

    /// The current authorization status
    pub fn status(&self) -> AuthorizationStatus {
        self.store.status()
    }

    /// Status stream with replay-last-value semantics
    pub fn subscribe_status(&self) -> watch::Receiver<AuthorizationStatus> {
        self.store.subscribe_status()
    }

    /// Stream of `state` values seen on redirect callbacks
    pub fn subscribe_state(&self) -> watch::Receiver<Option<String>> {
        self.state_tx.subscribe()
    }

    /// The token store backing this engine
    pub fn store(&self) -> &Arc<TokenStore> {
        &self.store
    }

    /// The effective (post-discovery) configuration
    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    /// Patterns the request decorator must leave untouched
    pub fn ignore_paths(&self) -> &[String] {
        &self.ignore_paths
    }

    /// Build a request decorator sharing this engine's token store
    pub fn decorator(&self) -> AuthDecorator {
        AuthDecorator::new(self.store.clone(), self.grants.clone(), &self.ignore_paths)
    }

    fn emit_state(&self, params: &HashMap<String, String>) {
        if let Some(state) = params.get("state") {
            self.state_tx.send_replace(Some(state.clone()));
        }
    }
}

impl Drop for OAuthEngine {
    fn drop(&mut self) {
        self.refresh_loop.abort();
    }
}

/// Convert a flow failure into the denied token it should persist as
fn denied_token(error: &OAuthError) -> OAuthToken {
    match error {
        OAuthError::Denied {
            error,
            error_description,
        } => OAuthToken::from_error(error.clone(), error_description.clone()),
        other => OAuthToken::from_error("invalid_request", Some(other.to_string())),
    }
}

async fn revoke_parts(grants: &TokenGrants, token: &OAuthToken) {
    let parts = [
        (token.access_token.as_deref(), "access_token"),
        (token.refresh_token.as_deref(), "refresh_token"),
    ];

    let mut first = true;
    for (value, hint) in parts {
        let Some(value) = value else { continue };
        if !first {
            tokio::time::sleep(REVOKE_PACING).await;
        }
        first = false;
        if let Err(e) = grants.revoke(value, hint).await {
            tracing::warn!("Token revocation ({}) failed: {}", hint, e);
        }
    }
}

/// Watch the committed token and fire the refresh grant when a token
/// with refresh capability reaches its expiry
///
/// Every commit re-evaluates the countdown, so logout or an error token
/// disarms a pending refresh, and a token without a refresh token arms
/// nothing. Only future deadlines are armed; already-expired tokens are
/// refreshed on demand instead.
fn spawn_refresh_loop(store: Arc<TokenStore>, grants: Arc<TokenGrants>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut rx = store.subscribe();
        loop {
            let deadline = refresh_deadline(&rx.borrow_and_update());
            match deadline {
                Some(remaining) => {
                    tokio::select! {
                        () = tokio::time::sleep(remaining) => {
                            tracing::debug!("Token lifetime elapsed, refreshing");
                            store.refresh(&grants).await;
                        }
                        changed = rx.changed() => {
                            if changed.is_err() {
                                break;
                            }
                        }
                    }
                }
                None => {
                    if rx.changed().await.is_err() {
                        break;
                    }
                }
            }
        }
    })
}

fn refresh_deadline(token: &OAuthToken) -> Option<Duration> {
    if token.error.is_some() {
        return None;
    }
    token.refresh_token.as_ref()?;
    let remaining = token.expires? - now_millis();
    if remaining > 0 {
        Some(Duration::from_millis(remaining.unsigned_abs()))
    } else {
        None
    }
}
