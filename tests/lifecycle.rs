//! End-to-end lifecycle tests against a local mock authorization server

#![allow(clippy::unwrap_used)]

use authflow::{
    AuthorizationStatus, FlowConfig, GrantType, LocationProvider, LoginParameters, MemoryLocation,
    MemoryStorage, OAuthConfig, OAuthEngine, OAuthError, TokenGrants, TokenStorage, TokenStore,
};
use axum::Json;
use axum::extract::{Form, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

#[derive(Clone, Default)]
struct ServerState {
    base_url: Arc<Mutex<String>>,
    token_forms: Arc<Mutex<Vec<HashMap<String, String>>>>,
    revocations: Arc<Mutex<Vec<(String, String, Instant)>>>,
}

impl ServerState {
    fn base_url(&self) -> String {
        self.base_url.lock().unwrap().clone()
    }

    fn token_forms(&self) -> Vec<HashMap<String, String>> {
        self.token_forms.lock().unwrap().clone()
    }

    fn revocations(&self) -> Vec<(String, String, Instant)> {
        self.revocations.lock().unwrap().clone()
    }
}

async fn token_endpoint(
    State(state): State<ServerState>,
    Form(form): Form<HashMap<String, String>>,
) -> (StatusCode, Json<Value>) {
    state.token_forms.lock().unwrap().push(form.clone());

    let grant_type = form.get("grant_type").map(String::as_str).unwrap_or("");
    match grant_type {
        "password" => {
            if form.get("password").map(String::as_str) == Some("secret") {
                ok_token("token")
            } else {
                denied("invalid_grant", "bad credentials")
            }
        }
        "client_credentials" => ok_token("cc-token"),
        "authorization_code" => {
            if form.get("code").map(String::as_str) == Some("good") {
                (
                    StatusCode::OK,
                    Json(json!({
                        "access_token": "exchanged",
                        "refresh_token": "r1",
                        "token_type": "bearer",
                        "expires_in": 3600
                    })),
                )
            } else {
                denied("invalid_grant", "unknown code")
            }
        }
        "refresh_token" => {
            if form.get("refresh_token").map(String::as_str) == Some("r1") {
                ok_token("refreshed")
            } else {
                denied("invalid_grant", "unknown refresh token")
            }
        }
        _ => denied("unsupported_grant_type", "unsupported"),
    }
}

fn ok_token(access_token: &str) -> (StatusCode, Json<Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "access_token": access_token,
            "token_type": "bearer",
            "expires_in": 43199
        })),
    )
}

fn denied(error: &str, description: &str) -> (StatusCode, Json<Value>) {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({"error": error, "error_description": description})),
    )
}

async fn revoke_endpoint(
    State(state): State<ServerState>,
    Form(form): Form<HashMap<String, String>>,
) -> StatusCode {
    state.revocations.lock().unwrap().push((
        form.get("token").cloned().unwrap_or_default(),
        form.get("token_type_hint").cloned().unwrap_or_default(),
        Instant::now(),
    ));
    StatusCode::OK
}

async fn discovery_endpoint(State(state): State<ServerState>) -> Json<Value> {
    let base = state.base_url();
    Json(json!({
        "issuer": base,
        "authorization_endpoint": format!("{base}/authorize"),
        "token_endpoint": format!("{base}/token"),
        "revocation_endpoint": format!("{base}/revoke"),
        "userinfo_endpoint": format!("{base}/userinfo"),
        "end_session_endpoint": format!("{base}/logout"),
        "code_challenge_methods_supported": ["plain", "S256"]
    }))
}

async fn userinfo_endpoint(headers: HeaderMap) -> (StatusCode, Json<Value>) {
    match headers.get("authorization").and_then(|v| v.to_str().ok()) {
        Some("bearer token") | Some("bearer exchanged") | Some("bearer refreshed") => (
            StatusCode::OK,
            Json(json!({"sub": "user-1", "preferred_username": "user"})),
        ),
        _ => (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "invalid_token"})),
        ),
    }
}

async fn spawn_auth_server() -> (String, ServerState, JoinHandle<()>) {
    let state = ServerState::default();
    let router = axum::Router::new()
        .route("/token", post(token_endpoint))
        .route("/revoke", post(revoke_endpoint))
        .route("/.well-known/openid-configuration", get(discovery_endpoint))
        .route("/userinfo", get(userinfo_endpoint))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let url = format!("http://{addr}");
    *state.base_url.lock().unwrap() = url.clone();

    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    (url, state, handle)
}

fn resource_config(base: &str) -> OAuthConfig {
    OAuthConfig::new(
        GrantType::Resource,
        FlowConfig {
            token_path: Some(format!("{base}/token")),
            revoke_path: Some(format!("{base}/revoke")),
            user_path: Some(format!("{base}/userinfo")),
            client_secret: Some("clientSecret".to_string()),
            ..FlowConfig::new("clientId")
        },
    )
}

fn app_location() -> Arc<MemoryLocation> {
    Arc::new(MemoryLocation::new("https://app.example.com", "/"))
}

#[tokio::test]
async fn password_grant_success() {
    let (base, state, _server) = spawn_auth_server().await;
    let storage = Arc::new(MemoryStorage::new());
    let engine = OAuthEngine::new(resource_config(&base), app_location(), storage)
        .await
        .unwrap();

    engine
        .login(LoginParameters::Resource {
            username: "user".to_string(),
            password: "secret".to_string(),
        })
        .await
        .unwrap();

    assert_eq!(engine.status(), AuthorizationStatus::Authorized);
    let token = engine.store().token();
    assert_eq!(token.access_token.as_deref(), Some("token"));
    assert_eq!(token.token_type.as_deref(), Some("bearer"));
    assert_eq!(token.expires_in, Some(43199));
    assert_eq!(token.grant, Some(GrantType::Resource));

    let form = state.token_forms().remove(0);
    assert_eq!(form.get("grant_type").unwrap(), "password");
    assert_eq!(form.get("client_id").unwrap(), "clientId");
    assert_eq!(form.get("client_secret").unwrap(), "clientSecret");
    assert_eq!(form.get("username").unwrap(), "user");
}

#[tokio::test]
async fn password_grant_failure_is_denied_and_returned() {
    let (base, _state, _server) = spawn_auth_server().await;
    let storage = Arc::new(MemoryStorage::new());
    let engine = OAuthEngine::new(resource_config(&base), app_location(), storage)
        .await
        .unwrap();

    let result = engine
        .login(LoginParameters::Resource {
            username: "user".to_string(),
            password: "wrong".to_string(),
        })
        .await;

    assert!(matches!(result, Err(OAuthError::Denied { .. })));
    assert_eq!(engine.status(), AuthorizationStatus::Denied);
    let token = engine.store().token();
    assert_eq!(token.error.as_deref(), Some("invalid_grant"));
    assert_eq!(token.error_description.as_deref(), Some("bad credentials"));
}

#[tokio::test]
async fn client_credentials_grant() {
    let (base, state, _server) = spawn_auth_server().await;
    let config = OAuthConfig::new(
        GrantType::ClientCredential,
        FlowConfig {
            token_path: Some(format!("{base}/token")),
            client_secret: Some("clientSecret".to_string()),
            ..FlowConfig::new("clientId")
        },
    );
    let engine = OAuthEngine::new(config, app_location(), Arc::new(MemoryStorage::new()))
        .await
        .unwrap();

    engine.login(LoginParameters::None).await.unwrap();

    assert_eq!(engine.status(), AuthorizationStatus::Authorized);
    let token = engine.store().token();
    assert_eq!(token.access_token.as_deref(), Some("cc-token"));
    assert_eq!(token.grant, Some(GrantType::ClientCredential));

    let form = state.token_forms().remove(0);
    assert_eq!(form.get("grant_type").unwrap(), "client_credentials");
}

#[tokio::test]
async fn code_callback_exchanges_and_rewrites_url() {
    let (base, state, _server) = spawn_auth_server().await;
    let location = Arc::new(
        MemoryLocation::new("https://app.example.com", "/callback")
            .with_search("code=good&state=xyz&page=2"),
    );
    let storage = Arc::new(MemoryStorage::new());
    // A previous login stashed the PKCE verifier
    storage.set("token", r#"{"code_verifier":"v123"}"#);

    let config = OAuthConfig::new(
        GrantType::AuthorizationCode,
        FlowConfig {
            authorize_path: Some(format!("{base}/authorize")),
            token_path: Some(format!("{base}/token")),
            ..FlowConfig::new("clientId")
        },
    );
    let engine = OAuthEngine::new(config, location.clone(), storage)
        .await
        .unwrap();

    assert_eq!(engine.status(), AuthorizationStatus::Authorized);
    let token = engine.store().token();
    assert_eq!(token.access_token.as_deref(), Some("exchanged"));
    assert_eq!(token.refresh_token.as_deref(), Some("r1"));
    assert_eq!(token.grant, Some(GrantType::AuthorizationCode));

    // OAuth keys are stripped, unrelated query parameters stay
    assert_eq!(location.search(), "page=2");
    assert_eq!(location.pathname(), "/callback");
    assert_eq!(engine.subscribe_state().borrow().as_deref(), Some("xyz"));

    let form = state.token_forms().remove(0);
    assert_eq!(form.get("grant_type").unwrap(), "authorization_code");
    assert_eq!(form.get("code").unwrap(), "good");
    assert_eq!(form.get("code_verifier").unwrap(), "v123");
    assert_eq!(
        form.get("redirect_uri").unwrap(),
        "https://app.example.com/callback?page=2"
    );
}

#[tokio::test]
async fn code_exchange_failure_is_denied_and_url_still_rewritten() {
    let (base, _state, _server) = spawn_auth_server().await;
    let location = Arc::new(
        MemoryLocation::new("https://app.example.com", "/callback").with_search("code=bad"),
    );
    let config = OAuthConfig::new(
        GrantType::AuthorizationCode,
        FlowConfig {
            token_path: Some(format!("{base}/token")),
            ..FlowConfig::new("clientId")
        },
    );
    let engine = OAuthEngine::new(config, location.clone(), Arc::new(MemoryStorage::new()))
        .await
        .unwrap();

    assert_eq!(engine.status(), AuthorizationStatus::Denied);
    assert_eq!(
        engine.store().token().error.as_deref(),
        Some("invalid_grant")
    );
    assert_eq!(location.search(), "");
}

#[tokio::test]
async fn eager_refresh_on_cold_start() {
    let (base, state, _server) = spawn_auth_server().await;
    let storage = Arc::new(MemoryStorage::new());
    storage.set(
        "token",
        r#"{"access_token":"stale","refresh_token":"r1","token_type":"bearer"}"#,
    );

    let engine = OAuthEngine::new(resource_config(&base), app_location(), storage)
        .await
        .unwrap();

    assert_eq!(engine.status(), AuthorizationStatus::Authorized);
    let token = engine.store().token();
    assert_eq!(token.access_token.as_deref(), Some("refreshed"));
    // The refresh response carried no refresh token; the old one is kept
    assert_eq!(token.refresh_token.as_deref(), Some("r1"));

    let form = state.token_forms().remove(0);
    assert_eq!(form.get("grant_type").unwrap(), "refresh_token");
    assert_eq!(form.get("refresh_token").unwrap(), "r1");
}

#[tokio::test]
async fn timer_refreshes_token_at_expiry() {
    let (base, _state, _server) = spawn_auth_server().await;
    let engine = OAuthEngine::new(
        resource_config(&base),
        app_location(),
        Arc::new(MemoryStorage::new()),
    )
    .await
    .unwrap();

    engine.store().set_token(authflow::OAuthToken {
        access_token: Some("short-lived".to_string()),
        refresh_token: Some("r1".to_string()),
        expires_in: Some(1),
        ..authflow::OAuthToken::default()
    });

    let mut rx = engine.store().subscribe();
    // First change: the refreshed token committed by the armed countdown
    tokio::time::timeout(Duration::from_secs(5), rx.changed())
        .await
        .unwrap()
        .unwrap();

    let token = engine.store().token();
    assert_eq!(token.access_token.as_deref(), Some("refreshed"));
    assert_eq!(engine.status(), AuthorizationStatus::Authorized);
}

#[tokio::test]
async fn expired_token_refreshed_on_read() {
    let (base, _state, _server) = spawn_auth_server().await;
    let storage = Arc::new(MemoryStorage::new());
    let store = TokenStore::new(storage, "token");
    let resolved = authflow::discovery::resolve(
        &FlowConfig {
            token_path: Some(format!("{base}/token")),
            ..FlowConfig::new("clientId")
        },
        &reqwest::Client::new(),
    )
    .await
    .unwrap();
    let grants = TokenGrants::new(reqwest::Client::new(), resolved);

    store.set_token(authflow::OAuthToken {
        access_token: Some("stale".to_string()),
        refresh_token: Some("r1".to_string()),
        expires_in: Some(0),
        ..authflow::OAuthToken::default()
    });

    let token = store.valid_token(&grants).await;
    assert_eq!(token.access_token.as_deref(), Some("refreshed"));
}

#[tokio::test]
async fn refresh_failure_degrades_to_logged_out() {
    let (base, _state, _server) = spawn_auth_server().await;
    let storage = Arc::new(MemoryStorage::new());
    let store = TokenStore::new(storage.clone(), "token");
    let resolved = authflow::discovery::resolve(
        &FlowConfig {
            token_path: Some(format!("{base}/token")),
            ..FlowConfig::new("clientId")
        },
        &reqwest::Client::new(),
    )
    .await
    .unwrap();
    let grants = TokenGrants::new(reqwest::Client::new(), resolved);

    store.set_token(authflow::OAuthToken {
        access_token: Some("stale".to_string()),
        refresh_token: Some("unknown".to_string()),
        expires_in: Some(0),
        ..authflow::OAuthToken::default()
    });

    let token = store.valid_token(&grants).await;
    assert!(token.is_empty());
    assert_eq!(store.status(), AuthorizationStatus::NotAuthorized);
    assert!(storage.get("token").is_none());
}

#[tokio::test]
async fn discovery_merges_endpoints() {
    let (base, _state, _server) = spawn_auth_server().await;
    let config = OAuthConfig::new(
        GrantType::AuthorizationCode,
        FlowConfig {
            issuer_path: Some(base.clone()),
            ..FlowConfig::new("clientId")
        },
    );
    let engine = OAuthEngine::new(config, app_location(), Arc::new(MemoryStorage::new()))
        .await
        .unwrap();

    let resolved = engine.config();
    assert_eq!(resolved.issuer_path.as_deref(), Some(base.as_str()));
    assert_eq!(resolved.client_id, "clientId");
    assert_eq!(
        resolved.authorize_path.as_deref(),
        Some(format!("{base}/authorize").as_str())
    );
    assert_eq!(
        resolved.token_path.as_deref(),
        Some(format!("{base}/token").as_str())
    );
    assert_eq!(
        resolved.revoke_path.as_deref(),
        Some(format!("{base}/revoke").as_str())
    );
    assert_eq!(resolved.scope.as_deref(), Some("openid"));
    assert!(resolved.pkce);
}

#[tokio::test]
async fn discovery_failure_is_fatal() {
    let config = OAuthConfig::new(
        GrantType::AuthorizationCode,
        FlowConfig {
            // Nothing listens here
            issuer_path: Some("http://127.0.0.1:1/missing".to_string()),
            ..FlowConfig::new("clientId")
        },
    );
    let result = OAuthEngine::new(config, app_location(), Arc::new(MemoryStorage::new())).await;
    assert!(matches!(result, Err(OAuthError::Discovery(_))));
}

#[tokio::test]
async fn revoke_posts_both_parts_in_order_with_pacing() {
    let (base, state, _server) = spawn_auth_server().await;
    let engine = OAuthEngine::new(
        resource_config(&base),
        app_location(),
        Arc::new(MemoryStorage::new()),
    )
    .await
    .unwrap();

    engine.store().set_token(authflow::OAuthToken {
        access_token: Some("tok".to_string()),
        refresh_token: Some("ref".to_string()),
        ..authflow::OAuthToken::default()
    });

    engine.revoke().await;

    let revocations = state.revocations();
    assert_eq!(revocations.len(), 2);
    assert_eq!(revocations[0].0, "tok");
    assert_eq!(revocations[0].1, "access_token");
    assert_eq!(revocations[1].0, "ref");
    assert_eq!(revocations[1].1, "refresh_token");

    let gap = revocations[1].2.duration_since(revocations[0].2);
    assert!(gap >= Duration::from_millis(250), "gap was {gap:?}");
}

#[tokio::test]
async fn user_info_uses_bearer_decoration() {
    let (base, _state, _server) = spawn_auth_server().await;
    let engine = OAuthEngine::new(
        resource_config(&base),
        app_location(),
        Arc::new(MemoryStorage::new()),
    )
    .await
    .unwrap();

    engine
        .login(LoginParameters::Resource {
            username: "user".to_string(),
            password: "secret".to_string(),
        })
        .await
        .unwrap();

    let user_info = engine.user_info().await.unwrap();
    assert_eq!(user_info.sub.as_deref(), Some("user-1"));
    assert_eq!(user_info.preferred_username.as_deref(), Some("user"));
}

#[tokio::test]
async fn decorator_refreshes_before_decorating() {
    let (base, _state, _server) = spawn_auth_server().await;
    let engine = OAuthEngine::new(
        resource_config(&base),
        app_location(),
        Arc::new(MemoryStorage::new()),
    )
    .await
    .unwrap();

    engine.store().set_token(authflow::OAuthToken {
        access_token: Some("stale".to_string()),
        refresh_token: Some("r1".to_string()),
        token_type: Some("bearer".to_string()),
        expires_in: Some(0),
        ..authflow::OAuthToken::default()
    });

    let decorator = engine.decorator();
    let mut headers = reqwest::header::HeaderMap::new();
    decorator
        .decorate("https://api.example.com/data", &mut headers)
        .await;

    assert_eq!(
        headers.get(reqwest::header::AUTHORIZATION).unwrap(),
        "bearer refreshed"
    );
}
