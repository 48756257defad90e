//! Client-side OAuth 2.0 / OpenID Connect token lifecycle engine
//!
//! Drives the four standard grant flows (resource-owner password,
//! authorization code with optional PKCE, implicit, client credentials),
//! persists and refreshes the resulting token, protects against
//! CSRF/replay via state and nonce, and exposes a derived authorization
//! status plus a request decorator to the rest of an application.
//!
//! # Architecture
//!
//! - `config`: flow configuration and grant types
//! - `discovery`: OpenID Connect discovery and config resolution
//! - `decorator`: bearer-header decoration for outgoing requests
//! - `engine`: the central flow state machine
//! - `error`: error types for OAuth operations
//! - `grants`: form-encoded token endpoint requests
//! - `location`: the current-URL capability
//! - `pkce`: PKCE (Proof Key for Code Exchange) implementation
//! - `redirect`: redirect-parameter parsing and cleanup
//! - `storage`: pluggable key/value token persistence
//! - `store`: the token store and its streams
//! - `token`: the token bundle and derived status
//!
//! # Example
//!
//! ```rust,ignore
//! use authflow::{FlowConfig, GrantType, LoginParameters, OAuthConfig, OAuthEngine};
//! use authflow::{MemoryLocation, MemoryStorage};
//! use std::sync::Arc;
//!
//! let config = OAuthConfig::new(
//!     GrantType::AuthorizationCode,
//!     FlowConfig {
//!         issuer_path: Some("https://issuer.example.com".into()),
//!         ..FlowConfig::new("my-client")
//!     },
//! );
//!
//! let location = Arc::new(MemoryLocation::new("https://app.example.com", "/"));
//! let storage = Arc::new(MemoryStorage::new());
//! let engine = OAuthEngine::new(config, location, storage).await?;
//!
//! // engine.login(LoginParameters::Authorization { .. }).await?;
//! // let decorator = engine.decorator();
//! ```

pub mod config;
pub mod decorator;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod grants;
pub mod location;
pub mod pkce;
pub mod redirect;
pub mod storage;
pub mod store;
pub mod token;

// Re-export commonly used types
pub use config::{FlowConfig, GrantType, OAuthConfig, ResolvedConfig};
pub use decorator::AuthDecorator;
pub use discovery::OpenIdConfiguration;
pub use engine::{LoginParameters, OAuthEngine};
pub use error::{OAuthError, OAuthResult};
pub use grants::TokenGrants;
pub use location::{LocationProvider, MemoryLocation};
pub use pkce::PkceChallenge;
pub use storage::{FileStorage, MemoryStorage, TokenStorage};
pub use store::TokenStore;
pub use token::{AuthorizationStatus, OAuthToken, UserInfo};
