//! Token store: owns the current token, persists it, and publishes it
//!
//! The store is the serialization point for the single shared token:
//! every mutation goes through [`TokenStore::set_token`], which computes
//! the absolute expiry, writes through to storage and publishes on
//! replay-last-value channels. Re-publication is suppressed when the
//! serialized value is unchanged so multiple subscribers never trigger
//! redundant refresh attempts.

use crate::grants::TokenGrants;
use crate::storage::TokenStorage;
use crate::token::{AuthorizationStatus, OAuthToken};
use std::sync::Arc;
use tokio::sync::watch;

/// Owns the current [`OAuthToken`] and its derived status
pub struct TokenStore {
    storage: Arc<dyn TokenStorage>,
    storage_key: String,
    token_tx: watch::Sender<OAuthToken>,
    status_tx: watch::Sender<AuthorizationStatus>,
}

impl TokenStore {
    /// Create a store seeded from the persisted token, if any
    pub fn new(storage: Arc<dyn TokenStorage>, storage_key: impl Into<String>) -> Self {
        let storage_key = storage_key.into();
        let seeded = storage
            .get(&storage_key)
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default();

        let (status_tx, _) = watch::channel(OAuthToken::status(&seeded));
        let (token_tx, _) = watch::channel(seeded);
        Self {
            storage,
            storage_key,
            token_tx,
            status_tx,
        }
    }

    /// The current in-memory token
    pub fn token(&self) -> OAuthToken {
        self.token_tx.borrow().clone()
    }

    /// The authorization status derived from the current token
    pub fn status(&self) -> AuthorizationStatus {
        *self.status_tx.borrow()
    }

    /// Replace the current token
    ///
    /// Computes `expires` from `expires_in`, writes through to storage
    /// (removing the entry for the empty token) and notifies subscribers
    /// unless the serialized value is unchanged.
    pub fn set_token(&self, mut token: OAuthToken) {
        if let Some(expires_in) = token.expires_in {
            token.expires = Some(now_millis() + expires_in * 1000);
        }

        if token.is_empty() {
            self.storage.remove(&self.storage_key);
        } else {
            match serde_json::to_string(&token) {
                Ok(serialized) => self.storage.set(&self.storage_key, &serialized),
                Err(e) => tracing::warn!("Failed to serialize token for storage: {}", e),
            }
        }

        self.token_tx.send_if_modified(|current| {
            if serialized_equal(current, &token) {
                false
            } else {
                *current = token.clone();
                true
            }
        });

        let status = token.status();
        self.status_tx.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
    }

    /// Clear the token (equivalent to logged out)
    pub fn clear(&self) {
        self.set_token(OAuthToken::default());
    }

    /// Subscribe to token values; the receiver replays the latest value
    pub fn subscribe(&self) -> watch::Receiver<OAuthToken> {
        self.token_tx.subscribe()
    }

    /// Subscribe to derived status values
    pub fn subscribe_status(&self) -> watch::Receiver<AuthorizationStatus> {
        self.status_tx.subscribe()
    }

    /// The current token, refreshed first if it has expired
    ///
    /// An expired token with a refresh token is transparently refreshed;
    /// the resulting token is returned instead of the expired one. A
    /// failed refresh degrades to the empty token. An expired token
    /// without refresh capability is returned as-is.
    pub async fn valid_token(&self, grants: &TokenGrants) -> OAuthToken {
        let current = self.token();
        if current.is_expired(now_millis()) && current.refresh_token.is_some() {
            return self.refresh(grants).await;
        }
        current
    }

    /// Run the refresh-token grant and commit the result
    ///
    /// The refreshed fields are overlaid on the current token, so a
    /// response without a new refresh token keeps the old one. Failure
    /// commits the empty token; no error propagates.
    pub async fn refresh(&self, grants: &TokenGrants) -> OAuthToken {
        let current = self.token();
        let Some(refresh_token) = current.refresh_token.clone() else {
            return current;
        };

        match grants.refresh(&refresh_token).await {
            Ok(patch) => {
                let merged = current.merged(patch);
                self.set_token(merged);
                self.token()
            }
            Err(e) => {
                tracing::warn!("Token refresh failed, clearing session: {}", e);
                self.clear();
                self.token()
            }
        }
    }
}

/// Current time in epoch milliseconds
pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn serialized_equal(a: &OAuthToken, b: &OAuthToken) -> bool {
    serde_json::to_string(a).ok() == serde_json::to_string(b).ok()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn store_with_memory() -> (TokenStore, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new());
        let store = TokenStore::new(storage.clone(), "token");
        (store, storage)
    }

    fn token_with_access(access: &str) -> OAuthToken {
        OAuthToken {
            access_token: Some(access.to_string()),
            ..OAuthToken::default()
        }
    }

    #[test]
    fn test_seeded_from_storage() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set("token", r#"{"access_token":"saved","token_type":"bearer"}"#);

        let store = TokenStore::new(storage, "token");
        assert_eq!(store.token().access_token.as_deref(), Some("saved"));
        assert_eq!(store.status(), AuthorizationStatus::Authorized);
    }

    #[test]
    fn test_seeded_empty_when_storage_empty() {
        let (store, _) = store_with_memory();
        assert!(store.token().is_empty());
        assert_eq!(store.status(), AuthorizationStatus::NotAuthorized);
    }

    #[test]
    fn test_write_through_and_round_trip() {
        let (store, storage) = store_with_memory();

        let mut token = token_with_access("tok");
        token.refresh_token = Some("ref".to_string());
        store.set_token(token.clone());

        let persisted: OAuthToken =
            serde_json::from_str(&storage.get("token").unwrap()).unwrap();
        assert_eq!(persisted.access_token.as_deref(), Some("tok"));
        assert_eq!(persisted.refresh_token.as_deref(), Some("ref"));
    }

    #[test]
    fn test_empty_token_clears_storage() {
        let (store, storage) = store_with_memory();
        store.set_token(token_with_access("tok"));
        assert!(storage.get("token").is_some());

        store.clear();
        assert!(storage.get("token").is_none());
        assert_eq!(store.status(), AuthorizationStatus::NotAuthorized);
    }

    #[test]
    fn test_expires_computed_from_expires_in() {
        let (store, _) = store_with_memory();

        let before = now_millis();
        let mut token = token_with_access("tok");
        token.expires_in = Some(60);
        store.set_token(token);
        let after = now_millis();

        let expires = store.token().expires.unwrap();
        assert!(expires >= before + 60_000);
        assert!(expires <= after + 60_000);
    }

    #[test]
    fn test_expires_in_zero_is_already_expired() {
        let (store, _) = store_with_memory();

        let mut token = token_with_access("tok");
        token.expires_in = Some(0);
        store.set_token(token);

        assert!(store.token().is_expired(now_millis()));
    }

    #[test]
    fn test_distinct_values_suppress_republication() {
        let (store, _) = store_with_memory();
        store.set_token(token_with_access("tok"));

        let mut rx = store.subscribe();
        rx.borrow_and_update();

        // Same serialized value: no notification
        store.set_token(token_with_access("tok"));
        assert!(!rx.has_changed().unwrap());

        // Different value: notified
        store.set_token(token_with_access("other"));
        assert!(rx.has_changed().unwrap());
    }

    #[test]
    fn test_status_transitions() {
        let (store, _) = store_with_memory();
        let mut status_rx = store.subscribe_status();
        assert_eq!(*status_rx.borrow_and_update(), AuthorizationStatus::NotAuthorized);

        store.set_token(token_with_access("tok"));
        assert_eq!(*status_rx.borrow_and_update(), AuthorizationStatus::Authorized);

        store.set_token(OAuthToken::from_error("401", Some("unauthorized".to_string())));
        assert_eq!(*status_rx.borrow_and_update(), AuthorizationStatus::Denied);

        store.clear();
        assert_eq!(*status_rx.borrow_and_update(), AuthorizationStatus::NotAuthorized);
    }

    #[tokio::test]
    async fn test_valid_token_passthrough_when_not_expired() {
        let (store, _) = store_with_memory();
        let mut token = token_with_access("tok");
        token.expires_in = Some(3600);
        store.set_token(token);

        let grants = TokenGrants::new(
            reqwest::Client::new(),
            crate::config::ResolvedConfig::new(crate::config::FlowConfig::new("client")),
        );
        let valid = store.valid_token(&grants).await;
        assert_eq!(valid.access_token.as_deref(), Some("tok"));
    }

    #[tokio::test]
    async fn test_refresh_without_refresh_token_is_noop() {
        let (store, _) = store_with_memory();
        store.set_token(token_with_access("tok"));

        let grants = TokenGrants::new(
            reqwest::Client::new(),
            crate::config::ResolvedConfig::new(crate::config::FlowConfig::new("client")),
        );
        let token = store.refresh(&grants).await;
        assert_eq!(token.access_token.as_deref(), Some("tok"));
    }
}
