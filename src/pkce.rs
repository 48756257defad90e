//! PKCE (Proof Key for Code Exchange) and random string utilities
//!
//! Implements RFC 7636 PKCE for the authorization code flow, plus the
//! random URL-safe strings used for nonce and state values. All functions
//! draw from a cryptographically secure source (`rand::rngs::OsRng` via
//! `rand::random`).

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};

/// Default length of a PKCE code verifier in characters.
pub const VERIFIER_LENGTH: usize = 48;

/// Length of a nonce value in characters.
pub const NONCE_LENGTH: usize = 10;

/// PKCE challenge pair containing the verifier and challenge
#[derive(Debug, Clone)]
pub struct PkceChallenge {
    /// The verifier string (stashed client-side, sent during token exchange)
    pub verifier: String,
    /// The challenge string (sent during the authorization request)
    pub challenge: String,
}

impl PkceChallenge {
    /// Generate a new PKCE challenge pair
    ///
    /// Creates a 48-character random verifier and computes the SHA256
    /// hash as the challenge (S256 method).
    pub fn generate() -> Self {
        let verifier = random_string(VERIFIER_LENGTH);
        let challenge = Self::challenge_for(&verifier);
        Self {
            verifier,
            challenge,
        }
    }

    /// Compute the S256 challenge for a given verifier
    pub fn challenge_for(verifier: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(verifier.as_bytes());
        URL_SAFE_NO_PAD.encode(hasher.finalize())
    }

    /// Get the code challenge method (always S256)
    pub fn challenge_method() -> &'static str {
        "S256"
    }
}

/// Generate a random URL-safe string of the given length
///
/// Encodes twice as many random bytes as requested characters and
/// truncates, so every character carries full entropy.
pub fn random_string(length: usize) -> String {
    let bytes: Vec<u8> = (0..length * 2).map(|_| rand::random::<u8>()).collect();
    let mut encoded = URL_SAFE_NO_PAD.encode(bytes);
    encoded.truncate(length);
    encoded
}
