//! Redirect-parameter codec
//!
//! Parses the URL fragment or query string an authorization server
//! redirects back with, and removes the OAuth-specific keys afterwards.
//! Cleanup is idempotent: stripping an already-clean string is a no-op,
//! and unrelated parameters survive untouched.

use regex::Regex;
use std::collections::HashMap;

/// OAuth keys that may appear in an implicit-flow fragment
const FRAGMENT_KEYS: [&str; 9] = [
    "access_token",
    "token_type",
    "expires_in",
    "scope",
    "state",
    "error",
    "error_description",
    "session_state",
    "nonce",
];

/// OAuth keys that may appear in an authorization-code query string
const QUERY_KEYS: [&str; 5] = ["code", "state", "error", "error_description", "session_state"];

/// Whether a fragment (without the leading `#`) is an implicit-flow callback
pub fn is_implicit_callback(fragment: &str) -> bool {
    !fragment.is_empty() && (fragment.contains("access_token=") || fragment.contains("error="))
}

/// Whether a query string (without the leading `?`) is an
/// authorization-code callback
pub fn is_code_callback(query: &str) -> bool {
    !query.is_empty() && (query.contains("code=") || query.contains("error="))
}

/// Parse `key=value` pairs from a fragment or query string
///
/// Keys and values are percent-decoded; pairs that fail to decode are
/// kept verbatim.
pub fn parse_params(input: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    for pair in input.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let key = urlencoding::decode(key).map_or_else(|_| key.to_string(), |k| k.into_owned());
        let value =
            urlencoding::decode(value).map_or_else(|_| value.to_string(), |v| v.into_owned());
        params.insert(key, value);
    }
    params
}

/// Remove the OAuth keys from an implicit-flow fragment
pub fn clean_fragment(fragment: &str) -> String {
    strip_keys(fragment, &FRAGMENT_KEYS)
}

/// Remove the OAuth keys from a query string, returning `""` or
/// `?remaining` suitable for rebuilding the redirect URI
pub fn cleaned_query(query: &str) -> String {
    let stripped = strip_keys(query, &QUERY_KEYS);
    if stripped.is_empty() {
        String::new()
    } else {
        format!("?{stripped}")
    }
}

fn strip_keys(input: &str, keys: &[&str]) -> String {
    let mut out = input.to_string();
    for key in keys {
        // Matches "&key=..." anywhere or "key=...&" / "key=..." at the
        // start. The "=" is required so "error" never eats the prefix of
        // "error_description".
        let Ok(re) = Regex::new(&format!("&{key}=[^&]*|^{key}=[^&]*&?")) else {
            continue;
        };
        out = re.replace_all(&out, "").into_owned();
    }
    out
}
