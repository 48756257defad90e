//! The current-URL capability the engine runs against
//!
//! The engine never touches a real browser location; it reads and
//! rewrites the URL through this narrow trait so redirect flows can be
//! driven entirely from tests or from any non-browser host.

use std::sync::Mutex;

/// Read/rewrite access to the current URL
pub trait LocationProvider: Send + Sync {
    /// Scheme + host (+ port), e.g. `https://app.example.com`
    fn origin(&self) -> String;
    /// Path component, e.g. `/callback`
    fn pathname(&self) -> String;
    /// Query string without the leading `?`, or empty
    fn search(&self) -> String;
    /// Fragment without the leading `#`, or empty
    fn hash(&self) -> String;
    /// Rewrite the fragment in place
    fn set_hash(&self, hash: &str);
    /// Rewrite path + query without adding a history entry
    fn replace_state(&self, path_and_query: &str);
    /// Full navigation away from the current page
    fn replace(&self, url: &str);
}

#[derive(Debug, Default)]
struct MemoryLocationState {
    origin: String,
    pathname: String,
    search: String,
    hash: String,
    navigations: Vec<String>,
}

/// In-memory [`LocationProvider`] for tests and headless hosts
///
/// `replace` records the target instead of navigating, so a test can
/// assert on the authorization URL a login built.
#[derive(Debug, Default)]
pub struct MemoryLocation {
    state: Mutex<MemoryLocationState>,
}

impl MemoryLocation {
    /// Create a location from origin and path with no query or fragment
    pub fn new(origin: impl Into<String>, pathname: impl Into<String>) -> Self {
        Self {
            state: Mutex::new(MemoryLocationState {
                origin: origin.into(),
                pathname: pathname.into(),
                ..MemoryLocationState::default()
            }),
        }
    }

    /// Set the query string (without the leading `?`)
    pub fn with_search(self, search: impl Into<String>) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.search = search.into();
        }
        self
    }

    /// Set the fragment (without the leading `#`)
    pub fn with_hash(self, hash: impl Into<String>) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.hash = hash.into();
        }
        self
    }

    /// The full navigations performed through [`LocationProvider::replace`]
    pub fn navigations(&self) -> Vec<String> {
        self.state
            .lock()
            .map(|state| state.navigations.clone())
            .unwrap_or_default()
    }

    fn read<T>(&self, f: impl FnOnce(&MemoryLocationState) -> T) -> T
    where
        T: Default,
    {
        self.state.lock().map(|state| f(&state)).unwrap_or_default()
    }
}

impl LocationProvider for MemoryLocation {
    fn origin(&self) -> String {
        self.read(|s| s.origin.clone())
    }

    fn pathname(&self) -> String {
        self.read(|s| s.pathname.clone())
    }

    fn search(&self) -> String {
        self.read(|s| s.search.clone())
    }

    fn hash(&self) -> String {
        self.read(|s| s.hash.clone())
    }

    fn set_hash(&self, hash: &str) {
        if let Ok(mut state) = self.state.lock() {
            state.hash = hash.to_string();
        }
    }

    fn replace_state(&self, path_and_query: &str) {
        if let Ok(mut state) = self.state.lock() {
            let (path, search) = path_and_query
                .split_once('?')
                .map_or((path_and_query, ""), |(p, q)| (p, q));
            state.pathname = path.to_string();
            state.search = search.to_string();
        }
    }

    fn replace(&self, url: &str) {
        if let Ok(mut state) = self.state.lock() {
            state.navigations.push(url.to_string());
        }
    }
}
