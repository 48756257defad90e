//! Pluggable key/value storage for the persisted token
//!
//! The engine only needs browser-localStorage semantics: synchronous
//! string reads and writes under a single key. `MemoryStorage` backs
//! tests and short-lived processes; `FileStorage` persists across runs,
//! written atomically with owner-only permissions.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Synchronous key/value storage, localStorage-shaped
///
/// Writes are last-write-wins; a single active process is assumed to be
/// authoritative. Failures are logged, not propagated, so a broken
/// backend degrades to the not-authorized state instead of aborting a
/// flow.
pub trait TokenStorage: Send + Sync {
    /// Read the value stored under `key`
    fn get(&self, key: &str) -> Option<String>;
    /// Store `value` under `key`
    fn set(&self, key: &str, value: &str);
    /// Delete the entry under `key`
    fn remove(&self, key: &str);
}

/// In-memory storage
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    /// Create an empty in-memory storage
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStorage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .ok()
            .and_then(|entries| entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key.to_string(), value.to_string());
        }
    }

    fn remove(&self, key: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.remove(key);
        }
    }
}

/// File-backed storage holding a single JSON object of key/value pairs
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    /// Create a storage backed by the given file; the file is created on
    /// first write
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path to the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> HashMap<String, String> {
        std::fs::read_to_string(&self.path)
            .ok()
            .and_then(|content| serde_json::from_str(&content).ok())
            .unwrap_or_default()
    }

    fn save(&self, entries: &HashMap<String, String>) {
        if let Err(e) = self.try_save(entries) {
            tracing::warn!("Failed to persist token storage to {}: {}", self.path.display(), e);
        }
    }

    fn try_save(&self, entries: &HashMap<String, String>) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(entries).unwrap_or_else(|_| "{}".to_string());

        // Write to a temp file first, then rename for atomicity
        let temp_path = self.path.with_extension("json.tmp");
        std::fs::write(&temp_path, &content)?;

        // Tokens are secrets: owner read/write only on Unix
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let permissions = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(&temp_path, permissions)?;
        }

        std::fs::rename(&temp_path, &self.path)
    }
}

impl TokenStorage for FileStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.load().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        let mut entries = self.load();
        entries.insert(key.to_string(), value.to_string());
        self.save(&entries);
    }

    fn remove(&self, key: &str) {
        let mut entries = self.load();
        if entries.remove(key).is_some() {
            self.save(&entries);
        }
    }
}
