//! Persisted parameter storage.
//!
//! Parameters declared with `persist = true` keep their last value across
//! registry reloads; everything else resets to its declared default. The
//! store is a plain string key-value surface so hosts can substitute their
//! own preference backend.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;

use tracing::warn;

/// Key-value store for persisted parameter values, keyed by storage ID.
pub trait ParamStore: Send + Sync {
    fn get(&self, id: &str) -> Option<String>;
    fn set(&self, id: &str, value: &str);
    fn unset(&self, id: &str);
}

/// In-memory store, mostly for tests and hosts without persistence.
#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ParamStore for MemoryStore {
    fn get(&self, id: &str) -> Option<String> {
        self.values.lock().ok()?.get(id).cloned()
    }

    fn set(&self, id: &str, value: &str) {
        if let Ok(mut values) = self.values.lock() {
            values.insert(id.to_string(), value.to_string());
        }
    }

    fn unset(&self, id: &str) {
        if let Ok(mut values) = self.values.lock() {
            values.remove(id);
        }
    }
}

/// File-backed store persisting to a JSON object on every mutation.
pub struct JsonFileStore {
    path: PathBuf,
    values: Mutex<BTreeMap<String, String>>,
}

impl JsonFileStore {
    /// Open the store, loading any existing file. A missing file starts
    /// empty; an unreadable one is logged and ignored.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let values = match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(values) => values,
                Err(e) => {
                    warn!("Ignoring corrupt param store {}: {}", path.display(), e);
                    BTreeMap::new()
                }
            },
            Err(_) => BTreeMap::new(),
        };
        Self {
            path,
            values: Mutex::new(values),
        }
    }

    fn flush(&self, values: &BTreeMap<String, String>) {
        if let Some(parent) = self.path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        match serde_json::to_string_pretty(values) {
            Ok(content) => {
                if let Err(e) = std::fs::write(&self.path, content) {
                    warn!("Failed to write param store {}: {}", self.path.display(), e);
                }
            }
            Err(e) => warn!("Failed to serialize param store: {}", e),
        }
    }
}

impl ParamStore for JsonFileStore {
    fn get(&self, id: &str) -> Option<String> {
        self.values.lock().ok()?.get(id).cloned()
    }

    fn set(&self, id: &str, value: &str) {
        if let Ok(mut values) = self.values.lock() {
            values.insert(id.to_string(), value.to_string());
            self.flush(&values);
        }
    }

    fn unset(&self, id: &str) {
        if let Ok(mut values) = self.values.lock() {
            values.remove(id);
            self.flush(&values);
        }
    }
}
