//! Durable key/value storage for the app id, access token and session marker.

use crate::error::{ConnectError, ConnectResult};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

pub mod keys {
    pub const APP_ID: &str = "uuid";
    pub const ACCESS_TOKEN: &str = "accessToken";
    pub const SESSION: &str = "session";
}

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> ConnectResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> ConnectResult<()>;
    fn remove(&self, key: &str) -> ConnectResult<()>;
}

/// Process-lifetime store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }

    pub fn with_entry(self, key: &str, value: &str) -> Self {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
        self
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> ConnectResult<Option<String>> {
        Ok(self.entries.lock().unwrap_or_else(PoisonError::into_inner).get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> ConnectResult<()> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> ConnectResult<()> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).remove(key);
        Ok(())
    }
}

#[cfg(feature = "native")]
pub use file::FileStore;

#[cfg(feature = "native")]
mod file {
    use super::*;
    use std::path::{Path, PathBuf};

    /// JSON map on disk, rewritten on every change.
    #[derive(Debug)]
    pub struct FileStore {
        path: PathBuf,
        lock: Mutex<()>,
    }

    impl FileStore {
        pub fn new(path: impl Into<PathBuf>) -> Self {
            Self { path: path.into(), lock: Mutex::new(()) }
        }

        /// `$COIN98_CONNECT_ROOT/<app>/data/connect.json`, falling back to the
        /// platform data directory.
        pub fn for_app(app: &str) -> Self {
            let root = std::env::var("COIN98_CONNECT_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|_| dirs::data_local_dir().unwrap_or_else(|| PathBuf::from(".")));
            Self::new(root.join(app).join("data").join("connect.json"))
        }

        pub fn path(&self) -> &Path {
            &self.path
        }

        fn load(&self) -> ConnectResult<HashMap<String, String>> {
            if !self.path.exists() {
                return Ok(HashMap::new());
            }
            let raw = std::fs::read_to_string(&self.path)
                .map_err(|e| ConnectError::Storage(format!("read {}: {e}", self.path.display())))?;
            Ok(serde_json::from_str(&raw)?)
        }

        fn save(&self, entries: &HashMap<String, String>) -> ConnectResult<()> {
            if let Some(parent) = self.path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConnectError::Storage(format!("mkdir: {e}")))?;
            }
            std::fs::write(&self.path, serde_json::to_string_pretty(entries)?)
                .map_err(|e| ConnectError::Storage(format!("write {}: {e}", self.path.display())))
        }
    }

    impl KeyValueStore for FileStore {
        fn get(&self, key: &str) -> ConnectResult<Option<String>> {
            let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
            Ok(self.load()?.remove(key))
        }

        fn set(&self, key: &str, value: &str) -> ConnectResult<()> {
            let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
            let mut entries = self.load()?;
            entries.insert(key.to_string(), value.to_string());
            self.save(&entries)
        }

        fn remove(&self, key: &str) -> ConnectResult<()> {
            let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
            let mut entries = self.load()?;
            if entries.remove(key).is_some() {
                self.save(&entries)?;
            }
            Ok(())
        }
    }
}
