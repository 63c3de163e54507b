//! Persisted client state.
//!
//! A small string key/value store with a browser `localStorage` backend on
//! wasm32, a JSON file backend on native targets and an in-memory backend.
//! Values are JSON; a corrupt value reads as an error, never as a panic.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub const VIEW_STATE_KEY: &str = "airq.view-state";
pub const AUTH_KEY: &str = "airq.auth";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    StorageUnavailable,
    Corrupt(String),
    Io(String),
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::StorageUnavailable => write!(f, "session storage unavailable"),
            SessionError::Corrupt(msg) => write!(f, "session storage corrupt: {msg}"),
            SessionError::Io(msg) => write!(f, "session storage error: {msg}"),
        }
    }
}

impl std::error::Error for SessionError {}

pub trait SessionStore {
    fn get(&self, key: &str) -> Result<Option<String>, SessionError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), SessionError>;
    /// Returns `true` if a value was removed.
    fn remove(&mut self, key: &str) -> Result<bool, SessionError>;
}

pub fn load_json<T: DeserializeOwned>(
    store: &dyn SessionStore,
    key: &str,
) -> Result<Option<T>, SessionError> {
    let Some(raw) = store.get(key)? else {
        return Ok(None);
    };
    if raw.trim().is_empty() {
        return Ok(None);
    }
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|e| SessionError::Corrupt(format!("{key}: {e}")))
}

pub fn save_json<T: Serialize>(
    store: &mut dyn SessionStore,
    key: &str,
    value: &T,
) -> Result<(), SessionError> {
    let raw = serde_json::to_string(value).map_err(|e| SessionError::Io(e.to_string()))?;
    store.set(key, &raw)
}

/// Tokens issued by the backend's auth service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthTokens {
    pub access: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh: Option<String>,
}

pub fn load_auth(store: &dyn SessionStore) -> Result<Option<AuthTokens>, SessionError> {
    load_json(store, AUTH_KEY)
}

pub fn save_auth(store: &mut dyn SessionStore, tokens: &AuthTokens) -> Result<(), SessionError> {
    save_json(store, AUTH_KEY, tokens)
}

pub fn clear_auth(store: &mut dyn SessionStore) -> Result<bool, SessionError> {
    store.remove(AUTH_KEY)
}

#[derive(Debug, Default, Clone)]
pub struct InMemorySessionStore {
    values: BTreeMap<String, String>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for InMemorySessionStore {
    fn get(&self, key: &str) -> Result<Option<String>, SessionError> {
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), SessionError> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<bool, SessionError> {
        Ok(self.values.remove(key).is_some())
    }
}

#[cfg(not(target_arch = "wasm32"))]
mod file_storage {
    use std::collections::BTreeMap;
    use std::path::{Path, PathBuf};

    use super::{SessionError, SessionStore};

    /// All keys in one JSON object on disk, rewritten on every change.
    #[derive(Debug)]
    pub struct FileSessionStore {
        path: PathBuf,
        values: BTreeMap<String, String>,
    }

    impl FileSessionStore {
        /// Opens `path`, starting empty if it does not exist.
        pub fn open(path: impl Into<PathBuf>) -> Result<Self, SessionError> {
            let path = path.into();
            let values = match std::fs::read_to_string(&path) {
                Ok(raw) if raw.trim().is_empty() => BTreeMap::new(),
                Ok(raw) => serde_json::from_str(&raw)
                    .map_err(|e| SessionError::Corrupt(format!("{}: {e}", path.display())))?,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
                Err(e) => return Err(SessionError::Io(format!("{}: {e}", path.display()))),
            };
            Ok(Self { path, values })
        }

        pub fn path(&self) -> &Path {
            &self.path
        }

        fn flush(&self) -> Result<(), SessionError> {
            if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
                std::fs::create_dir_all(dir).map_err(|e| SessionError::Io(e.to_string()))?;
            }
            let raw = serde_json::to_string_pretty(&self.values)
                .map_err(|e| SessionError::Io(e.to_string()))?;
            let tmp = self.path.with_extension("tmp");
            std::fs::write(&tmp, raw).map_err(|e| SessionError::Io(e.to_string()))?;
            std::fs::rename(&tmp, &self.path).map_err(|e| SessionError::Io(e.to_string()))?;
            tracing::trace!(path = %self.path.display(), "session flushed");
            Ok(())
        }
    }

    impl SessionStore for FileSessionStore {
        fn get(&self, key: &str) -> Result<Option<String>, SessionError> {
            Ok(self.values.get(key).cloned())
        }

        fn set(&mut self, key: &str, value: &str) -> Result<(), SessionError> {
            self.values.insert(key.to_string(), value.to_string());
            self.flush()
        }

        fn remove(&mut self, key: &str) -> Result<bool, SessionError> {
            let removed = self.values.remove(key).is_some();
            if removed {
                self.flush()?;
            }
            Ok(removed)
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
pub use file_storage::FileSessionStore;

#[cfg(target_arch = "wasm32")]
mod wasm_storage {
    use super::{SessionError, SessionStore};

    #[derive(Debug, Default)]
    pub struct LocalStorageSessionStore;

    impl LocalStorageSessionStore {
        pub fn new() -> Result<Self, SessionError> {
            window_local_storage()?;
            Ok(Self)
        }
    }

    impl SessionStore for LocalStorageSessionStore {
        fn get(&self, key: &str) -> Result<Option<String>, SessionError> {
            window_local_storage()?
                .get_item(key)
                .map_err(|e| SessionError::Io(format!("get_item({key}) failed: {e:?}")))
        }

        fn set(&mut self, key: &str, value: &str) -> Result<(), SessionError> {
            window_local_storage()?
                .set_item(key, value)
                .map_err(|e| SessionError::Io(format!("set_item({key}) failed: {e:?}")))
        }

        fn remove(&mut self, key: &str) -> Result<bool, SessionError> {
            let storage = window_local_storage()?;
            let existed = storage
                .get_item(key)
                .map_err(|e| SessionError::Io(format!("get_item({key}) failed: {e:?}")))?
                .is_some();
            storage
                .remove_item(key)
                .map_err(|e| SessionError::Io(format!("remove_item({key}) failed: {e:?}")))?;
            Ok(existed)
        }
    }

    fn window_local_storage() -> Result<web_sys::Storage, SessionError> {
        let win = web_sys::window().ok_or(SessionError::StorageUnavailable)?;
        win.local_storage()
            .map_err(|e| SessionError::Io(format!("localStorage error: {e:?}")))?
            .ok_or(SessionError::StorageUnavailable)
    }
}

#[cfg(target_arch = "wasm32")]
pub use wasm_storage::LocalStorageSessionStore;

#[cfg(not(target_arch = "wasm32"))]
#[derive(Debug)]
pub struct LocalStorageSessionStore;

#[cfg(not(target_arch = "wasm32"))]
impl LocalStorageSessionStore {
    pub fn new() -> Result<Self, SessionError> {
        Err(SessionError::StorageUnavailable)
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl SessionStore for LocalStorageSessionStore {
    fn get(&self, _key: &str) -> Result<Option<String>, SessionError> {
        Err(SessionError::StorageUnavailable)
    }

    fn set(&mut self, _key: &str, _value: &str) -> Result<(), SessionError> {
        Err(SessionError::StorageUnavailable)
    }

    fn remove(&mut self, _key: &str) -> Result<bool, SessionError> {
        Err(SessionError::StorageUnavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn auth_tokens_round_trip_and_clear() {
        let mut store = InMemorySessionStore::new();
        assert_eq!(load_auth(&store), Ok(None));

        let tokens = AuthTokens {
            access: "a".into(),
            refresh: Some("r".into()),
        };
        save_auth(&mut store, &tokens).expect("save");
        assert_eq!(load_auth(&store), Ok(Some(tokens)));
        assert_eq!(clear_auth(&mut store), Ok(true));
        assert_eq!(clear_auth(&mut store), Ok(false));
    }

    #[test]
    fn corrupt_values_are_reported() {
        let mut store = InMemorySessionStore::new();
        store.set(AUTH_KEY, "{not json").expect("set");
        assert!(matches!(load_auth(&store), Err(SessionError::Corrupt(_))));
    }

    #[cfg(not(target_arch = "wasm32"))]
    #[test]
    fn file_store_persists_across_opens() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("session.json");

        let mut store = FileSessionStore::open(&path).expect("open");
        save_json(&mut store, VIEW_STATE_KEY, &vec![1, 2, 3]).expect("save");

        let reopened = FileSessionStore::open(&path).expect("reopen");
        let value: Option<Vec<i32>> = load_json(&reopened, VIEW_STATE_KEY).expect("load");
        assert_eq!(value, Some(vec![1, 2, 3]));
    }

    #[cfg(not(target_arch = "wasm32"))]
    #[test]
    fn local_storage_is_unavailable_natively() {
        assert_eq!(
            LocalStorageSessionStore::new().err(),
            Some(SessionError::StorageUnavailable)
        );
    }
}
