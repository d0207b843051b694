//! KeyValueStore trait abstraction for persisted client state.
//!
//! Implementations:
//! - `InMemoryKv` - For testing
//! - `JsonFileStore` (in notes-client) - One JSON file per key on disk
//!
//! All calls are synchronous and must be durable when they return: callers
//! rely on every mutation surviving an abrupt termination.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::RwLock;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid key: {0}")]
    InvalidKey(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Keys of the persisted client state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateKey {
    Notes,
    PendingCreates,
    PendingUpdates,
    PendingDeletes,
    Mode,
}

impl StateKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            StateKey::Notes => "notes",
            StateKey::PendingCreates => "pendingCreates",
            StateKey::PendingUpdates => "pendingUpdates",
            StateKey::PendingDeletes => "pendingDeletes",
            StateKey::Mode => "mode",
        }
    }
}

/// Prefix that keeps one client's keys apart from anything else in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace(String);

impl Namespace {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Full key for a piece of state, e.g. `notes-sync/pendingCreates`.
    pub fn key(&self, key: StateKey) -> String {
        format!("{}/{}", self.0, key.as_str())
    }
}

impl Default for Namespace {
    fn default() -> Self {
        Self::new("notes-sync")
    }
}

/// Synchronous, durable string key-value storage.
pub trait KeyValueStore: Send + Sync {
    /// Read a value, `None` if the key was never written or was removed.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a value, replacing any previous one.
    fn put(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a key. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<()>;
}

/// Read and decode a JSON value.
pub fn read_json<T, K>(store: &K, key: &str) -> Result<Option<T>>
where
    T: DeserializeOwned,
    K: KeyValueStore + ?Sized,
{
    match store.get(key)? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

/// Encode and write a JSON value.
pub fn write_json<T, K>(store: &K, key: &str, value: &T) -> Result<()>
where
    T: Serialize + ?Sized,
    K: KeyValueStore + ?Sized,
{
    let raw = serde_json::to_string(value)?;
    store.put(key, &raw)
}

/// In-memory store for testing
#[derive(Default)]
pub struct InMemoryKv {
    values: RwLock<HashMap<String, String>>,
}

impl InMemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    /// All keys currently stored, sorted.
    pub fn keys(&self) -> Vec<String> {
        let values = self.values.read().unwrap_or_else(|e| e.into_inner());
        let mut keys: Vec<_> = values.keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl KeyValueStore for InMemoryKv {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let values = self.values.read().unwrap_or_else(|e| e.into_inner());
        Ok(values.get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> Result<()> {
        if key.is_empty() {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        let mut values = self.values.write().unwrap_or_else(|e| e.into_inner());
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut values = self.values.write().unwrap_or_else(|e| e.into_inner());
        values.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespaced_keys() {
        let ns = Namespace::new("alice");
        assert_eq!(ns.key(StateKey::Notes), "alice/notes");
        assert_eq!(ns.key(StateKey::PendingDeletes), "alice/pendingDeletes");
        assert_eq!(Namespace::default().key(StateKey::Mode), "notes-sync/mode");
    }

    #[test]
    fn test_put_get_remove() {
        let kv = InMemoryKv::new();
        assert_eq!(kv.get("a").unwrap(), None);

        kv.put("a", "1").unwrap();
        assert_eq!(kv.get("a").unwrap().as_deref(), Some("1"));

        kv.remove("a").unwrap();
        assert_eq!(kv.get("a").unwrap(), None);
        // Removing again is fine
        kv.remove("a").unwrap();
    }

    #[test]
    fn test_json_helpers() {
        let kv = InMemoryKv::new();
        write_json(&kv, "list", &vec![1, 2, 3]).unwrap();

        let loaded: Option<Vec<u32>> = read_json(&kv, "list").unwrap();
        assert_eq!(loaded, Some(vec![1, 2, 3]));

        let missing: Option<Vec<u32>> = read_json(&kv, "nope").unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn test_corrupt_json_is_an_error() {
        let kv = InMemoryKv::new();
        kv.put("bad", "{not json").unwrap();
        let result: Result<Option<Vec<u32>>> = read_json(&kv, "bad");
        assert!(matches!(result, Err(StoreError::Serialization(_))));
    }
}
