// src/platform/session.rs - Session storage backend

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

use crate::error::{Error, Result, StorageOperation};
use crate::platform::storage::{validate_key, StorageBounds, StorageProvider};
use crate::types::BackendSelection;

/// Synchronous string-keyed store with the shape of the browser's `sessionStorage`.
pub trait SessionStore: Send + Sync + std::fmt::Debug {
    fn get_item(&self, key: &str) -> Result<Option<String>>;
    fn set_item(&self, key: &str, value: &str) -> Result<()>;
    fn remove_item(&self, key: &str) -> Result<()>;
    fn clear(&self) -> Result<()>;
    fn keys(&self) -> Result<Vec<String>>;
}

/// In-process session store, used wherever no browser is present.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    items: RwLock<BTreeMap<String, String>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }
}

impl SessionStore for MemorySessionStore {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.items.read().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.items.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        self.items.write().remove(key);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.items.write().clear();
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.items.read().keys().cloned().collect())
    }
}

/// Session storage only holds strings. A JSON string is kept as its raw text,
/// anything else as its JSON serialization.
pub fn to_session_string(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Backend adapter over a [`SessionStore`]. Reads always come back as strings.
#[derive(Debug, Clone)]
pub struct WebSessionStorage {
    store: Arc<dyn SessionStore>,
}

impl WebSessionStorage {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    fn backend_error(operation: StorageOperation, err: Error) -> Error {
        Error::storage("web_session", operation, "session storage call failed").caused_by(err)
    }
}

impl StorageBounds for WebSessionStorage {}

#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
impl StorageProvider for WebSessionStorage {
    fn selection(&self) -> BackendSelection {
        BackendSelection::WebSession
    }

    fn get(&self, key: &str) -> Result<Option<Value>> {
        validate_key(key)?;
        let item = self
            .store
            .get_item(key)
            .map_err(|e| Self::backend_error(StorageOperation::Read, e))?;
        Ok(item.map(Value::String))
    }

    fn keys(&self) -> Result<Vec<String>> {
        self.store
            .keys()
            .map_err(|e| Self::backend_error(StorageOperation::ListKeys, e))
    }

    async fn set(&self, key: &str, value: &Value) -> Result<()> {
        validate_key(key)?;
        tracing::trace!(key, "session storage set");
        self.store
            .set_item(key, &to_session_string(value))
            .map_err(|e| Self::backend_error(StorageOperation::Write, e))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        validate_key(key)?;
        self.store
            .remove_item(key)
            .map_err(|e| Self::backend_error(StorageOperation::Delete, e))
    }

    async fn clear(&self) -> Result<()> {
        self.store
            .clear()
            .map_err(|e| Self::backend_error(StorageOperation::Clear, e))
    }
}
