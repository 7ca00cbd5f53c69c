// src/platform/storage.rs

use std::sync::Arc;

use serde_json::Value;

use crate::error::{Error, Result};
use crate::types::BackendSelection;

pub type DynStorage = dyn StorageProvider + Send + Sync;

pub type StorageArc = Arc<DynStorage>;

/// Key-value capability shared by every backend.
///
/// Reads are synchronous so hydration can happen without suspending. Mutations
/// are async because the disk box and the legacy migration suspend on I/O.
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
pub trait StorageProvider: StorageBounds {
    /// Which backend this provider represents
    fn selection(&self) -> BackendSelection;

    /// Returns `Ok(None)` for a missing key; any other failure is an error
    fn get(&self, key: &str) -> Result<Option<Value>>;

    fn keys(&self) -> Result<Vec<String>>;

    async fn set(&self, key: &str, value: &Value) -> Result<()>;

    /// Removing a missing key is not an error
    async fn delete(&self, key: &str) -> Result<()>;

    async fn clear(&self) -> Result<()>;
}

pub trait StorageBounds: Send + Sync {}

/// Backend used by a degraded instance: nothing is stored, nothing is found.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopStorage;

impl StorageBounds for NoopStorage {}

#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
impl StorageProvider for NoopStorage {
    fn selection(&self) -> BackendSelection {
        BackendSelection::None
    }

    fn get(&self, _key: &str) -> Result<Option<Value>> {
        Ok(None)
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    async fn set(&self, _key: &str, _value: &Value) -> Result<()> {
        Ok(())
    }

    async fn delete(&self, _key: &str) -> Result<()> {
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        Ok(())
    }
}

/// Rejects keys the backends cannot address.
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(Error::validation("key", "storage key must not be empty"));
    }
    Ok(())
}
