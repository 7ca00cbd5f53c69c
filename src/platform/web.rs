// src/platform/web.rs - Web/WASM platform implementations

use std::sync::Arc;

use web_sys::Storage;

use crate::error::{Error, Result};
use crate::platform::session::{SessionStore, WebSessionStorage};
use crate::platform::storage::StorageArc;

/// Binds the window's `sessionStorage`, failing if it is unavailable.
pub fn bind_session() -> Result<StorageArc> {
    let store = BrowserSessionStore::bind()?;
    web_sys::console::log_1(&"statebox: bound to sessionStorage".into());
    Ok(Arc::new(WebSessionStorage::new(Arc::new(store))))
}

/// Browser `sessionStorage`.
///
/// The `Storage` handle is looked up on every call rather than held, which
/// keeps the store `Send + Sync` for the process-wide instance.
#[derive(Debug, Default, Clone, Copy)]
pub struct BrowserSessionStore;

impl BrowserSessionStore {
    pub fn bind() -> Result<Self> {
        let store = Self;
        store.get_storage()?;
        Ok(store)
    }

    fn get_storage(&self) -> Result<Storage> {
        web_sys::window()
            .and_then(|w| w.session_storage().ok())
            .flatten()
            .ok_or_else(|| {
                Error::platform("web", "session_storage", "sessionStorage not available")
            })
    }
}

impl SessionStore for BrowserSessionStore {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        self.get_storage()?.get_item(key).map_err(|e| {
            Error::platform("web", "session_storage", format!("Failed to get item: {:?}", e))
        })
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.get_storage()?.set_item(key, value).map_err(|e| {
            Error::platform("web", "session_storage", format!("Failed to set item: {:?}", e))
        })
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        self.get_storage()?.remove_item(key).map_err(|e| {
            Error::platform("web", "session_storage", format!("Failed to remove item: {:?}", e))
        })
    }

    fn clear(&self) -> Result<()> {
        self.get_storage()?.clear().map_err(|e| {
            Error::platform("web", "session_storage", format!("Failed to clear storage: {:?}", e))
        })
    }

    fn keys(&self) -> Result<Vec<String>> {
        let storage = self.get_storage()?;
        let length = storage.length().map_err(|e| {
            Error::platform(
                "web",
                "session_storage",
                format!("Failed to get storage length: {:?}", e),
            )
        })?;

        let mut keys = Vec::new();
        for i in 0..length {
            if let Ok(Some(key)) = storage.key(i) {
                keys.push(key);
            }
        }
        Ok(keys)
    }
}
