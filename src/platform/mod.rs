// src/platform/mod.rs - Backend adapters and platform selection

//! Storage backends and how they are opened.
//!
//! Every backend implements [`StorageProvider`]:
//!
//! - `DiskBox` (native): a named box in an embedded redb database, optionally
//!   encrypted with a [`BoxCipher`]
//! - [`WebSessionStorage`]: any [`SessionStore`], which on wasm is the
//!   browser's `sessionStorage`
//! - [`NoopStorage`]: the degraded backend that stores nothing
//!
//! The coordinator never opens a backend directly; it goes through a
//! [`BackendOpener`], which by default is [`PlatformOpener`].

use std::path::Path;
use std::sync::Arc;

use crate::error::{Error, Result};

pub mod cipher;
pub mod session;
pub mod storage;

#[cfg(not(target_arch = "wasm32"))]
pub mod native;
#[cfg(target_arch = "wasm32")]
pub mod web;

pub use cipher::{BoxCipher, ChaChaBoxCipher};
pub use session::{MemorySessionStore, SessionStore, WebSessionStorage};
pub use storage::{DynStorage, NoopStorage, StorageArc, StorageProvider};

#[cfg(not(target_arch = "wasm32"))]
pub use native::DiskBox;
#[cfg(target_arch = "wasm32")]
pub use web::BrowserSessionStore;

/// Name of the single box opened on the disk path.
pub const DEFAULT_BOX_NAME: &str = "hydrated_box";

/// Opens the two kinds of bound backend.
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
pub trait BackendOpener: Send + Sync + std::fmt::Debug {
    /// Opens or creates the named box rooted at `directory`
    async fn open_disk(
        &self,
        directory: &Path,
        box_name: &str,
        cipher: Option<Arc<dyn BoxCipher>>,
    ) -> Result<StorageArc>;

    /// Binds the session store
    fn bind_session(&self) -> Result<StorageArc>;
}

/// Opener for the current target.
///
/// Native builds open redb boxes and have no browser session storage unless a
/// store is supplied with [`PlatformOpener::with_session_store`]. Wasm builds
/// bind the window's `sessionStorage` and cannot open a disk box.
#[derive(Debug, Default, Clone)]
pub struct PlatformOpener {
    session_store: Option<Arc<dyn SessionStore>>,
}

impl PlatformOpener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses `store` for the web path instead of the platform session storage
    pub fn with_session_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.session_store = Some(store);
        self
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
impl BackendOpener for PlatformOpener {
    async fn open_disk(
        &self,
        directory: &Path,
        box_name: &str,
        cipher: Option<Arc<dyn BoxCipher>>,
    ) -> Result<StorageArc> {
        #[cfg(not(target_arch = "wasm32"))]
        {
            native::open_disk(directory, box_name, cipher).await
        }

        #[cfg(target_arch = "wasm32")]
        {
            let _ = (box_name, cipher);
            Err(Error::platform(
                "web",
                "disk_box",
                format!("no filesystem for {}", directory.display()),
            ))
        }
    }

    fn bind_session(&self) -> Result<StorageArc> {
        if let Some(store) = &self.session_store {
            return Ok(Arc::new(WebSessionStorage::new(store.clone())));
        }

        #[cfg(target_arch = "wasm32")]
        {
            web::bind_session()
        }

        #[cfg(not(target_arch = "wasm32"))]
        {
            Err(Error::platform(
                "native",
                "session_storage",
                "browser session storage is not available on this platform",
            ))
        }
    }
}
