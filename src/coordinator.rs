// src/coordinator.rs - Process-wide storage initialization

//! Builds the storage instance exactly once.
//!
//! [`StorageCoordinator::build`] holds one mutex across the whole sequence:
//!
//! 1. If an instance is already published, return it.
//! 2. Otherwise bind session storage (web location) or open the disk box and
//!    run the legacy migration (directory location).
//! 3. Publish the result.
//!
//! Any failure in step 2 publishes a degraded instance instead. Callers of
//! `build` never see an error; the worst case is that nothing persists.
//! The published instance is only reset by a successful
//! [`StorageFacade::clear`].

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use once_cell::sync::Lazy;
use tokio::sync::Mutex;

use crate::error::Result;
use crate::facade::{FacadeCore, StorageFacade};
use crate::platform::{BackendOpener, BoxCipher, PlatformOpener, StorageArc, DEFAULT_BOX_NAME};
use crate::types::StorageLocation;

/// Slot holding the published instance. Its mutex serializes the build
/// sequence and every mutation made through a facade.
pub(crate) type InstanceSlot = Arc<Mutex<Option<Arc<FacadeCore>>>>;

static GLOBAL: Lazy<StorageCoordinator> = Lazy::new(StorageCoordinator::new);

/// Builds storage with the process-wide coordinator.
pub async fn build(options: BuildOptions) -> StorageFacade {
    StorageCoordinator::global().build(options).await
}

/// Parameters of a build.
#[derive(Clone)]
pub struct BuildOptions {
    pub location: StorageLocation,
    pub cipher: Option<Arc<dyn BoxCipher>>,
    pub box_name: String,
}

impl fmt::Debug for BuildOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildOptions")
            .field("location", &self.location)
            .field("encrypted", &self.cipher.is_some())
            .field("box_name", &self.box_name)
            .finish()
    }
}

impl BuildOptions {
    pub fn new(location: impl Into<StorageLocation>) -> Self {
        Self {
            location: location.into(),
            cipher: None,
            box_name: DEFAULT_BOX_NAME.to_string(),
        }
    }

    /// Disk storage rooted at `directory`
    pub fn directory(directory: impl AsRef<Path>) -> Self {
        Self::new(StorageLocation::from(directory.as_ref()))
    }

    /// Browser session storage
    pub fn web() -> Self {
        Self::new(StorageLocation::WebSession)
    }

    /// Encrypts the disk box. Ignored on the web path.
    pub fn with_cipher(mut self, cipher: Arc<dyn BoxCipher>) -> Self {
        self.cipher = Some(cipher);
        self
    }

    pub fn with_box_name(mut self, box_name: impl Into<String>) -> Self {
        self.box_name = box_name.into();
        self
    }
}

/// Owner of the instance slot and the backend opener.
pub struct StorageCoordinator {
    slot: InstanceSlot,
    opener: Arc<dyn BackendOpener>,
}

impl fmt::Debug for StorageCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageCoordinator")
            .field("opener", &self.opener)
            .finish()
    }
}

impl Default for StorageCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageCoordinator {
    pub fn new() -> Self {
        Self::with_opener(Arc::new(PlatformOpener::new()))
    }

    pub fn with_opener(opener: Arc<dyn BackendOpener>) -> Self {
        Self {
            slot: Arc::new(Mutex::new(None)),
            opener,
        }
    }

    /// The process-wide coordinator
    pub fn global() -> &'static StorageCoordinator {
        &GLOBAL
    }

    /// Returns the published instance, building it first if there is none.
    ///
    /// Concurrent callers wait on the mutex; only the first runs
    /// initialization and the rest receive the same instance.
    pub async fn build(&self, options: BuildOptions) -> StorageFacade {
        let mut slot = self.slot.lock().await;
        if let Some(core) = slot.as_ref() {
            return StorageFacade::new(core.clone(), self.slot.clone());
        }

        tracing::info!(location = ?options.location, "initializing storage");
        let core = degrade_on_failure(self.initialize(&options).await);
        *slot = Some(core.clone());
        tracing::info!(backend = %core.selection(), "storage instance published");

        StorageFacade::new(core, self.slot.clone())
    }

    /// The published instance, without building one
    pub async fn current(&self) -> Option<StorageFacade> {
        self.slot
            .lock()
            .await
            .as_ref()
            .map(|core| StorageFacade::new(core.clone(), self.slot.clone()))
    }

    async fn initialize(&self, options: &BuildOptions) -> Result<Arc<FacadeCore>> {
        let backend = match &options.location {
            StorageLocation::WebSession => self.opener.bind_session()?,
            StorageLocation::Directory(directory) => {
                self.open_disk(directory, options).await?
            }
        };
        Ok(FacadeCore::new(backend))
    }

    async fn open_disk(&self, directory: &Path, options: &BuildOptions) -> Result<StorageArc> {
        let backend = self
            .opener
            .open_disk(directory, &options.box_name, options.cipher.clone())
            .await?;

        #[cfg(not(target_arch = "wasm32"))]
        {
            let report = crate::migration::migrate(directory, backend.as_ref()).await?;
            if report.file_found {
                tracing::debug!(?report, "legacy cache processed");
            }
        }

        Ok(backend)
    }
}

/// The single degradation decision: any initialization error yields an
/// instance with no backend.
fn degrade_on_failure(result: Result<Arc<FacadeCore>>) -> Arc<FacadeCore> {
    match result {
        Ok(core) => core,
        Err(e) => {
            tracing::warn!(
                error = %e,
                "storage initialization failed, continuing without persistence"
            );
            FacadeCore::degraded()
        }
    }
}
