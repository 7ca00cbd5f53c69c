// src/persistence.rs - Storage as a managed component

use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

use crate::config::StorageSettings;
use crate::coordinator::{BuildOptions, StorageCoordinator};
use crate::error::{Error, Result};
use crate::facade::StorageFacade;
use crate::manager::{HealthStatus, ManagedState, Manager, ManagerState, ManagerStatus};
use crate::platform::ChaChaBoxCipher;

enum CoordinatorRef {
    Global,
    Owned(Arc<StorageCoordinator>),
}

impl CoordinatorRef {
    fn get(&self) -> &StorageCoordinator {
        match self {
            Self::Global => StorageCoordinator::global(),
            Self::Owned(coordinator) => coordinator,
        }
    }
}

/// Builds storage from [`StorageSettings`] and tracks it as a [`Manager`].
///
/// By default the process-wide coordinator is used, so every manager in the
/// process shares one instance.
pub struct PersistenceManager {
    state: ManagedState,
    settings: StorageSettings,
    coordinator: CoordinatorRef,
    facade: Option<StorageFacade>,
}

impl fmt::Debug for PersistenceManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistenceManager")
            .field("state", &self.state)
            .field("location", &self.settings.location())
            .field("facade", &self.facade)
            .finish()
    }
}

impl PersistenceManager {
    pub fn new(settings: StorageSettings) -> Self {
        Self {
            state: ManagedState::new(Uuid::new_v4(), "persistence_manager"),
            settings,
            coordinator: CoordinatorRef::Global,
            facade: None,
        }
    }

    /// Uses `coordinator` instead of the process-wide one
    pub fn with_coordinator(mut self, coordinator: Arc<StorageCoordinator>) -> Self {
        self.coordinator = CoordinatorRef::Owned(coordinator);
        self
    }

    pub fn settings(&self) -> &StorageSettings {
        &self.settings
    }

    /// The built storage handle, if initialized
    pub fn storage(&self) -> Option<&StorageFacade> {
        self.facade.as_ref()
    }

    /// Like [`storage`](Self::storage) but an error before initialization
    pub fn require_storage(&self) -> Result<&StorageFacade> {
        self.facade
            .as_ref()
            .ok_or_else(|| Error::config("persistence manager is not initialized"))
    }

    fn build_options(&self) -> Result<BuildOptions> {
        let mut options = BuildOptions::new(self.settings.location())
            .with_box_name(self.settings.box_name.clone());

        if let Some(passphrase) = &self.settings.encryption_passphrase {
            let cipher = ChaChaBoxCipher::from_passphrase(passphrase)?;
            options = options.with_cipher(Arc::new(cipher));
        }

        Ok(options)
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
impl Manager for PersistenceManager {
    fn name(&self) -> &str {
        "persistence_manager"
    }

    fn id(&self) -> Uuid {
        self.state.id()
    }

    async fn initialize(&mut self) -> Result<()> {
        self.state.set_state(ManagerState::Initializing).await;

        let options = match self.build_options() {
            Ok(options) => options,
            Err(e) => {
                self.state.fail(&e).await;
                return Err(e);
            }
        };

        let facade = self.coordinator.get().build(options).await;

        if facade.is_degraded() {
            self.state.set_health(HealthStatus::Degraded).await;
            self.state
                .set_message("storage unavailable; values will not persist")
                .await;
        } else {
            self.state.set_health(HealthStatus::Healthy).await;
        }
        self.state
            .add_metadata("backend", serde_json::json!(facade.selection()))
            .await;
        self.state
            .add_metadata("instance", serde_json::json!(facade.id()))
            .await;

        self.facade = Some(facade);
        self.state.set_state(ManagerState::Running).await;
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<()> {
        self.state.set_state(ManagerState::ShuttingDown).await;
        self.facade = None;
        self.state.set_state(ManagerState::Shutdown).await;
        Ok(())
    }

    async fn status(&self) -> ManagerStatus {
        let mut status = self.state.status().await;
        status.add_metadata("box_name", serde_json::json!(self.settings.box_name));
        status.add_metadata(
            "encrypted",
            serde_json::json!(self.settings.encryption_passphrase.is_some()),
        );
        if let Some(facade) = &self.facade {
            if let Ok(keys) = facade.keys() {
                status.add_metadata("keys", serde_json::json!(keys.len()));
            }
        }
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{MemorySessionStore, PlatformOpener};
    use crate::types::BackendSelection;
    use serde_json::json;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn disk_settings(dir: &TempDir) -> StorageSettings {
        StorageSettings {
            directory: Some(dir.path().to_path_buf()),
            web: false,
            ..StorageSettings::default()
        }
    }

    fn isolated() -> Arc<StorageCoordinator> {
        Arc::new(StorageCoordinator::new())
    }

    #[tokio::test]
    async fn test_disk_lifecycle() {
        let dir = TempDir::new().unwrap();
        let mut manager = PersistenceManager::new(disk_settings(&dir)).with_coordinator(isolated());
        assert!(manager.require_storage().is_err());

        manager.initialize().await.unwrap();
        assert_eq!(manager.health_check().await, HealthStatus::Healthy);

        let storage = manager.require_storage().unwrap();
        assert_eq!(storage.selection(), BackendSelection::DiskBox);
        storage.write("theme", "dark").await.unwrap();

        let status = manager.status().await;
        assert_eq!(status.state, ManagerState::Running);
        assert_eq!(status.metadata.get("backend"), Some(&json!("DiskBox")));
        assert_eq!(status.metadata.get("keys"), Some(&json!(1)));

        manager.shutdown().await.unwrap();
        assert!(manager.storage().is_none());
        assert_eq!(manager.status().await.state, ManagerState::Shutdown);
    }

    #[tokio::test]
    async fn test_encrypted_settings() {
        let dir = TempDir::new().unwrap();
        let settings = StorageSettings {
            encryption_passphrase: Some("correct horse".to_string()),
            ..disk_settings(&dir)
        };
        let mut manager = PersistenceManager::new(settings).with_coordinator(isolated());

        manager.initialize().await.unwrap();
        let storage = manager.require_storage().unwrap();
        storage.write("n", 3).await.unwrap();
        assert_eq!(storage.read("n").unwrap(), Some(json!(3)));
        assert_eq!(manager.status().await.metadata.get("encrypted"), Some(&json!(true)));
    }

    #[tokio::test]
    async fn test_web_without_session_store_is_degraded() {
        let settings = StorageSettings {
            web: true,
            ..StorageSettings::default()
        };
        let mut manager = PersistenceManager::new(settings).with_coordinator(isolated());

        manager.initialize().await.unwrap();

        assert_eq!(manager.health_check().await, HealthStatus::Degraded);
        assert!(manager.require_storage().unwrap().is_degraded());
    }

    #[tokio::test]
    async fn test_empty_directory_selects_web() {
        let opener = PlatformOpener::new().with_session_store(Arc::new(MemorySessionStore::new()));
        let coordinator = Arc::new(StorageCoordinator::with_opener(Arc::new(opener)));
        let settings = StorageSettings {
            directory: Some(PathBuf::new()),
            web: false,
            ..StorageSettings::default()
        };
        let mut manager = PersistenceManager::new(settings).with_coordinator(coordinator);

        manager.initialize().await.unwrap();

        let storage = manager.require_storage().unwrap();
        assert_eq!(storage.selection(), BackendSelection::WebSession);
        storage.write("count", 5).await.unwrap();
        assert_eq!(storage.read("count").unwrap(), Some(json!("5")));
    }

    #[tokio::test]
    async fn test_managers_share_coordinator_instance() {
        let dir = TempDir::new().unwrap();
        let coordinator = isolated();
        let mut first =
            PersistenceManager::new(disk_settings(&dir)).with_coordinator(coordinator.clone());
        let mut second =
            PersistenceManager::new(disk_settings(&dir)).with_coordinator(coordinator);

        first.initialize().await.unwrap();
        second.initialize().await.unwrap();

        let a = first.require_storage().unwrap();
        let b = second.require_storage().unwrap();
        assert!(a.same_instance(b));
    }
}
