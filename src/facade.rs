// src/facade.rs - Public read/write/delete/clear contract

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde_json::Value;
use uuid::Uuid;

use crate::coordinator::InstanceSlot;
use crate::error::{Error, Result, StorageOperation};
use crate::manager::{HealthStatus, ManagerState, ManagerStatus};
use crate::platform::storage::{NoopStorage, StorageArc};
use crate::types::BackendSelection;

/// The published instance: one backend, fixed at build time.
///
/// A successful clear swaps the backend for [`NoopStorage`], which drops the
/// last reference to the bound backend and frees its resources (the redb
/// file lock in particular) before the next build.
pub(crate) struct FacadeCore {
    id: Uuid,
    backend: RwLock<StorageArc>,
    selection: BackendSelection,
    released: AtomicBool,
    created_at: DateTime<Utc>,
}

impl FacadeCore {
    pub(crate) fn new(backend: StorageArc) -> Arc<Self> {
        let selection = backend.selection();
        Arc::new(Self {
            id: Uuid::new_v4(),
            backend: RwLock::new(backend),
            selection,
            released: AtomicBool::new(false),
            created_at: Utc::now(),
        })
    }

    pub(crate) fn degraded() -> Arc<Self> {
        Self::new(Arc::new(NoopStorage))
    }

    pub(crate) fn selection(&self) -> BackendSelection {
        self.selection
    }

    fn backend(&self) -> StorageArc {
        self.backend.read().clone()
    }

    fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    fn release(&self) {
        let previous = std::mem::replace(&mut *self.backend.write(), Arc::new(NoopStorage));
        self.released.store(true, Ordering::SeqCst);
        drop(previous);
    }

    fn released_error(&self, operation: StorageOperation) -> Error {
        Error::storage(
            self.selection.to_string(),
            operation,
            "storage instance was cleared; build storage again",
        )
    }
}

/// Handle to the storage instance published by the coordinator.
///
/// Handles are cheap to clone; all clones returned by the same build refer to
/// the same instance. Mutations are serialized through the coordinator mutex,
/// which also guards the build sequence, so no mutation starts before
/// initialization has finished. Reads do not take the mutex.
///
/// A degraded handle has no backend: reads return `None` and mutations
/// succeed without doing anything.
///
/// After a successful [`clear`](Self::clear) the handle is released. Reads
/// return `None`, `clear` does nothing, and `write`, `update` and `delete`
/// fail. Call the coordinator's `build` again for a live handle.
#[derive(Clone)]
pub struct StorageFacade {
    core: Arc<FacadeCore>,
    slot: InstanceSlot,
}

impl fmt::Debug for StorageFacade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageFacade")
            .field("id", &self.core.id)
            .field("selection", &self.core.selection)
            .field("released", &self.core.is_released())
            .finish()
    }
}

impl StorageFacade {
    pub(crate) fn new(core: Arc<FacadeCore>, slot: InstanceSlot) -> Self {
        Self { core, slot }
    }

    pub fn id(&self) -> Uuid {
        self.core.id
    }

    pub fn selection(&self) -> BackendSelection {
        self.core.selection
    }

    pub fn is_degraded(&self) -> bool {
        self.core.selection == BackendSelection::None
    }

    /// Whether a clear has released this instance's backend
    pub fn is_released(&self) -> bool {
        self.core.is_released()
    }

    /// Whether both handles refer to the same built instance
    pub fn same_instance(&self, other: &StorageFacade) -> bool {
        Arc::ptr_eq(&self.core, &other.core)
    }

    /// Reads a value without suspending. A missing key is `Ok(None)`.
    pub fn read(&self, key: &str) -> Result<Option<Value>> {
        if self.is_degraded() {
            return Ok(None);
        }
        // The read guard keeps a concurrent clear from releasing mid-read
        self.core.backend.read().get(key)
    }

    /// Lists stored keys
    pub fn keys(&self) -> Result<Vec<String>> {
        self.core.backend.read().keys()
    }

    pub async fn write(&self, key: &str, value: impl Into<Value>) -> Result<()> {
        if self.is_degraded() {
            return Ok(());
        }

        let value = value.into();
        let _guard = self.slot.lock().await;
        if self.core.is_released() {
            return Err(self.core.released_error(StorageOperation::Write));
        }
        tracing::debug!(key, backend = %self.core.selection, "write");
        self.core.backend().set(key, &value).await
    }

    /// Reads, transforms and writes back one key while holding the mutex, so
    /// concurrent updates of the same key apply one after another.
    pub async fn update<F>(&self, key: &str, f: F) -> Result<Value>
    where
        F: FnOnce(Option<Value>) -> Value + Send,
    {
        if self.is_degraded() {
            return Ok(f(None));
        }

        let _guard = self.slot.lock().await;
        if self.core.is_released() {
            return Err(self.core.released_error(StorageOperation::Write));
        }
        let backend = self.core.backend();
        let current = backend.get(key)?;
        let next = f(current);
        backend.set(key, &next).await?;
        Ok(next)
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        if self.is_degraded() {
            return Ok(());
        }

        let _guard = self.slot.lock().await;
        if self.core.is_released() {
            return Err(self.core.released_error(StorageOperation::Delete));
        }
        tracing::debug!(key, backend = %self.core.selection, "delete");
        self.core.backend().delete(key).await
    }

    /// Removes every key, releases the backend and unpublishes this instance,
    /// so the next build runs full initialization again.
    ///
    /// The instance stays published and bound if the backend fails to clear.
    /// Clearing a degraded or already released instance does nothing.
    pub async fn clear(&self) -> Result<()> {
        if self.is_degraded() {
            return Ok(());
        }

        let mut guard = self.slot.lock().await;
        if self.core.is_released() {
            return Ok(());
        }
        self.core.backend().clear().await?;
        self.core.release();

        let published = guard
            .as_ref()
            .map_or(false, |current| Arc::ptr_eq(current, &self.core));
        if published {
            *guard = None;
        }
        tracing::info!(instance = %self.core.id, published, "storage cleared and released");
        Ok(())
    }

    /// Reports the instance as a component. Degraded instances report
    /// [`HealthStatus::Degraded`]; released ones report as shut down.
    pub fn status(&self) -> ManagerStatus {
        let mut status = ManagerStatus::new(self.core.id, "storage_facade", ManagerState::Running);
        status.started_at = Some(self.core.created_at);

        if self.is_released() {
            status.update_state(ManagerState::Shutdown);
            status.set_health(HealthStatus::Unknown);
            status.set_message("cleared; build storage again");
        } else if self.is_degraded() {
            status.set_health(HealthStatus::Degraded);
            status.set_message("no storage backend bound; values will not persist");
        } else {
            status.set_health(HealthStatus::Healthy);
        }
        status.add_metadata("backend", serde_json::json!(self.core.selection));
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::session::{MemorySessionStore, WebSessionStorage};
    use crate::platform::{DiskBox, StorageProvider};
    use serde_json::json;
    use tempfile::TempDir;
    use tokio::sync::Mutex;

    fn published(backend: StorageArc) -> (StorageFacade, InstanceSlot) {
        let core = FacadeCore::new(backend);
        let slot: InstanceSlot = Arc::new(Mutex::new(Some(core.clone())));
        (StorageFacade::new(core, slot.clone()), slot)
    }

    fn session_backend() -> StorageArc {
        Arc::new(WebSessionStorage::new(Arc::new(MemorySessionStore::new())))
    }

    #[tokio::test]
    async fn test_disk_write_read_delete() {
        let dir = TempDir::new().unwrap();
        let disk_box = DiskBox::open(dir.path(), "state", None).unwrap();
        let (facade, _) = published(Arc::new(disk_box));

        facade.write("counter", json!({"value": 1})).await.unwrap();
        assert_eq!(facade.read("counter").unwrap(), Some(json!({"value": 1})));

        facade.delete("counter").await.unwrap();
        assert_eq!(facade.read("counter").unwrap(), None);
        facade.delete("never-written").await.unwrap();
        assert_eq!(facade.read("never-written").unwrap(), None);
    }

    #[tokio::test]
    async fn test_web_write_is_string_coerced() {
        let (facade, _) = published(session_backend());

        facade.write("count", 5).await.unwrap();
        assert_eq!(facade.read("count").unwrap(), Some(json!("5")));
        assert_eq!(facade.selection(), BackendSelection::WebSession);
    }

    #[tokio::test]
    async fn test_clear_unpublishes_instance() {
        let (facade, slot) = published(session_backend());
        facade.write("a", "1").await.unwrap();

        facade.clear().await.unwrap();

        assert_eq!(facade.read("a").unwrap(), None);
        assert!(slot.lock().await.is_none());
        assert!(facade.is_released());
    }

    #[tokio::test]
    async fn test_clear_releases_disk_box_file() {
        let dir = TempDir::new().unwrap();
        let disk_box = DiskBox::open(dir.path(), "state", None).unwrap();
        let (facade, _) = published(Arc::new(disk_box));
        let held = facade.clone();
        facade.write("a", 1).await.unwrap();

        facade.clear().await.unwrap();

        // Both handles are still alive, yet the database can be opened again
        let reopened = DiskBox::open(dir.path(), "state", None).unwrap();
        assert_eq!(reopened.get("a").unwrap(), None);
        assert!(held.is_released());
    }

    #[tokio::test]
    async fn test_released_handle_rejects_mutations() {
        let (facade, _) = published(session_backend());
        let stale = facade.clone();
        facade.clear().await.unwrap();

        assert!(stale.write("a", 1).await.is_err());
        assert!(stale.delete("a").await.is_err());
        assert!(stale.update("a", |_| json!(1)).await.is_err());
        assert_eq!(stale.read("a").unwrap(), None);
        assert!(stale.keys().unwrap().is_empty());
        stale.clear().await.unwrap();

        let status = stale.status();
        assert_eq!(status.state, ManagerState::Shutdown);
    }

    #[tokio::test]
    async fn test_clear_leaves_other_instance_published() {
        let (facade, _) = published(session_backend());
        let other = FacadeCore::new(session_backend());
        let stale = StorageFacade::new(other, facade.slot.clone());

        stale.clear().await.unwrap();

        assert!(facade.slot.lock().await.is_some());
        assert!(!facade.is_released());
    }

    #[tokio::test]
    async fn test_degraded_instance_is_noop() {
        let (facade, slot) = published(Arc::new(NoopStorage));

        assert!(facade.is_degraded());
        facade.write("a", 1).await.unwrap();
        assert_eq!(facade.read("a").unwrap(), None);
        facade.delete("a").await.unwrap();
        facade.clear().await.unwrap();
        assert_eq!(facade.update("a", |_| json!(2)).await.unwrap(), json!(2));
        assert_eq!(facade.read("a").unwrap(), None);

        assert!(slot.lock().await.is_some());
        assert!(!facade.is_released());
        assert_eq!(facade.status().health, HealthStatus::Degraded);
    }

    #[tokio::test]
    async fn test_update_sees_previous_value() {
        let (facade, _) = published(session_backend());

        let first = facade
            .update("n", |current| {
                assert!(current.is_none());
                json!("x")
            })
            .await
            .unwrap();
        assert_eq!(first, json!("x"));

        let second = facade
            .update("n", |current| {
                let previous = current.unwrap();
                json!(format!("{}y", previous.as_str().unwrap()))
            })
            .await
            .unwrap();
        assert_eq!(second, json!("xy"));
    }

    #[tokio::test]
    async fn test_status_reports_backend() {
        let (facade, _) = published(session_backend());
        let status = facade.status();

        assert_eq!(status.health, HealthStatus::Healthy);
        assert_eq!(status.metadata.get("backend"), Some(&json!("WebSession")));
    }
}
