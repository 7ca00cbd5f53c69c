// src/platform/native.rs - Native platform implementations

//! Disk box backed by [redb](https://github.com/cberner/redb).
//!
//! One database file per box lives in the storage directory as
//! `<box>.redb`, holding a single table named after the box. Keys are the
//! storage keys; values are the JSON encoding of the stored value, sealed by
//! the box cipher when one is configured.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use redb::{Database, ReadableTable, TableDefinition};
use serde_json::Value;
use tokio::fs;

use crate::error::{Error, Result, StorageOperation};
use crate::platform::cipher::{verify_cipher, BoxCipher};
use crate::platform::storage::{validate_key, StorageArc, StorageBounds, StorageProvider};
use crate::types::BackendSelection;

const BACKEND: &str = "disk_box";

/// Opens (or creates) a box under `directory`, creating the directory first.
pub async fn open_disk(
    directory: &Path,
    box_name: &str,
    cipher: Option<Arc<dyn BoxCipher>>,
) -> Result<StorageArc> {
    fs::create_dir_all(directory).await.map_err(|e| {
        Error::platform(
            "native",
            "filesystem",
            format!("Failed to create storage directory {}: {}", directory.display(), e),
        )
    })?;

    let directory = directory.to_path_buf();
    let box_name = box_name.to_string();
    let opened = tokio::task::spawn_blocking(move || DiskBox::open(&directory, &box_name, cipher));
    let disk_box = opened
        .await
        .map_err(|e| box_error(StorageOperation::Open, "open task did not complete", e))??;

    Ok(Arc::new(disk_box))
}

/// Named box in an embedded redb database.
///
/// Cloning shares the open database. The file lock is released when the last
/// clone is dropped.
#[derive(Clone)]
pub struct DiskBox {
    inner: Arc<BoxFile>,
}

struct BoxFile {
    db: Database,
    name: String,
    path: PathBuf,
    cipher: Option<Arc<dyn BoxCipher>>,
}

impl std::fmt::Debug for DiskBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskBox")
            .field("name", &self.inner.name)
            .field("path", &self.inner.path)
            .field("encrypted", &self.inner.cipher.is_some())
            .finish()
    }
}

impl DiskBox {
    /// Opens or creates the box database and its table.
    ///
    /// A configured cipher is self-checked before the database is touched.
    pub fn open(
        directory: &Path,
        name: &str,
        cipher: Option<Arc<dyn BoxCipher>>,
    ) -> Result<Self> {
        validate_box_name(name)?;
        if let Some(cipher) = &cipher {
            verify_cipher(cipher.as_ref())?;
        }

        let path = directory.join(format!("{}.redb", name));
        let db = Database::create(&path).map_err(|e| {
            let message = format!("Failed to open database {}", path.display());
            box_error(StorageOperation::Open, message, e)
        })?;

        let file = BoxFile {
            db,
            name: name.to_string(),
            path,
            cipher,
        };

        let write_txn = file.db.begin_write().map_err(|e| {
            box_error(StorageOperation::Open, "Failed to begin write transaction", e)
        })?;
        write_txn.open_table(file.table()).map_err(|e| {
            box_error(StorageOperation::Open, "Failed to create box table", e)
        })?;
        write_txn.commit().map_err(|e| {
            box_error(StorageOperation::Open, "Failed to commit box table creation", e)
        })?;

        tracing::debug!(
            path = %file.path.display(),
            encrypted = file.cipher.is_some(),
            "disk box opened"
        );
        Ok(Self {
            inner: Arc::new(file),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Runs a committing operation on the blocking pool
    async fn blocking<F>(&self, operation: StorageOperation, f: F) -> Result<()>
    where
        F: FnOnce(&BoxFile) -> Result<()> + Send + 'static,
    {
        let file = self.inner.clone();
        tokio::task::spawn_blocking(move || f(&file))
            .await
            .map_err(|e| box_error(operation, "disk box task did not complete", e))?
    }
}

fn box_error(
    operation: StorageOperation,
    message: impl Into<String>,
    cause: impl std::fmt::Display,
) -> Error {
    Error::storage(BACKEND, operation, message).caused_by(cause)
}

fn key_error(operation: StorageOperation, key: &str, cause: impl std::fmt::Display) -> Error {
    box_error(operation.clone(), format!("Failed to {} key", operation), cause)
        .metadata("key", Value::String(key.to_string()))
}

impl BoxFile {
    fn table(&self) -> TableDefinition<'_, &'static str, &'static [u8]> {
        TableDefinition::new(&self.name)
    }

    fn encode(&self, key: &str, value: &Value) -> Result<Vec<u8>> {
        let bytes = serde_json::to_vec(value)?;
        match &self.cipher {
            Some(cipher) => cipher.encrypt(key, &bytes),
            None => Ok(bytes),
        }
    }

    fn decode(&self, key: &str, stored: &[u8]) -> Result<Value> {
        let bytes = match &self.cipher {
            Some(cipher) => cipher.decrypt(key, stored)?,
            None => stored.to_vec(),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn get(&self, key: &str) -> Result<Option<Value>> {
        let read_txn = self.db.begin_read().map_err(|e| {
            box_error(StorageOperation::Read, "Failed to begin read transaction", e)
        })?;
        let table = read_txn.open_table(self.table()).map_err(|e| {
            box_error(StorageOperation::Read, "Failed to open box table", e)
        })?;

        match table.get(key) {
            Ok(Some(guard)) => self
                .decode(key, guard.value())
                .map(Some)
                .map_err(|e| e.metadata("key", Value::String(key.to_string()))),
            Ok(None) => Ok(None),
            Err(e) => Err(key_error(StorageOperation::Read, key, e)),
        }
    }

    fn keys(&self) -> Result<Vec<String>> {
        let read_txn = self.db.begin_read().map_err(|e| {
            box_error(StorageOperation::ListKeys, "Failed to begin read transaction", e)
        })?;
        let table = read_txn.open_table(self.table()).map_err(|e| {
            box_error(StorageOperation::ListKeys, "Failed to open box table", e)
        })?;
        let iter = table.iter().map_err(|e| {
            box_error(StorageOperation::ListKeys, "Failed to iterate box table", e)
        })?;

        let mut keys = Vec::new();
        for entry in iter {
            let (key, _) = entry.map_err(|e| {
                box_error(StorageOperation::ListKeys, "Failed to read box entry", e)
            })?;
            keys.push(key.value().to_string());
        }
        Ok(keys)
    }

    fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let write_txn = self.db.begin_write().map_err(|e| {
            box_error(StorageOperation::Write, "Failed to begin write transaction", e)
        })?;
        {
            let mut table = write_txn.open_table(self.table()).map_err(|e| {
                box_error(StorageOperation::Write, "Failed to open box table", e)
            })?;
            table
                .insert(key, bytes)
                .map_err(|e| key_error(StorageOperation::Write, key, e))?;
        }
        write_txn
            .commit()
            .map_err(|e| key_error(StorageOperation::Write, key, e))
    }

    fn remove(&self, key: &str) -> Result<()> {
        let write_txn = self.db.begin_write().map_err(|e| {
            box_error(StorageOperation::Delete, "Failed to begin write transaction", e)
        })?;
        {
            let mut table = write_txn.open_table(self.table()).map_err(|e| {
                box_error(StorageOperation::Delete, "Failed to open box table", e)
            })?;
            table
                .remove(key)
                .map_err(|e| key_error(StorageOperation::Delete, key, e))?;
        }
        write_txn
            .commit()
            .map_err(|e| key_error(StorageOperation::Delete, key, e))
    }

    fn truncate(&self) -> Result<()> {
        let write_txn = self.db.begin_write().map_err(|e| {
            box_error(StorageOperation::Clear, "Failed to begin write transaction", e)
        })?;
        write_txn.delete_table(self.table()).map_err(|e| {
            box_error(StorageOperation::Clear, "Failed to drop box table", e)
        })?;
        write_txn.open_table(self.table()).map_err(|e| {
            box_error(StorageOperation::Clear, "Failed to recreate box table", e)
        })?;
        write_txn.commit().map_err(|e| {
            box_error(StorageOperation::Clear, "Failed to commit clear", e)
        })
    }
}

fn validate_box_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains(['/', '\\', ':']) {
        return Err(Error::validation(
            "box_name",
            format!("invalid box name '{}'", name),
        ));
    }
    Ok(())
}

impl StorageBounds for DiskBox {}

// Reads stay on the calling thread so hydration never suspends. Commits
// fsync, so mutations run on the blocking pool.
#[async_trait::async_trait]
impl StorageProvider for DiskBox {
    fn selection(&self) -> BackendSelection {
        BackendSelection::DiskBox
    }

    fn get(&self, key: &str) -> Result<Option<Value>> {
        validate_key(key)?;
        self.inner.get(key)
    }

    fn keys(&self) -> Result<Vec<String>> {
        self.inner.keys()
    }

    async fn set(&self, key: &str, value: &Value) -> Result<()> {
        validate_key(key)?;
        let bytes = self.inner.encode(key, value)?;
        let key = key.to_string();
        self.blocking(StorageOperation::Write, move |file| file.put(&key, &bytes))
            .await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        validate_key(key)?;
        let key = key.to_string();
        self.blocking(StorageOperation::Delete, move |file| file.remove(&key))
            .await
    }

    async fn clear(&self) -> Result<()> {
        self.blocking(StorageOperation::Clear, |file| file.truncate())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::cipher::ChaChaBoxCipher;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_values_keep_their_type() {
        let dir = TempDir::new().unwrap();
        let disk_box = DiskBox::open(dir.path(), "state", None).unwrap();

        let value = json!({"count": 3, "tags": ["a", "b"], "ratio": 0.5, "on": true});
        disk_box.set("counter", &value).await.unwrap();
        disk_box.set("plain", &json!(7)).await.unwrap();

        assert_eq!(disk_box.get("counter").unwrap(), Some(value));
        assert_eq!(disk_box.get("plain").unwrap(), Some(json!(7)));
        assert_eq!(disk_box.get("missing").unwrap(), None);
    }

    #[tokio::test]
    async fn test_delete_clear_and_keys() {
        let dir = TempDir::new().unwrap();
        let disk_box = DiskBox::open(dir.path(), "state", None).unwrap();
        disk_box.set("a", &json!(1)).await.unwrap();
        disk_box.set("b", &json!(2)).await.unwrap();

        disk_box.delete("a").await.unwrap();
        disk_box.delete("never-written").await.unwrap();
        assert_eq!(disk_box.keys().unwrap(), vec!["b".to_string()]);

        disk_box.clear().await.unwrap();
        assert!(disk_box.keys().unwrap().is_empty());
        disk_box.set("c", &json!(3)).await.unwrap();
        assert_eq!(disk_box.get("c").unwrap(), Some(json!(3)));
    }

    #[tokio::test]
    async fn test_values_survive_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let disk_box = DiskBox::open(dir.path(), "state", None).unwrap();
            disk_box.set("theme", &json!("dark")).await.unwrap();
        }

        let reopened = DiskBox::open(dir.path(), "state", None).unwrap();
        assert_eq!(reopened.get("theme").unwrap(), Some(json!("dark")));
        assert!(dir.path().join("state.redb").exists());
    }

    #[tokio::test]
    async fn test_encrypted_box() {
        let dir = TempDir::new().unwrap();
        let cipher: Arc<dyn BoxCipher> =
            Arc::new(ChaChaBoxCipher::from_passphrase("secret").unwrap());
        {
            let disk_box = DiskBox::open(dir.path(), "vault", Some(cipher.clone())).unwrap();
            disk_box.set("token", &json!({"v": "abc"})).await.unwrap();
            assert_eq!(disk_box.get("token").unwrap(), Some(json!({"v": "abc"})));
        }

        let other: Arc<dyn BoxCipher> =
            Arc::new(ChaChaBoxCipher::from_passphrase("other").unwrap());
        let wrong = DiskBox::open(dir.path(), "vault", Some(other)).unwrap();
        assert!(wrong.get("token").is_err());
    }

    #[tokio::test]
    async fn test_open_disk_creates_directory() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("nested").join("store");
        let storage = open_disk(&nested, "state", None).await.unwrap();

        assert_eq!(storage.selection(), BackendSelection::DiskBox);
        assert!(nested.join("state.redb").exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_commits_release_file_with_last_clone() {
        let dir = TempDir::new().unwrap();
        let disk_box = DiskBox::open(dir.path(), "state", None).unwrap();
        let clone = disk_box.clone();

        disk_box.set("a", &json!(1)).await.unwrap();
        clone.set("b", &json!(2)).await.unwrap();
        clone.delete("a").await.unwrap();
        assert!(DiskBox::open(dir.path(), "state", None).is_err());

        drop(disk_box);
        drop(clone);

        let reopened = DiskBox::open(dir.path(), "state", None).unwrap();
        assert_eq!(reopened.keys().unwrap(), vec!["b".to_string()]);
    }

    #[test]
    fn test_invalid_box_name() {
        let dir = TempDir::new().unwrap();
        assert!(DiskBox::open(dir.path(), "", None).is_err());
        assert!(DiskBox::open(dir.path(), "a/b", None).is_err());
    }
}
