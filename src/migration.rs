// src/migration.rs - One-shot import of the legacy flat-file cache

//! Imports the legacy JSON cache into a disk box.
//!
//! The legacy file is a JSON object whose values are themselves JSON-encoded
//! strings:
//!
//! ```json
//! { "counter": "{\"value\":3}", "theme": "\"dark\"" }
//! ```
//!
//! Each inner string is decoded and written under its key. Entries that fail
//! to decode or write are skipped, and an unparsable file migrates nothing.
//! Either way the file is deleted once the attempt finishes, so a partially
//! failed migration is never retried and the skipped entries are lost.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::platform::storage::DynStorage;

/// Name of the legacy cache file inside the storage directory.
pub const LEGACY_CACHE_FILE: &str = ".hydrated_state.json";

/// Outcome of a migration attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationReport {
    pub file_found: bool,
    pub migrated: usize,
    pub skipped: usize,
}

/// Migrates `directory/LEGACY_CACHE_FILE` into `target` and deletes the file.
///
/// Only a failure to delete the file is returned as an error.
pub async fn migrate(directory: &Path, target: &DynStorage) -> Result<MigrationReport> {
    let path = directory.join(LEGACY_CACHE_FILE);

    let contents = match tokio::fs::read_to_string(&path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(MigrationReport::default());
        }
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "legacy cache unreadable, discarding"
            );
            String::new()
        }
    };

    let mut report = MigrationReport {
        file_found: true,
        ..MigrationReport::default()
    };

    match serde_json::from_str::<Map<String, Value>>(&contents) {
        Ok(entries) => {
            for (key, encoded) in entries {
                match import_entry(target, &key, encoded).await {
                    Ok(()) => report.migrated += 1,
                    Err(e) => {
                        tracing::warn!(key = %key, error = %e, "skipping legacy cache entry");
                        report.skipped += 1;
                    }
                }
            }
        }
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "legacy cache is not a JSON object, discarding"
            );
        }
    }

    tokio::fs::remove_file(&path).await.map_err(|e| {
        Error::migration(
            path.display().to_string(),
            "Failed to delete legacy cache file",
        )
        .caused_by(e)
    })?;

    tracing::info!(
        migrated = report.migrated,
        skipped = report.skipped,
        "legacy cache migrated"
    );
    Ok(report)
}

async fn import_entry(target: &DynStorage, key: &str, encoded: Value) -> Result<()> {
    let Value::String(inner) = encoded else {
        return Err(Error::migration(
            key,
            "legacy entry is not a JSON-encoded string",
        ));
    };

    let value: Value = serde_json::from_str(&inner)?;
    target.set(key, &value).await
}
