// src/lib.rs

//! Statebox - key-value persistence for hydrating application state
//!
//! One storage instance is built per process by the [`coordinator`], bound
//! either to an embedded disk box or to browser session storage, and handed
//! out as a [`StorageFacade`]. A legacy flat-file cache found next to the
//! disk box is imported once on first build.
//!
//! ```no_run
//! # async fn run() -> statebox::Result<()> {
//! let storage = statebox::build(statebox::BuildOptions::directory("/var/lib/app")).await;
//! storage.write("theme", "dark").await?;
//! assert_eq!(storage.read("theme")?, Some(serde_json::json!("dark")));
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::result_large_err)]

pub mod config;
pub mod coordinator;
pub mod error;
pub mod facade;
pub mod logging;
pub mod manager;
pub mod persistence;
pub mod platform;
pub mod types;

// Native-only modules
#[cfg(not(target_arch = "wasm32"))]
pub mod migration;

// Re-export commonly used types
pub use config::{ConfigManager, StateboxConfig, StorageSettings};
pub use coordinator::{build, BuildOptions, StorageCoordinator};
pub use error::{Error, ErrorKind, Result};
pub use facade::StorageFacade;
pub use manager::{HealthStatus, Manager, ManagerState, ManagerStatus};
pub use persistence::PersistenceManager;
pub use types::{BackendSelection, StorageLocation, WEB_STORAGE_SENTINEL};

#[cfg(not(target_arch = "wasm32"))]
pub use migration::{MigrationReport, LEGACY_CACHE_FILE};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
