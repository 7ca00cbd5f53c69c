use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Generic metadata container
pub type Metadata = HashMap<String, Value>;

/// Key under which a single hydrated value is stored
pub type StorageKey = str;

/// Any JSON-serializable value
pub type StorageValue = Value;

/// Reserved directory value that selects browser session storage instead of disk.
///
/// No real directory is the empty path, so the sentinel can never collide with
/// a location a caller actually wants on disk.
pub const WEB_STORAGE_SENTINEL: &str = "";

/// Which backend an instance is bound to. Fixed for the lifetime of the instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackendSelection {
    DiskBox,
    WebSession,
    None,
}

impl fmt::Display for BackendSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DiskBox => write!(f, "disk_box"),
            Self::WebSession => write!(f, "web_session"),
            Self::None => write!(f, "none"),
        }
    }
}

/// Where storage should live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageLocation {
    Directory(PathBuf),
    WebSession,
}

impl StorageLocation {
    pub fn is_web(&self) -> bool {
        matches!(self, Self::WebSession)
    }

    pub fn directory(&self) -> Option<&Path> {
        match self {
            Self::Directory(path) => Some(path),
            Self::WebSession => None,
        }
    }
}

impl From<&str> for StorageLocation {
    fn from(value: &str) -> Self {
        if value == WEB_STORAGE_SENTINEL {
            Self::WebSession
        } else {
            Self::Directory(PathBuf::from(value))
        }
    }
}

impl From<PathBuf> for StorageLocation {
    fn from(value: PathBuf) -> Self {
        if value.as_os_str().is_empty() {
            Self::WebSession
        } else {
            Self::Directory(value)
        }
    }
}

impl From<&Path> for StorageLocation {
    fn from(value: &Path) -> Self {
        Self::from(value.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel_selects_web() {
        assert_eq!(StorageLocation::from(WEB_STORAGE_SENTINEL), StorageLocation::WebSession);
        assert_eq!(StorageLocation::from(PathBuf::new()), StorageLocation::WebSession);
        assert!(StorageLocation::from("").is_web());
    }

    #[test]
    fn test_real_path_selects_directory() {
        let location = StorageLocation::from("/var/lib/app");
        assert_eq!(location.directory(), Some(Path::new("/var/lib/app")));
        assert!(!location.is_web());
    }
}
