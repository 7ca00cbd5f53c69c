// src/error.rs - Structured error handling for storage backends and lifecycle

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "LOW"),
            Self::Medium => write!(f, "MEDIUM"),
            Self::High => write!(f, "HIGH"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    Configuration {
        key: Option<String>,
        validation_errors: Vec<String>,
    },
    Storage {
        backend: String,
        operation: StorageOperation,
    },
    Migration {
        path: Option<String>,
    },
    Encryption {
        operation: CipherOperation,
    },
    Platform {
        platform: String,
        feature: String,
        fallback_available: bool,
    },
    Validation {
        field: Option<String>,
        rules: Vec<String>,
    },
    Io,
    Serialization,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageOperation {
    Open,
    Read,
    Write,
    Delete,
    Clear,
    ListKeys,
}

impl fmt::Display for StorageOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Read => write!(f, "read"),
            Self::Write => write!(f, "write"),
            Self::Delete => write!(f, "delete"),
            Self::Clear => write!(f, "clear"),
            Self::ListKeys => write!(f, "list_keys"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CipherOperation {
    Setup,
    Encrypt,
    Decrypt,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Error {
    pub id: Uuid,
    pub kind: ErrorKind,
    pub message: String,
    pub severity: ErrorSeverity,
    pub source: String,
    pub timestamp: DateTime<Utc>,
    pub metadata: crate::types::Metadata,
    pub causes: Vec<String>,
}

impl Error {
    /// Creates a new error with the specified kind and message
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            message: message.into(),
            severity: ErrorSeverity::Medium,
            source: "unknown".to_string(),
            timestamp: Utc::now(),
            metadata: std::collections::HashMap::new(),
            causes: Vec::new(),
        }
    }

    /// Sets the error severity
    pub fn severity(mut self, severity: ErrorSeverity) -> Self {
        self.severity = severity;
        self
    }

    /// Sets the error source
    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Adds metadata to the error
    pub fn metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Adds a cause to the error chain
    pub fn caused_by(mut self, cause: impl fmt::Display) -> Self {
        self.causes.push(cause.to_string());
        self
    }

    /// Creates a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(
            ErrorKind::Configuration {
                key: None,
                validation_errors: Vec::new(),
            },
            message,
        )
        .severity(ErrorSeverity::High)
    }

    /// Creates a backend operation error
    pub fn storage(
        backend: impl Into<String>,
        operation: StorageOperation,
        message: impl Into<String>,
    ) -> Self {
        let backend = backend.into();
        Self::new(
            ErrorKind::Storage {
                backend: backend.clone(),
                operation,
            },
            message,
        )
        .source(backend)
        .severity(ErrorSeverity::High)
    }

    /// Creates a legacy migration error
    pub fn migration(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(
            ErrorKind::Migration {
                path: Some(path.into()),
            },
            message,
        )
        .source("migration")
    }

    /// Creates an encryption error
    pub fn encryption(operation: CipherOperation, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Encryption { operation }, message)
            .source("cipher")
            .severity(ErrorSeverity::High)
    }

    /// Creates a platform-specific error
    pub fn platform(
        platform: impl Into<String>,
        feature: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(
            ErrorKind::Platform {
                platform: platform.into(),
                feature: feature.into(),
                fallback_available: true,
            },
            message,
        )
        .severity(ErrorSeverity::Medium)
    }

    /// Creates a validation error for a single field
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(
            ErrorKind::Validation {
                field: Some(field.into()),
                rules: vec![message.clone()],
            },
            message,
        )
        .severity(ErrorSeverity::Low)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} ({}): {}",
            self.severity, self.source, self.id, self.message
        )?;
        for cause in &self.causes {
            write!(f, ": {}", cause)?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        let msg = err.to_string();

        let mut error = Error::new(ErrorKind::Io, msg);
        error.source = "std::io::Error".to_string();
        error.severity = ErrorSeverity::High;

        error
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::new(ErrorKind::Serialization, err.to_string()).source("serde_json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error() {
        let error = Error::storage("disk_box", StorageOperation::Write, "table is read-only")
            .metadata("key", serde_json::Value::String("counter".to_string()));

        assert_eq!(error.severity, ErrorSeverity::High);
        assert_eq!(error.source, "disk_box");
        assert!(matches!(
            error.kind,
            ErrorKind::Storage {
                operation: StorageOperation::Write,
                ..
            }
        ));
        assert!(error.metadata.contains_key("key"));
    }

    #[test]
    fn test_platform_error() {
        let error = Error::platform("web", "session_storage", "window not available");
        assert!(matches!(error.kind, ErrorKind::Platform { .. }));
        assert_eq!(error.severity, ErrorSeverity::Medium);
    }

    #[test]
    fn test_validation_error() {
        let error = Error::validation("key", "storage key must not be empty");
        assert!(matches!(
            error.kind,
            ErrorKind::Validation { ref field, .. } if field.as_deref() == Some("key")
        ));
        assert_eq!(error.severity, ErrorSeverity::Low);
    }

    #[test]
    fn test_display_includes_causes() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let error = Error::migration(".hydrated_state.json", "reading legacy file").caused_by(io);
        let rendered = error.to_string();
        assert!(rendered.contains("reading legacy file"));
        assert!(rendered.contains("gone"));
    }

    #[test]
    fn test_json_error_conversion() {
        let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let error: Error = err.into();
        assert!(matches!(error.kind, ErrorKind::Serialization));
        assert_eq!(error.source, "serde_json");
    }
}
