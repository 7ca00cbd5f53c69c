// src/config/mod.rs

//! Layered configuration for storage and logging
//!
//! Layers are merged in priority order, lowest first:
//! - Built-in defaults
//! - Configuration files (YAML, JSON, TOML)
//! - Environment variables (`STATEBOX__STORAGE__BOX_NAME=...`)
//! - In-memory overrides, such as command line flags

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use crate::error::{Error, ErrorKind, Result};
use crate::platform::DEFAULT_BOX_NAME;
use crate::types::StorageLocation;

/// Default environment variable prefix
pub const ENV_PREFIX: &str = "STATEBOX";

/// Separator between nested keys in environment variable names
const ENV_SEPARATOR: &str = "__";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

impl ConfigFormat {
    pub fn from_extension(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "yaml" | "yml" => Some(Self::Yaml),
            "json" => Some(Self::Json),
            "toml" => Some(Self::Toml),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum ConfigSource {
    File { path: PathBuf, format: ConfigFormat },
    Environment { prefix: String },
    Memory { data: Value },
}

#[derive(Debug, Clone)]
pub struct ConfigLayer {
    pub name: String,
    pub source: ConfigSource,
    pub priority: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateboxConfig {
    pub storage: StorageSettings,
    pub logging: LoggingConfig,
}

impl StateboxConfig {
    /// Checks values that deserialize fine but cannot be used
    pub fn validate(&self) -> Result<()> {
        if self.storage.box_name.trim().is_empty() {
            return Err(Error::validation("storage.box_name", "box name must not be empty"));
        }

        if matches!(&self.storage.encryption_passphrase, Some(p) if p.is_empty()) {
            return Err(Error::validation(
                "storage.encryption_passphrase",
                "passphrase must not be empty when set",
            ));
        }

        if self.logging.level.trim().is_empty() {
            return Err(Error::validation("logging.level", "log level must not be empty"));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Directory holding the disk box and the legacy cache file. An empty
    /// string selects web session storage.
    pub directory: Option<PathBuf>,
    /// Forces web session storage regardless of `directory`
    pub web: bool,
    pub box_name: String,
    /// Encrypts the disk box when set
    pub encryption_passphrase: Option<String>,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            directory: None,
            web: cfg!(target_arch = "wasm32"),
            box_name: DEFAULT_BOX_NAME.to_string(),
            encryption_passphrase: None,
        }
    }
}

impl StorageSettings {
    /// Resolves where storage should live
    pub fn location(&self) -> StorageLocation {
        if self.web {
            return StorageLocation::WebSession;
        }

        match &self.directory {
            Some(directory) => StorageLocation::from(directory.clone()),
            None => StorageLocation::Directory(default_storage_dir()),
        }
    }
}

/// Per-user data directory for disk boxes
pub fn default_storage_dir() -> PathBuf {
    #[cfg(not(target_arch = "wasm32"))]
    {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("statebox")
    }

    #[cfg(target_arch = "wasm32")]
    {
        PathBuf::from("statebox")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    pub console: ConsoleLogConfig,
    pub file: Option<FileLogConfig>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
            console: ConsoleLogConfig::default(),
            file: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogFormat {
    Json,
    Pretty,
    Compact,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleLogConfig {
    pub enabled: bool,
    pub colored: bool,
}

impl Default for ConsoleLogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            colored: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileLogConfig {
    /// Log file path; the date is appended on each daily rotation
    pub path: PathBuf,
}

impl Default for FileLogConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./logs/statebox.log"),
        }
    }
}

fn key_error(key: &str, message: impl Into<String>) -> Error {
    let message = message.into();
    Error::new(
        ErrorKind::Configuration {
            key: Some(key.to_string()),
            validation_errors: vec![message.clone()],
        },
        message,
    )
    .source("config")
}

pub struct ConfigManager {
    layers: Vec<ConfigLayer>,
    merged_config: Arc<RwLock<Value>>,
}

impl fmt::Debug for ConfigManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigManager")
            .field("layers", &self.layers.len())
            .finish()
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigManager {
    pub fn new() -> Self {
        Self {
            layers: Vec::new(),
            merged_config: Arc::new(RwLock::new(Value::Object(Map::new()))),
        }
    }

    /// Optional config file at priority 0 and the `STATEBOX` environment at
    /// priority 1000
    pub fn standard(config_path: Option<&Path>) -> Result<Self> {
        let mut manager = Self::new();
        if let Some(path) = config_path {
            manager.add_file_layer("file", path, 0)?;
        }
        manager.add_env_layer("environment", ENV_PREFIX, 1000);
        Ok(manager)
    }

    pub fn add_file_layer<P: AsRef<Path>>(
        &mut self,
        name: impl Into<String>,
        path: P,
        priority: u32,
    ) -> Result<()> {
        let path = path.as_ref().to_path_buf();
        let format = ConfigFormat::from_extension(&path).ok_or_else(|| {
            Error::config(format!(
                "Unsupported configuration file format: {}",
                path.display()
            ))
        })?;

        self.push_layer(ConfigLayer {
            name: name.into(),
            source: ConfigSource::File { path, format },
            priority,
        });
        Ok(())
    }

    pub fn add_env_layer(
        &mut self,
        name: impl Into<String>,
        prefix: impl Into<String>,
        priority: u32,
    ) {
        self.push_layer(ConfigLayer {
            name: name.into(),
            source: ConfigSource::Environment {
                prefix: prefix.into(),
            },
            priority,
        });
    }

    pub fn add_memory_layer(&mut self, name: impl Into<String>, data: Value, priority: u32) {
        self.push_layer(ConfigLayer {
            name: name.into(),
            source: ConfigSource::Memory { data },
            priority,
        });
    }

    fn push_layer(&mut self, layer: ConfigLayer) {
        self.layers.push(layer);
        // Stable sort keeps insertion order among equal priorities
        self.layers.sort_by_key(|l| l.priority);
    }

    pub fn layers(&self) -> &[ConfigLayer] {
        &self.layers
    }

    /// Merges every layer over the defaults and returns the validated result
    pub async fn load(&self) -> Result<StateboxConfig> {
        self.merge_configurations().await?;

        let merged = self.merged_config.read().await.clone();
        let config: StateboxConfig = serde_json::from_value(merged).map_err(|e| {
            Error::new(
                ErrorKind::Configuration {
                    key: None,
                    validation_errors: vec![e.to_string()],
                },
                format!("Failed to deserialize configuration: {}", e),
            )
            .source("config")
        })?;

        config.validate()?;
        tracing::debug!(layers = self.layers.len(), "configuration loaded");
        Ok(config)
    }

    /// Reads a dotted key from the last merged configuration
    pub async fn get<T>(&self, key: &str) -> Result<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        let config = self.merged_config.read().await;
        let value = get_nested_value(&config, key)
            .ok_or_else(|| key_error(key, format!("Configuration key '{}' not found", key)))?;

        serde_json::from_value(value).map_err(|e| {
            key_error(key, format!("Failed to deserialize config value: {}", e))
        })
    }

    async fn merge_configurations(&self) -> Result<()> {
        let mut merged = serde_json::to_value(StateboxConfig::default())?;

        for layer in &self.layers {
            let layer_config = self.load_layer_config(layer)?;
            merge_values(&mut merged, layer_config);
        }

        *self.merged_config.write().await = merged;
        Ok(())
    }

    fn load_layer_config(&self, layer: &ConfigLayer) -> Result<Value> {
        match &layer.source {
            #[cfg(not(target_arch = "wasm32"))]
            ConfigSource::File { path, format } => {
                let content = std::fs::read_to_string(path).map_err(|e| {
                    Error::config(format!("Failed to read config file {}", path.display()))
                        .caused_by(e)
                })?;

                match format {
                    ConfigFormat::Json => serde_json::from_str(&content)
                        .map_err(|e| Error::config("Failed to parse JSON config").caused_by(e)),
                    ConfigFormat::Yaml => serde_yaml::from_str(&content)
                        .map_err(|e| Error::config("Failed to parse YAML config").caused_by(e)),
                    ConfigFormat::Toml => toml::from_str(&content)
                        .map_err(|e| Error::config("Failed to parse TOML config").caused_by(e)),
                }
            }

            #[cfg(target_arch = "wasm32")]
            ConfigSource::File { .. } => {
                Err(Error::config("File loading not supported in web platform"))
            }

            ConfigSource::Environment { prefix } => Ok(env_layer(prefix, std::env::vars())),

            ConfigSource::Memory { data } => Ok(data.clone()),
        }
    }
}

/// Builds a nested object from `PREFIX__SECTION__KEY=value` pairs.
///
/// `true`/`false` become booleans; everything else stays a string, so a
/// numeric passphrase is not turned into a number.
fn env_layer(prefix: &str, vars: impl Iterator<Item = (String, String)>) -> Value {
    let mut env_config = Map::new();
    let full_prefix = format!("{}{}", prefix, ENV_SEPARATOR);

    for (key, value) in vars {
        let Some(rest) = key.strip_prefix(&full_prefix) else {
            continue;
        };

        let config_key = rest.to_lowercase();
        let nested_keys: Vec<&str> = config_key
            .split(ENV_SEPARATOR)
            .filter(|k| !k.is_empty())
            .collect();
        set_nested_env_value(&mut env_config, &nested_keys, value);
    }

    Value::Object(env_config)
}

fn set_nested_env_value(config: &mut Map<String, Value>, keys: &[&str], value: String) {
    match keys {
        [] => {}
        [last] => {
            let parsed = match value.parse::<bool>() {
                Ok(flag) => Value::Bool(flag),
                Err(_) => Value::String(value),
            };
            config.insert(last.to_string(), parsed);
        }
        [first, rest @ ..] => {
            let entry = config
                .entry(first.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            if let Value::Object(nested) = entry {
                set_nested_env_value(nested, rest, value);
            }
        }
    }
}

fn merge_values(target: &mut Value, source: Value) {
    match (target, source) {
        (Value::Object(target_map), Value::Object(source_map)) => {
            for (key, source_value) in source_map {
                match target_map.get_mut(&key) {
                    Some(target_value) => merge_values(target_value, source_value),
                    None => {
                        target_map.insert(key, source_value);
                    }
                }
            }
        }
        (target, source) => {
            *target = source;
        }
    }
}

fn get_nested_value(config: &Value, key: &str) -> Option<Value> {
    let mut current = config;
    for k in key.split('.') {
        current = current.get(k)?;
    }
    Some(current.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use tempfile::Builder;

    fn temp_config(suffix: &str, contents: &str) -> tempfile::NamedTempFile {
        let mut file = Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[tokio::test]
    async fn test_defaults_without_layers() {
        let config = ConfigManager::new().load().await.unwrap();
        assert_eq!(config, StateboxConfig::default());
        assert_eq!(config.storage.box_name, DEFAULT_BOX_NAME);
        assert!(config.logging.file.is_none());
    }

    #[tokio::test]
    async fn test_yaml_file_layer() {
        let file = temp_config(
            ".yaml",
            "storage:\n  directory: /tmp/statebox-yaml\n  box_name: session\n\
             logging:\n  level: debug\n",
        );
        let mut manager = ConfigManager::new();
        manager.add_file_layer("test", file.path(), 0).unwrap();

        let config = manager.load().await.unwrap();
        assert_eq!(config.storage.directory, Some(PathBuf::from("/tmp/statebox-yaml")));
        assert_eq!(config.storage.box_name, "session");
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.console.enabled);

        let box_name: String = manager.get("storage.box_name").await.unwrap();
        assert_eq!(box_name, "session");
    }

    #[tokio::test]
    async fn test_toml_and_json_file_layers() {
        let toml_file = temp_config(".toml", "[storage]\nweb = true\n");
        let json_file = temp_config(".json", r#"{"logging": {"format": "Json"}}"#);

        let mut manager = ConfigManager::new();
        manager.add_file_layer("toml", toml_file.path(), 0).unwrap();
        manager.add_file_layer("json", json_file.path(), 1).unwrap();

        let config = manager.load().await.unwrap();
        assert!(config.storage.web);
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_unsupported_extension() {
        let mut manager = ConfigManager::new();
        assert!(manager.add_file_layer("bad", "config.ini", 0).is_err());
    }

    #[tokio::test]
    async fn test_missing_file_fails_load() {
        let mut manager = ConfigManager::new();
        manager
            .add_file_layer("missing", "/nonexistent/statebox.yaml", 0)
            .unwrap();
        assert!(manager.load().await.is_err());
    }

    #[test]
    fn test_env_layer_nesting() {
        let vars = vec![
            ("STATEBOX__STORAGE__BOX_NAME".to_string(), "envbox".to_string()),
            ("STATEBOX__STORAGE__WEB".to_string(), "true".to_string()),
            ("STATEBOX__STORAGE__ENCRYPTION_PASSPHRASE".to_string(), "1234".to_string()),
            ("STATEBOXED__STORAGE__WEB".to_string(), "false".to_string()),
            ("HOME".to_string(), "/root".to_string()),
        ];

        let layer = env_layer("STATEBOX", vars.into_iter());
        assert_eq!(
            layer,
            json!({
                "storage": {
                    "box_name": "envbox",
                    "web": true,
                    "encryption_passphrase": "1234"
                }
            })
        );
    }

    #[tokio::test]
    async fn test_environment_layer_from_process() {
        std::env::set_var("STATEBOX_ENV_TEST__STORAGE__BOX_NAME", "from_env");

        let mut manager = ConfigManager::new();
        manager.add_env_layer("env", "STATEBOX_ENV_TEST", 100);
        let config = manager.load().await.unwrap();
        assert_eq!(config.storage.box_name, "from_env");

        std::env::remove_var("STATEBOX_ENV_TEST__STORAGE__BOX_NAME");
    }

    #[tokio::test]
    async fn test_priority_order() {
        let file = temp_config(".yaml", "storage:\n  box_name: from_file\n  web: true\n");

        let mut manager = ConfigManager::new();
        manager.add_memory_layer("flags", json!({"storage": {"box_name": "from_flags"}}), 2000);
        manager.add_file_layer("file", file.path(), 0).unwrap();

        let config = manager.load().await.unwrap();
        assert_eq!(config.storage.box_name, "from_flags");
        assert!(config.storage.web);
    }

    #[tokio::test]
    async fn test_validation_rejects_empty_box_name() {
        let mut manager = ConfigManager::new();
        manager.add_memory_layer("bad", json!({"storage": {"box_name": ""}}), 0);
        assert!(manager.load().await.is_err());
    }

    #[test]
    fn test_location_resolution() {
        let mut settings = StorageSettings {
            web: false,
            ..StorageSettings::default()
        };
        assert_eq!(
            settings.location(),
            StorageLocation::Directory(default_storage_dir())
        );

        settings.directory = Some(PathBuf::from("/data/app"));
        assert_eq!(
            settings.location(),
            StorageLocation::Directory(PathBuf::from("/data/app"))
        );

        settings.directory = Some(PathBuf::new());
        assert!(settings.location().is_web());

        settings.directory = Some(PathBuf::from("/data/app"));
        settings.web = true;
        assert!(settings.location().is_web());
    }

    #[test]
    fn test_merge_values_is_deep() {
        let mut target = json!({"a": {"b": 1, "c": 2}});
        merge_values(&mut target, json!({"a": {"c": 3}, "d": 4}));
        assert_eq!(target, json!({"a": {"b": 1, "c": 3}, "d": 4}));
    }
}
