// src/main.rs - Command line access to a storage box

#[cfg(not(target_arch = "wasm32"))]
#[tokio::main]
async fn main() -> statebox::Result<()> {
    cli::run().await
}

#[cfg(target_arch = "wasm32")]
fn main() {}

#[cfg(not(target_arch = "wasm32"))]
mod cli {
    use std::path::PathBuf;
    use std::process;
    use std::sync::Arc;

    use clap::{Parser, Subcommand};
    use serde_json::{Map, Value};

    use statebox::config::ConfigManager;
    use statebox::error::{Error, Result};
    use statebox::logging::LoggingManager;
    use statebox::manager::{HealthStatus, Manager};
    use statebox::platform::{native, BoxCipher, ChaChaBoxCipher};
    use statebox::{PersistenceManager, StateboxConfig, StorageFacade, StorageSettings};

    #[derive(Parser)]
    #[command(
        name = "statebox",
        version = statebox::VERSION,
        about = "Inspect and edit persisted application state",
        long_about = None
    )]
    struct Cli {
        /// Configuration file (YAML, JSON or TOML)
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Storage directory holding the disk box
        #[arg(short, long, value_name = "DIR")]
        dir: Option<PathBuf>,

        /// Use session storage instead of a disk box
        #[arg(long, conflicts_with = "dir")]
        web: bool,

        #[arg(long, value_name = "NAME")]
        box_name: Option<String>,

        #[arg(short, long)]
        verbose: bool,

        #[command(subcommand)]
        command: Commands,
    }

    #[derive(Subcommand)]
    enum Commands {
        /// Print the value stored under a key
        Get { key: String },
        /// Store a value; anything that is not valid JSON is stored as a string
        Set { key: String, value: String },
        /// Remove a key
        Delete { key: String },
        /// Remove every key
        Clear,
        /// List stored keys
        Keys,
        /// Import the legacy cache file into the box
        Migrate,
        /// Show which backend is bound and its health
        Status,
    }

    pub async fn run() -> Result<()> {
        let cli = Cli::parse();

        let mut manager = ConfigManager::standard(cli.config.as_deref())?;
        manager.add_memory_layer("command_line", overrides(&cli), 2000);
        let config: StateboxConfig = manager.load().await?;

        let mut logging = LoggingManager::new(config.logging.clone());
        logging.initialize().await?;
        tracing::debug!(layers = manager.layers().len(), "configuration resolved");

        let outcome = match &cli.command {
            Commands::Migrate => migrate(&config.storage).await,
            command => with_storage(&config.storage, command).await,
        };

        logging.shutdown().await?;

        let exit_code = outcome?;
        if exit_code != 0 {
            process::exit(exit_code);
        }
        Ok(())
    }

    /// Command line flags as the highest-priority configuration layer
    fn overrides(cli: &Cli) -> Value {
        let mut storage = Map::new();
        if let Some(dir) = &cli.dir {
            storage.insert("directory".to_string(), Value::String(dir.display().to_string()));
        }
        if cli.web {
            storage.insert("web".to_string(), Value::Bool(true));
        }
        if let Some(box_name) = &cli.box_name {
            storage.insert("box_name".to_string(), Value::String(box_name.clone()));
        }

        let mut root = Map::new();
        root.insert("storage".to_string(), Value::Object(storage));
        if cli.verbose {
            root.insert("logging".to_string(), serde_json::json!({ "level": "debug" }));
        }
        Value::Object(root)
    }

    fn parse_value(raw: &str) -> Value {
        serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
    }

    async fn with_storage(settings: &StorageSettings, command: &Commands) -> Result<i32> {
        let mut persistence = PersistenceManager::new(settings.clone());
        persistence.initialize().await?;

        let storage = persistence.require_storage()?.clone();
        if storage.is_degraded() {
            eprintln!("warning: storage is unavailable, changes will not persist");
        }

        let outcome = execute(&storage, &persistence, command).await;
        persistence.shutdown().await?;
        outcome
    }

    async fn execute(
        storage: &StorageFacade,
        persistence: &PersistenceManager,
        command: &Commands,
    ) -> Result<i32> {
        match command {
            Commands::Get { key } => match storage.read(key)? {
                Some(value) => {
                    println!("{}", serde_json::to_string_pretty(&value)?);
                    Ok(0)
                }
                None => {
                    eprintln!("{}: not found", key);
                    Ok(1)
                }
            },
            Commands::Set { key, value } => {
                storage.write(key, parse_value(value)).await?;
                Ok(0)
            }
            Commands::Delete { key } => {
                storage.delete(key).await?;
                Ok(0)
            }
            Commands::Clear => {
                storage.clear().await?;
                Ok(0)
            }
            Commands::Keys => {
                let mut keys = storage.keys()?;
                keys.sort();
                for key in keys {
                    println!("{}", key);
                }
                Ok(0)
            }
            Commands::Status => {
                let status = persistence.status().await;
                println!("statebox {}", statebox::VERSION);
                println!("Backend: {}", storage.selection());
                println!("Location: {:?}", persistence.settings().location());
                println!("Health: {}", status.health);
                if let Some(message) = &status.message {
                    println!("Message: {}", message);
                }
                if let Some(keys) = status.metadata.get("keys") {
                    println!("Keys: {}", keys);
                }

                Ok(match status.health {
                    HealthStatus::Healthy => 0,
                    HealthStatus::Degraded => 1,
                    HealthStatus::Unhealthy => 2,
                    HealthStatus::Unknown => 3,
                })
            }
            Commands::Migrate => Err(Error::config("migrate runs without a storage instance")),
        }
    }

    /// Opens the box directly, without publishing a storage instance, and
    /// imports the legacy cache file if there is one.
    async fn migrate(settings: &StorageSettings) -> Result<i32> {
        let location = settings.location();
        let directory = location.directory().ok_or_else(|| {
            Error::validation("storage.directory", "migration needs a storage directory")
        })?;

        let cipher = match &settings.encryption_passphrase {
            Some(passphrase) => {
                Some(Arc::new(ChaChaBoxCipher::from_passphrase(passphrase)?) as Arc<dyn BoxCipher>)
            }
            None => None,
        };

        let backend = native::open_disk(directory, &settings.box_name, cipher).await?;
        let report = statebox::migration::migrate(directory, backend.as_ref()).await?;

        if report.file_found {
            println!(
                "Migrated {} keys, skipped {} from {}",
                report.migrated,
                report.skipped,
                directory.join(statebox::LEGACY_CACHE_FILE).display()
            );
        } else {
            println!("No legacy cache in {}", directory.display());
        }
        Ok(0)
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_parse_value() {
            assert_eq!(parse_value("5"), serde_json::json!(5));
            assert_eq!(parse_value(r#"{"a":1}"#), serde_json::json!({"a": 1}));
            assert_eq!(parse_value("dark"), serde_json::json!("dark"));
        }

        #[test]
        fn test_flags_become_overrides() {
            let cli = Cli::parse_from(["statebox", "--dir", "/tmp/state", "-v", "keys"]);
            let value = overrides(&cli);
            assert_eq!(value["storage"]["directory"], serde_json::json!("/tmp/state"));
            assert_eq!(value["logging"]["level"], serde_json::json!("debug"));

            let cli = Cli::parse_from(["statebox", "--web", "status"]);
            assert_eq!(overrides(&cli)["storage"]["web"], serde_json::json!(true));
        }

        #[test]
        fn test_dir_conflicts_with_web() {
            assert!(Cli::try_parse_from(["statebox", "--dir", "/tmp", "--web", "keys"]).is_err());
        }
    }
}
