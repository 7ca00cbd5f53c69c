// src/logging.rs

//! Tracing subscriber setup
//!
//! Native builds log to stderr and, when configured, to a daily-rolling file
//! written through a non-blocking worker. Wasm builds forward events to the
//! browser console through `tracing-wasm`.

use uuid::Uuid;

use crate::config::LoggingConfig;
use crate::error::{Error, Result};
use crate::manager::{HealthStatus, ManagedState, Manager, ManagerState, ManagerStatus};

#[cfg(not(target_arch = "wasm32"))]
use tracing_appender::non_blocking::WorkerGuard;
#[cfg(not(target_arch = "wasm32"))]
use tracing_subscriber::{
    fmt::{self, MakeWriter},
    registry::LookupSpan,
    Layer,
};

#[cfg(not(target_arch = "wasm32"))]
use crate::config::LogFormat;

/// Parses a level name such as `info` or `DEBUG`
pub fn parse_level(level: &str) -> Result<tracing::Level> {
    level.trim().parse::<tracing::Level>().map_err(|e| {
        Error::validation("logging.level", format!("invalid log level '{}'", level)).caused_by(e)
    })
}

/// A fmt layer writing `format` lines to `writer`. Json output is never colored.
#[cfg(not(target_arch = "wasm32"))]
fn format_layer<S, W>(format: LogFormat, writer: W, ansi: bool) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a> + 'static,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    match format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_ansi(false)
            .with_writer(writer)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .pretty()
            .with_ansi(ansi)
            .with_writer(writer)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_ansi(ansi)
            .with_writer(writer)
            .boxed(),
    }
}

/// Installs the global subscriber described by `config`.
///
/// `RUST_LOG` overrides the configured level. The returned guards flush the
/// file writer when dropped and must be kept alive for as long as logging is
/// needed.
#[cfg(not(target_arch = "wasm32"))]
pub fn init_logging(config: &LoggingConfig) -> Result<Vec<WorkerGuard>> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level).map_err(|e| {
            Error::validation("logging.level", format!("invalid filter '{}'", config.level))
                .caused_by(e)
        })?,
    };

    let mut guards = Vec::new();

    let console_layer = config
        .console
        .enabled
        .then(|| format_layer(config.format, std::io::stderr, config.console.colored));

    let file_layer = match &config.file {
        Some(file_config) => {
            let directory = file_config
                .path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| std::path::Path::new("."));
            let file_name = file_config
                .path
                .file_name()
                .unwrap_or_else(|| std::ffi::OsStr::new("statebox.log"));

            let file_appender = tracing_appender::rolling::daily(directory, file_name);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            guards.push(guard);

            Some(format_layer(config.format, non_blocking, false))
        }
        None => None,
    };

    Registry::default()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| Error::config("Failed to install tracing subscriber").caused_by(e))?;

    Ok(guards)
}

#[cfg(target_arch = "wasm32")]
static WASM_INSTALLED: std::sync::atomic::AtomicBool = std::sync::atomic::AtomicBool::new(false);

/// Installs `tracing-wasm` at the configured level. Fails if already
/// installed.
#[cfg(target_arch = "wasm32")]
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    use std::sync::atomic::Ordering;

    console_error_panic_hook::set_once();

    let level = parse_level(&config.level)?;
    if WASM_INSTALLED.swap(true, Ordering::SeqCst) {
        return Err(Error::config("tracing subscriber already installed"));
    }
    let wasm_config = tracing_wasm::WASMLayerConfigBuilder::new()
        .set_max_level(level)
        .build();
    tracing_wasm::set_as_global_default_with_config(wasm_config);
    Ok(())
}

/// Owns the installed subscriber's lifetime.
#[derive(Debug)]
pub struct LoggingManager {
    state: ManagedState,
    config: LoggingConfig,
    #[cfg(not(target_arch = "wasm32"))]
    guards: Vec<WorkerGuard>,
}

impl LoggingManager {
    pub fn new(config: LoggingConfig) -> Self {
        Self {
            state: ManagedState::new(Uuid::new_v4(), "logging_manager"),
            config,
            #[cfg(not(target_arch = "wasm32"))]
            guards: Vec::new(),
        }
    }

    pub fn config(&self) -> &LoggingConfig {
        &self.config
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
impl Manager for LoggingManager {
    fn name(&self) -> &str {
        "logging_manager"
    }

    fn id(&self) -> Uuid {
        self.state.id()
    }

    async fn initialize(&mut self) -> Result<()> {
        self.state.set_state(ManagerState::Initializing).await;

        #[cfg(not(target_arch = "wasm32"))]
        let installed = init_logging(&self.config).map(|guards| self.guards = guards);
        #[cfg(target_arch = "wasm32")]
        let installed = init_logging(&self.config);

        if let Err(e) = installed {
            self.state.fail(&e).await;
            return Err(e);
        }

        self.state.set_state(ManagerState::Running).await;
        self.state.set_health(HealthStatus::Healthy).await;
        tracing::debug!(level = %self.config.level, "logging initialized");
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<()> {
        self.state.set_state(ManagerState::ShuttingDown).await;

        // Dropping the guards flushes pending file output
        #[cfg(not(target_arch = "wasm32"))]
        self.guards.clear();

        self.state.set_state(ManagerState::Shutdown).await;
        Ok(())
    }

    async fn status(&self) -> ManagerStatus {
        let mut status = self.state.status().await;
        status.add_metadata("level", serde_json::json!(self.config.level));
        status.add_metadata("format", serde_json::json!(self.config.format));
        status.add_metadata(
            "file",
            serde_json::json!(self.config.file.as_ref().map(|f| f.path.display().to_string())),
        );
        status
    }
}
