mod sinks;

pub use sinks::{LogFiles, COMBINED_LOG, ERROR_LOG};

use std::path::PathBuf;

use tracing::Subscriber;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Errors raised while setting up the logging context.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("failed to open log sink {path}: {source}")]
    OpenSink {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid log filter {filter:?}: {reason}")]
    InvalidFilter { filter: String, reason: String },

    #[error("global subscriber already installed: {0}")]
    AlreadyInitialized(String),
}

/// Configuration for the logging context.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Default filter directive (e.g. `info`, `triage_server=debug`).
    pub filter: String,
    /// Let `RUST_LOG` override `filter` when set.
    pub env_override: bool,
    /// Directory holding `error.log` and `combined.log`.
    pub log_dir: PathBuf,
    /// Also write human-readable lines to stdout.
    pub console: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            filter: "info".into(),
            env_override: true,
            log_dir: PathBuf::from("logs"),
            console: true,
        }
    }
}

impl TelemetryConfig {
    fn env_filter(&self) -> Result<EnvFilter, TelemetryError> {
        if self.env_override {
            if let Ok(filter) = EnvFilter::try_from_default_env() {
                return Ok(filter);
            }
        }
        EnvFilter::try_new(&self.filter).map_err(|e| TelemetryError::InvalidFilter {
            filter: self.filter.clone(),
            reason: e.to_string(),
        })
    }
}

/// Boxed layer stack, usable on the global registry or a scoped subscriber.
pub type BoxedLayer<S> = Box<dyn Layer<S> + Send + Sync + 'static>;

/// Build the three sinks: error-only JSON file, combined JSON file, console.
pub fn build_layers<S>(config: &TelemetryConfig) -> Result<(Vec<BoxedLayer<S>>, LogFiles), TelemetryError>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let files = LogFiles::open(&config.log_dir)?;
    let mut layers: Vec<BoxedLayer<S>> = Vec::with_capacity(3);

    layers.push(
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(false)
            .with_writer(files.error.clone())
            .with_filter(LevelFilter::ERROR)
            .boxed(),
    );

    layers.push(
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(false)
            .with_writer(files.combined.clone())
            .with_filter(config.env_filter()?)
            .boxed(),
    );

    if config.console {
        layers.push(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_target(false)
                .with_filter(config.env_filter()?)
                .boxed(),
        );
    }

    Ok((layers, files))
}

/// Flushes the file sinks on drop. Keep alive for the process lifetime.
pub struct TelemetryGuard {
    files: LogFiles,
}

impl TelemetryGuard {
    pub fn flush(&self) {
        if let Err(e) = self.files.sync() {
            eprintln!("triage-telemetry: failed to flush log sinks: {e}");
        }
    }

    pub fn log_files(&self) -> &LogFiles {
        &self.files
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        self.flush();
    }
}

/// Install the logging context as the global subscriber. Call once at startup.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    let (layers, files) = build_layers(&config)?;

    tracing_subscriber::registry()
        .with(layers)
        .try_init()
        .map_err(|e| TelemetryError::AlreadyInitialized(e.to_string()))?;

    Ok(TelemetryGuard { files })
}
