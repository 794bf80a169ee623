//! Subscriber setup for library consumers and the `flight_read` binary.

use std::path::PathBuf;

pub use crate::logging::error::LogError;
pub use crate::logging::opentelemetry::DEFAULT_TRACES_ENDPOINT;
use crate::logging::error::{AlreadyInitializedSnafu, LogFileSnafu};
use crate::logging::opentelemetry::init_tracer;
use snafu::ResultExt;
use tracing::level_filters::LevelFilter;
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::Layer;
use tracing_subscriber::Registry;
use tracing_subscriber::layer::SubscriberExt;

mod error;
mod opentelemetry;

pub struct LoggingConfig {
    pub log_file: Option<PathBuf>,
    pub stderr: bool,
    pub stderr_level: LevelFilter,
    /// OTLP/HTTP traces endpoint, tracing export is off when unset.
    pub opentelemetry: Option<String>,
}

impl LoggingConfig {
    pub fn new(log_file: Option<PathBuf>, stderr: bool, opentelemetry: Option<String>) -> Self {
        Self {
            log_file,
            stderr,
            stderr_level: LevelFilter::INFO,
            opentelemetry,
        }
    }

    pub fn with_stderr_level(mut self, level: LevelFilter) -> Self {
        self.stderr_level = level;
        self
    }
}

struct EmptyLayer;

impl Layer<Registry> for EmptyLayer {}

pub fn init(config: LoggingConfig) -> Result<(), LogError> {
    init_logging::<EmptyLayer>(config, None)
}

pub fn init_logging<L>(config: LoggingConfig, extra_layer: Option<L>) -> Result<(), LogError>
where
    L: Layer<Registry> + Send + Sync,
{
    let subscriber = Registry::default();
    let subscriber = subscriber.with(extra_layer);

    let file_layer = if let Some(log_file) = config.log_file {
        let file = std::fs::File::create(&log_file).context(LogFileSnafu {
            path: log_file.display().to_string(),
        })?;
        Some(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file),
        )
    } else {
        None
    };
    let subscriber = subscriber.with(file_layer);

    let opentelemetry_layer = if let Some(endpoint) = &config.opentelemetry {
        let tracer = init_tracer(endpoint)?;
        Some(OpenTelemetryLayer::new(tracer))
    } else {
        None
    };
    let subscriber = subscriber.with(opentelemetry_layer);

    let stderr_layer = if config.stderr {
        Some(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(config.stderr_level),
        )
    } else {
        None
    };
    let subscriber = subscriber.with(stderr_layer);

    tracing::subscriber::set_global_default(subscriber).context(AlreadyInitializedSnafu)?;
    Ok(())
}
