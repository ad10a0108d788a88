//! # ragkit-telemetry
//!
//! Logging and observability for ragkit pipelines.
//!
//! - [`init_telemetry`] installs a `tracing-subscriber` stack (env filter plus
//!   text or JSON formatting).
//! - [`init_with_storage`] additionally captures spans in memory via
//!   [`InMemoryTraceLayer`].
//! - [`TraceCollector`] receives one structured [`TraceRecord`] per pipeline
//!   run.
//! - With the `otlp` feature, `init_with_otlp` exports spans to an
//!   OpenTelemetry collector.

mod collector;
pub mod memory;
#[cfg(feature = "otlp")]
mod otlp;

use std::sync::Arc;

use thiserror::Error;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

pub use collector::{
    InMemoryTraceCollector, LogTraceCollector, NoopTraceCollector, StageTiming, TraceCollector,
    TraceRecord,
};
pub use memory::{InMemoryTraceLayer, RUN_ID_FIELD, SharedTraceStorage, SpanData, SpanStatus};
#[cfg(feature = "otlp")]
pub use otlp::init_with_otlp;

/// Errors raised while installing telemetry.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// A global subscriber is already installed, or the filter is invalid.
    #[error("Telemetry init error: {0}")]
    Init(String),

    /// The span exporter could not be built.
    #[error("Telemetry exporter error: {0}")]
    Exporter(String),
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    /// Reads `RAGKIT_LOG_FORMAT` (`json` or `text`), defaulting to text.
    pub fn from_env() -> Self {
        match std::env::var("RAGKIT_LOG_FORMAT") {
            Ok(v) if v.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Text,
        }
    }
}

/// Settings for [`init_with_config`].
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub service_name: String,
    /// Filter directive used when `RUST_LOG` is unset.
    pub default_filter: String,
    pub format: LogFormat,
    pub with_ansi: bool,
}

impl TelemetryConfig {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            default_filter: "info".to_string(),
            format: LogFormat::from_env(),
            with_ansi: true,
        }
    }

    pub fn with_default_filter(mut self, filter: impl Into<String>) -> Self {
        self.default_filter = filter.into();
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_ansi(mut self, enabled: bool) -> Self {
        self.with_ansi = enabled;
        self
    }

    pub(crate) fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.default_filter))
    }

    pub(crate) fn fmt_layer<S>(&self) -> Box<dyn Layer<S> + Send + Sync>
    where
        S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    {
        match self.format {
            LogFormat::Text => {
                tracing_subscriber::fmt::layer().with_ansi(self.with_ansi).with_target(true).boxed()
            }
            LogFormat::Json => tracing_subscriber::fmt::layer().json().with_target(true).boxed(),
        }
    }
}

/// Install the global subscriber with default settings for `service_name`.
pub fn init_telemetry(service_name: &str) -> Result<(), TelemetryError> {
    init_with_config(TelemetryConfig::new(service_name))
}

/// Install the global subscriber described by `config`.
pub fn init_with_config(config: TelemetryConfig) -> Result<(), TelemetryError> {
    tracing_subscriber::registry()
        .with(config.env_filter())
        .with(config.fmt_layer())
        .try_init()
        .map_err(|e| TelemetryError::Init(e.to_string()))?;
    tracing::debug!(service = %config.service_name, "telemetry initialized");
    Ok(())
}

/// Install the global subscriber and capture spans into `storage`.
pub fn init_with_storage(
    service_name: &str,
    storage: Arc<SharedTraceStorage>,
) -> Result<(), TelemetryError> {
    let config = TelemetryConfig::new(service_name);
    tracing_subscriber::registry()
        .with(config.env_filter())
        .with(config.fmt_layer())
        .with(InMemoryTraceLayer::new(storage))
        .try_init()
        .map_err(|e| TelemetryError::Init(e.to_string()))?;
    tracing::debug!(service = %service_name, "telemetry initialized with in-memory span storage");
    Ok(())
}
