use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{Resource, runtime, trace};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::{TelemetryConfig, TelemetryError};

/// Install the global subscriber and export spans over OTLP/gRPC to `endpoint`.
///
/// Export runs on the tokio runtime in batches, so it never blocks pipeline
/// calls. Must be called from within a tokio runtime.
pub fn init_with_otlp(service_name: &str, endpoint: &str) -> Result<(), TelemetryError> {
    let tracer = opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(opentelemetry_otlp::new_exporter().tonic().with_endpoint(endpoint))
        .with_trace_config(trace::config().with_resource(Resource::new(vec![KeyValue::new(
            "service.name",
            service_name.to_string(),
        )])))
        .install_batch(runtime::Tokio)
        .map_err(|e| TelemetryError::Exporter(e.to_string()))?;

    let config = TelemetryConfig::new(service_name);
    tracing_subscriber::registry()
        .with(config.env_filter())
        .with(config.fmt_layer())
        .with(tracing_opentelemetry::layer().with_tracer(tracer))
        .try_init()
        .map_err(|e| TelemetryError::Init(e.to_string()))?;
    tracing::debug!(service = %service_name, endpoint, "telemetry initialized with OTLP export");
    Ok(())
}
