//! Log output and OpenTelemetry trace export
//!
//! Installs the global `tracing` subscriber. When telemetry is enabled, spans
//! are also exported over OTLP/gRPC to the configured collector.

use crate::config::{LoggingSettings, TelemetrySettings};
use common::logging::{self, FilteredRegistry};
use opentelemetry::{KeyValue, trace::TracerProvider as _};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    Resource, runtime,
    trace::{RandomIdGenerator, Sampler, Tracer, TracerProvider},
};
use tracing_opentelemetry::OpenTelemetryLayer;

const DEFAULT_LOG_LEVEL: &str = "info";

/// OpenTelemetry tracer guard
///
/// When dropped, flushes all pending spans and shuts down the tracer
pub struct TelemetryGuard;

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        opentelemetry::global::shutdown_tracer_provider();
    }
}

/// Install logging, plus span export when `telemetry.enabled` is set.
///
/// Returns a guard that must live until shutdown when export is enabled.
pub fn init(
    logging_settings: &LoggingSettings,
    telemetry: &TelemetrySettings,
) -> common::Result<Option<TelemetryGuard>> {
    let level = logging_settings.level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL);

    let otel_layer = if telemetry.enabled {
        Some(otel_layer(telemetry)?)
    } else {
        None
    };
    let guard = otel_layer.as_ref().map(|_| TelemetryGuard);

    logging::try_init(logging_settings.format, level, otel_layer)
        .map_err(common::Error::telemetry)?;

    if telemetry.enabled {
        tracing::info!(
            service_name = %telemetry.service_name,
            otlp_endpoint = %telemetry.otlp_endpoint,
            "Tracing initialized with OpenTelemetry export"
        );
    } else {
        tracing::debug!("OpenTelemetry export disabled");
    }

    Ok(guard)
}

/// Build the OTLP pipeline and the layer feeding it
fn otel_layer(
    telemetry: &TelemetrySettings,
) -> common::Result<OpenTelemetryLayer<FilteredRegistry, Tracer>> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(telemetry.otlp_endpoint.clone())
        .build()
        .map_err(common::Error::telemetry)?;

    let resource = Resource::new(vec![
        KeyValue::new("service.name", telemetry.service_name.clone()),
        KeyValue::new("service.version", env!("CARGO_PKG_VERSION").to_string()),
    ]);

    let provider = TracerProvider::builder()
        .with_batch_exporter(exporter, runtime::Tokio)
        .with_sampler(Sampler::AlwaysOn)
        .with_id_generator(RandomIdGenerator::default())
        .with_resource(resource)
        .build();

    let tracer = provider.tracer(telemetry.service_name.clone());
    opentelemetry::global::set_tracer_provider(provider);

    Ok(tracing_opentelemetry::layer().with_tracer(tracer))
}
