use std::time::Duration;

use anyhow::{Context, Result};
use opentelemetry::global;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::KeyValue;
use opentelemetry_otlp::{TonicExporterBuilder, WithExportConfig};
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::{Config, TracerProvider};
use opentelemetry_sdk::{runtime, Resource};
use opentelemetry_semantic_conventions::resource::{SERVICE_NAME, SERVICE_VERSION};
use tracing_opentelemetry::{MetricsLayer, OpenTelemetryLayer};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Registry;

/// Exporter providers that must be flushed before the process exits.
#[derive(Default)]
pub(crate) struct Telemetry {
    tracer_provider: Option<TracerProvider>,
    meter_provider: Option<SdkMeterProvider>,
}

/// Console logging is always on unless an OTLP endpoint is configured, in
/// which case it stays on only when `console` is set.
pub(crate) fn init_telemetry(endpoint: &Option<String>, console: bool) -> Result<Telemetry> {
    let registry = Registry::default()
        .with(EnvFilter::try_from_default_env().unwrap_or(EnvFilter::new("INFO")));

    let Some(endpoint) = endpoint else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()?;
        return Ok(Telemetry::default());
    };

    let service_resource = Resource::new(vec![
        KeyValue::new(SERVICE_NAME, env!("CARGO_PKG_NAME")),
        KeyValue::new(SERVICE_VERSION, env!("CARGO_PKG_VERSION")),
    ]);

    let tracer_provider = opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(build_tonic_exporter(endpoint))
        .with_trace_config(Config::default().with_resource(service_resource.clone()))
        .install_batch(runtime::Tokio)
        .context("Failed to install tracer")?;

    let meter_provider = opentelemetry_otlp::new_pipeline()
        .metrics(runtime::Tokio)
        .with_exporter(build_tonic_exporter(endpoint))
        .with_resource(service_resource)
        .build()
        .context("Failed to install meter")?;

    global::set_text_map_propagator(TraceContextPropagator::new());
    global::set_tracer_provider(tracer_provider.clone());
    let tracer = tracer_provider.tracer(env!("CARGO_PKG_NAME"));

    registry
        .with(OpenTelemetryLayer::new(tracer))
        .with(MetricsLayer::new(meter_provider.clone()))
        .with(console.then(tracing_subscriber::fmt::layer))
        .try_init()?;

    Ok(Telemetry {
        tracer_provider: Some(tracer_provider),
        meter_provider: Some(meter_provider),
    })
}

/// Flushes pending spans and metrics. Failures are only printed since the
/// subscriber may already be unusable at this point.
pub(crate) fn shutdown_telemetry(telemetry: Telemetry) {
    if let Some(tracer_provider) = telemetry.tracer_provider {
        for result in tracer_provider.force_flush() {
            if let Err(err) = result {
                eprintln!("Failed to flush spans: {err}");
            }
        }
        // The global copy must be the last one so dropping it shuts down the
        // batch processor.
        drop(tracer_provider);
        global::shutdown_tracer_provider();
    }
    if let Some(meter_provider) = telemetry.meter_provider {
        if let Err(err) = meter_provider.shutdown() {
            eprintln!("Failed to flush metrics: {err}");
        }
    }
}

fn build_tonic_exporter(endpoint: &str) -> TonicExporterBuilder {
    opentelemetry_otlp::new_exporter()
        .tonic()
        .with_timeout(Duration::from_secs(15))
        .with_endpoint(endpoint)
}
