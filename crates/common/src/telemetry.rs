use crate::config::{Environment, LogLevel};
use crate::logging::init_subscriber;
use opentelemetry::KeyValue;
use opentelemetry::global;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    Resource,
    metrics::{PeriodicReader, SdkMeterProvider},
    propagation::TraceContextPropagator,
    trace::{Sampler, SdkTracerProvider},
};
use std::time::Duration;

/// Where and how often to export.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub service_name: String,
    /// OTLP gRPC collector, e.g. `http://localhost:4317`
    pub endpoint: String,
    pub metrics_interval: Duration,
    /// Fraction of root traces kept. Per-frame spans add up quickly at
    /// video rates, so production deployments usually lower this.
    pub trace_sample_ratio: f64,
}

impl TelemetryConfig {
    pub fn new(service_name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            endpoint: endpoint.into(),
            metrics_interval: Duration::from_secs(10),
            trace_sample_ratio: 1.0,
        }
    }

    pub fn with_sample_ratio(mut self, ratio: f64) -> Self {
        self.trace_sample_ratio = ratio;
        self
    }

    fn sampler(&self) -> Sampler {
        let root = if self.trace_sample_ratio >= 1.0 {
            Sampler::AlwaysOn
        } else if self.trace_sample_ratio <= 0.0 {
            Sampler::AlwaysOff
        } else {
            Sampler::TraceIdRatioBased(self.trace_sample_ratio)
        };
        Sampler::ParentBased(Box::new(root))
    }
}

/// Owns the OTLP trace and metric providers; flushes and shuts them down on drop.
///
/// Must be created from within a Tokio runtime: the batch span exporter and
/// the periodic metric reader run on it.
///
/// ```ignore
/// let config = TelemetryConfig::new("gateway", "http://localhost:4317");
/// let _telemetry = TelemetryGuard::init(&config, LogLevel::Info, Environment::Production)?;
/// ```
pub struct TelemetryGuard {
    tracer_provider: SdkTracerProvider,
    meter_provider: SdkMeterProvider,
}

impl TelemetryGuard {
    /// Install global providers and the tracing subscriber with the
    /// tracing-opentelemetry layer attached.
    pub fn init(
        config: &TelemetryConfig,
        log_level: LogLevel,
        environment: Environment,
    ) -> anyhow::Result<Self> {
        global::set_text_map_propagator(TraceContextPropagator::new());

        let resource = resource(&config.service_name, environment);
        let tracer_provider = tracer_provider(config, resource.clone())?;
        let meter_provider = meter_provider(config, resource)?;

        global::set_tracer_provider(tracer_provider.clone());
        global::set_meter_provider(meter_provider.clone());

        let otel_layer =
            tracing_opentelemetry::layer().with_tracer(global::tracer(config.service_name.clone()));
        init_subscriber(log_level, environment, Some(otel_layer));

        tracing::info!(
            service = %config.service_name,
            endpoint = %config.endpoint,
            sample_ratio = config.trace_sample_ratio,
            "OpenTelemetry export enabled"
        );

        Ok(Self {
            tracer_provider,
            meter_provider,
        })
    }
}

fn resource(service_name: &str, environment: Environment) -> Resource {
    Resource::builder()
        .with_attributes([
            KeyValue::new(
                opentelemetry_semantic_conventions::attribute::SERVICE_NAME,
                service_name.to_string(),
            ),
            KeyValue::new(
                opentelemetry_semantic_conventions::attribute::SERVICE_VERSION,
                env!("CARGO_PKG_VERSION"),
            ),
            KeyValue::new("deployment.environment", environment.as_str()),
        ])
        .build()
}

fn tracer_provider(
    config: &TelemetryConfig,
    resource: Resource,
) -> anyhow::Result<SdkTracerProvider> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(config.endpoint.as_str())
        .build()?;

    Ok(SdkTracerProvider::builder()
        .with_resource(resource)
        .with_sampler(config.sampler())
        .with_batch_exporter(exporter)
        .build())
}

fn meter_provider(config: &TelemetryConfig, resource: Resource) -> anyhow::Result<SdkMeterProvider> {
    let exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_tonic()
        .with_endpoint(config.endpoint.as_str())
        .build()?;

    let reader = PeriodicReader::builder(exporter)
        .with_interval(config.metrics_interval)
        .build();

    Ok(SdkMeterProvider::builder()
        .with_resource(resource)
        .with_reader(reader)
        .build())
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Err(e) = self.tracer_provider.shutdown() {
            eprintln!("Failed to shutdown tracer provider: {:?}", e);
        }
        if let Err(e) = self.meter_provider.shutdown() {
            eprintln!("Failed to shutdown meter provider: {:?}", e);
        }
    }
}
