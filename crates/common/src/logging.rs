use crate::config::{Environment, LogLevel};
use opentelemetry::global::BoxedTracer;
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

pub(crate) type OtelLayer = OpenTelemetryLayer<Registry, BoxedTracer>;

/// Initialize tracing subscriber with pretty formatting for development
/// and JSON formatting for production.
///
/// Uses RUST_LOG environment variable for filtering, falling back to the
/// configured log level when it is not set.
pub fn setup_logging(log_level: LogLevel, environment: Environment) {
    init_subscriber(log_level, environment, None);
}

pub(crate) fn init_subscriber(
    log_level: LogLevel,
    environment: Environment,
    otel_layer: Option<OtelLayer>,
) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.as_str()));

    let registry = tracing_subscriber::registry()
        .with(otel_layer)
        .with(env_filter);

    match environment {
        Environment::Production => {
            registry
                .with(tracing_subscriber::fmt::layer().json().with_level(true))
                .init();
        }
        Environment::Development => {
            registry
                .with(tracing_subscriber::fmt::layer().pretty().with_ansi(true))
                .init();
        }
    }
}
