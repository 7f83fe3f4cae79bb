use common::{TelemetryConfig, TelemetryGuard, setup_logging};
use gateway::{get_configuration, start_app};
use inference::OrtBackend;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = get_configuration()?;

    let _telemetry = match &config.otel_endpoint {
        Some(endpoint) => {
            let telemetry = TelemetryConfig::new("gateway", endpoint.as_str())
                .with_sample_ratio(config.otel_sample_ratio);
            Some(TelemetryGuard::init(
                &telemetry,
                config.log_level,
                config.environment,
            )?)
        }
        None => {
            setup_logging(config.log_level, config.environment);
            None
        }
    };

    tracing::info!(
        environment = config.environment.as_str(),
        workers = config.worker.count,
        model = %config.model.path,
        "Starting gateway"
    );

    let model = config.model.clone();
    start_app(config, move |worker_id| {
        tracing::info!(worker_id, "Loading model");
        OrtBackend::load(&model)
    })
    .await
}
