use common::{Environment, LogLevel};
use inference::{ModelConfig, WorkerConfig};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub log_level: LogLevel,
    pub environment: Environment,
    pub otel_endpoint: Option<String>,
    /// Fraction of traces exported when `otel_endpoint` is set
    #[serde(default = "default_sample_ratio")]
    pub otel_sample_ratio: f64,
    pub server: ServerConfig,
    pub session: SessionConfig,
    pub queue: QueueConfig,
    pub broadcast: BroadcastConfig,
    pub worker: WorkerConfig,
    pub model: ModelConfig,
}

fn default_sample_ratio() -> f64 {
    1.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn get_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub max_frame_bytes: usize,
    /// Transport hard cap. Frames between `max_frame_bytes` and this are
    /// rejected by the session; larger ones close the connection.
    pub max_message_bytes: usize,
    /// Frames arriving while this many jobs are outstanding are dropped
    pub max_inflight: usize,
    pub result_timeout_ms: u64,
    pub sweep_interval_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_frame_bytes: 5 * 1024 * 1024,
            max_message_bytes: 64 * 1024 * 1024,
            max_inflight: 2,
            result_timeout_ms: 15_000,
            sweep_interval_ms: 1000,
        }
    }
}

impl SessionConfig {
    pub fn result_timeout(&self) -> Duration {
        Duration::from_millis(self.result_timeout_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    pub capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BroadcastConfig {
    pub capacity: usize,
}

impl Config {
    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.otel_sample_ratio) {
            return Err(ConfigError::Invalid(
                "otel_sample_ratio must be within [0, 1]".into(),
            ));
        }
        if self.session.max_frame_bytes == 0 {
            return Err(ConfigError::Invalid(
                "session.max_frame_bytes must be greater than zero".into(),
            ));
        }
        if self.session.max_message_bytes < self.session.max_frame_bytes {
            return Err(ConfigError::Invalid(
                "session.max_message_bytes must not be below session.max_frame_bytes".into(),
            ));
        }
        if self.session.max_inflight == 0 {
            return Err(ConfigError::Invalid(
                "session.max_inflight must be at least 1".into(),
            ));
        }
        if self.session.sweep_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "session.sweep_interval_ms must be greater than zero".into(),
            ));
        }
        if self.queue.capacity == 0 || self.broadcast.capacity == 0 {
            return Err(ConfigError::Invalid(
                "queue and broadcast capacities must be greater than zero".into(),
            ));
        }
        self.worker.validate().map_err(ConfigError::Invalid)?;
        self.model.validate().map_err(ConfigError::Invalid)?;
        Ok(())
    }
}

/// Load configuration from defaults, `.env` and `GATEWAY_*` variables.
pub fn get_configuration() -> Result<Config, ConfigError> {
    let _ = dotenvy::dotenv();
    load(None)
}

/// `env` replaces the process environment; used by tests.
pub(crate) fn load(env: Option<config::Map<String, String>>) -> Result<Config, ConfigError> {
    let worker = WorkerConfig::default();
    let model = ModelConfig::default();
    let session = SessionConfig::default();

    let config = config::Config::builder()
        .set_default("log_level", "info")?
        .set_default("environment", "development")?
        .set_default("otel_sample_ratio", 1.0)?
        .set_default("server.host", "0.0.0.0")?
        .set_default("server.port", 8000)?
        .set_default("session.max_frame_bytes", session.max_frame_bytes as u64)?
        .set_default("session.max_message_bytes", session.max_message_bytes as u64)?
        .set_default("session.max_inflight", session.max_inflight as u64)?
        .set_default("session.result_timeout_ms", session.result_timeout_ms)?
        .set_default("session.sweep_interval_ms", session.sweep_interval_ms)?
        .set_default("queue.capacity", 256)?
        .set_default("broadcast.capacity", 16)?
        .set_default("worker.count", worker.count as u64)?
        .set_default("worker.confidence_threshold", worker.confidence_threshold as f64)?
        .set_default("model.path", model.path)?
        .add_source(
            config::Environment::with_prefix("GATEWAY")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .source(env),
        )
        .build()?;

    let config: Config = config.try_deserialize::<Config>()?;
    config.validate()?;

    Ok(config)
}
