use common::Backoff;
use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_INPUT_SIZE: u32 = 640;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Number of worker threads drawing from the job queue
    pub count: usize,
    pub confidence_threshold: f32,
    pub dequeue_timeout_ms: u64,
    pub inference_timeout_ms: u64,
    /// Jobs older than this at dequeue time are answered with an error
    pub max_job_age_ms: u64,
    pub restart_base_delay_ms: u64,
    pub restart_max_delay_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            count: 2,
            confidence_threshold: 0.5,
            dequeue_timeout_ms: 1000,
            inference_timeout_ms: 10_000,
            max_job_age_ms: 10_000,
            restart_base_delay_ms: 200,
            restart_max_delay_ms: 5000,
        }
    }
}

impl WorkerConfig {
    pub fn dequeue_timeout(&self) -> Duration {
        Duration::from_millis(self.dequeue_timeout_ms)
    }

    pub fn inference_timeout(&self) -> Duration {
        Duration::from_millis(self.inference_timeout_ms)
    }

    pub fn max_job_age(&self) -> Duration {
        Duration::from_millis(self.max_job_age_ms)
    }

    pub fn restart_backoff(&self) -> Backoff {
        Backoff::new(
            Duration::from_millis(self.restart_base_delay_ms),
            Duration::from_millis(self.restart_max_delay_ms),
        )
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.count == 0 {
            return Err("worker.count must be at least 1".to_string());
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(format!(
                "worker.confidence_threshold must be within [0, 1], got {}",
                self.confidence_threshold
            ));
        }
        if self.dequeue_timeout_ms == 0 || self.inference_timeout_ms == 0 {
            return Err("worker timeouts must be greater than zero".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionProvider {
    Cpu,
    Cuda,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub path: String,
    /// One class name per line; class ids index into it
    pub labels_path: Option<String>,
    pub input_size: u32,
    pub iou_threshold: f32,
    pub execution_provider: ExecutionProvider,
    pub intra_threads: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: "models/best.onnx".to_string(),
            labels_path: None,
            input_size: DEFAULT_INPUT_SIZE,
            iou_threshold: 0.45,
            execution_provider: ExecutionProvider::Cpu,
            intra_threads: 4,
        }
    }
}

impl ModelConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.input_size == 0 {
            return Err("model.input_size must be greater than zero".to_string());
        }
        if !(0.0..=1.0).contains(&self.iou_threshold) {
            return Err(format!(
                "model.iou_threshold must be within [0, 1], got {}",
                self.iou_threshold
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(WorkerConfig::default().validate().is_ok());
        assert!(ModelConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_zero_workers() {
        let config = WorkerConfig {
            count: 0,
            ..WorkerConfig::default()
        };
        assert!(config.validate().unwrap_err().contains("worker.count"));
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        let config = WorkerConfig {
            confidence_threshold: 1.5,
            ..WorkerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn durations_follow_millisecond_fields() {
        let config = WorkerConfig {
            dequeue_timeout_ms: 250,
            inference_timeout_ms: 3000,
            max_job_age_ms: 500,
            ..WorkerConfig::default()
        };
        assert_eq!(config.dequeue_timeout(), Duration::from_millis(250));
        assert_eq!(config.inference_timeout(), Duration::from_secs(3));
        assert_eq!(config.max_job_age(), Duration::from_millis(500));
        assert_eq!(
            config.restart_backoff().delay_for_attempt(1),
            Duration::from_millis(400)
        );
    }
}
