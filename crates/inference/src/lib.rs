pub mod backend;
pub mod config;
pub mod labels;
pub mod metrics;
pub mod pool;
pub mod processing;
pub mod runner;
pub mod worker;

// Re-export commonly used types for convenience
pub use backend::{EngineError, InferenceEngine, InferenceOutput, decode_frame};
pub use config::{ExecutionProvider, ModelConfig, WorkerConfig};
pub use labels::Labels;
pub use metrics::WorkerMetrics;
pub use pool::{Liveness, WorkerPool};
pub use worker::{EXPIRED_MESSAGE, Worker, WorkerContext, WorkerFault};

#[cfg(feature = "ort-backend")]
pub use backend::ort::OrtBackend;
