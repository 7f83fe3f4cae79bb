use crate::backend::{EngineError, InferenceEngine};
use crate::config::WorkerConfig;
use crate::metrics::WorkerMetrics;
use crate::runner::EngineRunner;
use bridge::{BroadcastChannel, DetectionResult, FrameJob, JobQueue};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

pub const EXPIRED_MESSAGE: &str = "frame expired before processing";

/// Why a worker stopped without being asked to.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WorkerFault {
    #[error("engine did not answer within {0:?}")]
    EngineHung(std::time::Duration),

    #[error("engine resources exhausted: {0}")]
    ResourceExhausted(String),

    #[error("engine stopped: {0}")]
    EngineCrashed(String),

    #[error("failed to start engine: {0}")]
    Startup(String),
}

impl WorkerFault {
    /// Only meaningful for errors where [`EngineError::is_fatal`] holds.
    fn from_engine(err: EngineError) -> Self {
        match err {
            EngineError::Timeout(timeout) => WorkerFault::EngineHung(timeout),
            EngineError::ResourceExhausted(msg) => WorkerFault::ResourceExhausted(msg),
            other => WorkerFault::EngineCrashed(other.to_string()),
        }
    }
}

/// Everything a worker shares with its pool.
#[derive(Clone)]
pub struct WorkerContext {
    pub queue: Arc<dyn JobQueue>,
    pub broadcast: Arc<dyn BroadcastChannel>,
    pub config: WorkerConfig,
    pub shutdown: Arc<AtomicBool>,
    pub metrics: WorkerMetrics,
}

/// Pulls jobs off the queue, runs the engine and publishes one result per job.
pub struct Worker {
    id: usize,
    runner: EngineRunner,
    ctx: WorkerContext,
}

impl Worker {
    pub fn new<E: InferenceEngine>(
        id: usize,
        engine: E,
        ctx: WorkerContext,
    ) -> Result<Self, WorkerFault> {
        let runner = EngineRunner::spawn(format!("engine-{}", id), engine)
            .map_err(|e| WorkerFault::Startup(e.to_string()))?;
        Ok(Self { id, runner, ctx })
    }

    /// Loop until shutdown, a closed and drained queue, or a fatal engine
    /// error. Every job dequeued gets exactly one published result, even the
    /// one that ends the loop.
    pub fn run(mut self) -> Result<(), WorkerFault> {
        tracing::info!(worker_id = self.id, "Worker started");
        let dequeue_timeout = self.ctx.config.dequeue_timeout();

        loop {
            if self.ctx.shutdown.load(Ordering::Acquire) {
                tracing::info!(worker_id = self.id, "Worker stopping on shutdown");
                return Ok(());
            }

            match self.ctx.queue.dequeue(dequeue_timeout) {
                Some(job) => self.process(job)?,
                None if self.ctx.queue.is_closed() => {
                    tracing::info!(worker_id = self.id, "Queue closed, worker exiting");
                    return Ok(());
                }
                None => {}
            }
        }
    }

    fn process(&mut self, job: FrameJob) -> Result<(), WorkerFault> {
        let span = tracing::info_span!(
            "process_frame",
            worker_id = self.id,
            session_id = %job.session_id,
            sequence = job.sequence,
        );
        let _guard = span.enter();

        let age = job.age();
        if age > self.ctx.config.max_job_age() {
            tracing::warn!(age_ms = age.as_millis() as u64, "Job expired in queue");
            self.ctx.metrics.record_expired();
            self.publish(DetectionResult::error(&job, EXPIRED_MESSAGE));
            return Ok(());
        }

        let result = self.runner.run(
            job.payload.clone(),
            self.ctx.config.confidence_threshold,
            self.ctx.config.inference_timeout(),
        );

        match result {
            Ok(output) => {
                tracing::debug!(
                    detections = output.detections.len(),
                    inference_ms = output.elapsed_ms,
                    "Frame processed"
                );
                self.ctx
                    .metrics
                    .record_success(output.elapsed_ms, output.detections.len());
                self.publish(DetectionResult::success(
                    &job,
                    output.detections,
                    output.elapsed_ms,
                ));
                Ok(())
            }
            Err(err) => {
                self.ctx.metrics.record_failure(err.kind());
                self.publish(DetectionResult::error(&job, err.to_string()));

                if err.is_fatal() {
                    tracing::error!(error = %err, "Fatal engine error, worker stopping");
                    Err(WorkerFault::from_engine(err))
                } else {
                    tracing::warn!(error = %err, "Frame failed");
                    Ok(())
                }
            }
        }
    }

    fn publish(&self, result: DetectionResult) {
        let session_id = result.session_id.clone();
        let delivered = self.ctx.broadcast.publish(&session_id, result);
        if delivered == 0 {
            tracing::debug!(session_id = %session_id, "Result had no subscriber");
        }
    }
}
