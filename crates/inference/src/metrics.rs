use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, Histogram},
};

/// Worker-side instruments, shared by every worker in a pool.
///
/// Without an installed meter provider these are no-ops.
#[derive(Clone)]
pub struct WorkerMetrics {
    inference_duration: Histogram<f64>,
    jobs: Counter<u64>,
    failures: Counter<u64>,
    expired: Counter<u64>,
    detections: Counter<u64>,
    restarts: Counter<u64>,
}

impl WorkerMetrics {
    pub fn new(meter_name: &'static str) -> Self {
        let meter = global::meter(meter_name);
        let latency_buckets = [
            0.005, 0.01, 0.02, 0.03, 0.05, 0.075, 0.1, 0.15, 0.2, 0.3, 0.5, 1.0, 2.5, 5.0,
        ];

        Self {
            inference_duration: meter
                .f64_histogram("inference_duration_seconds")
                .with_description("Time to run one frame through the model")
                .with_unit("s")
                .with_boundaries(latency_buckets.to_vec())
                .build(),
            jobs: meter
                .u64_counter("inference_jobs_total")
                .with_description("Total jobs taken from the queue")
                .build(),
            failures: meter
                .u64_counter("inference_failures_total")
                .with_description("Jobs answered with an error result")
                .build(),
            expired: meter
                .u64_counter("inference_jobs_expired_total")
                .with_description("Jobs too old to process when dequeued")
                .build(),
            detections: meter
                .u64_counter("inference_detections_total")
                .with_description("Total detections produced")
                .build(),
            restarts: meter
                .u64_counter("inference_worker_restarts_total")
                .with_description("Workers restarted after a fault")
                .build(),
        }
    }

    pub(crate) fn record_success(&self, elapsed_ms: f64, detections: usize) {
        self.jobs.add(1, &[]);
        self.inference_duration.record(elapsed_ms / 1000.0, &[]);
        self.detections.add(detections as u64, &[]);
    }

    pub(crate) fn record_failure(&self, kind: &'static str) {
        self.jobs.add(1, &[]);
        self.failures.add(1, &[KeyValue::new("kind", kind)]);
    }

    pub(crate) fn record_expired(&self) {
        self.jobs.add(1, &[]);
        self.expired.add(1, &[]);
    }

    pub(crate) fn record_restart(&self) {
        self.restarts.add(1, &[]);
    }
}

impl Default for WorkerMetrics {
    fn default() -> Self {
        Self::new("inference")
    }
}
