use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, UpDownCounter},
};

#[derive(Clone)]
pub struct GatewayMetrics {
    active_sessions: UpDownCounter<i64>,
    frames_dropped: Counter<u64>,
    frames_rejected: Counter<u64>,
    results_discarded: Counter<u64>,
}

impl GatewayMetrics {
    pub fn new(meter_name: &'static str) -> Self {
        let meter = global::meter(meter_name);
        Self {
            active_sessions: meter
                .i64_up_down_counter("gateway_active_sessions")
                .with_description("Connected client sessions")
                .build(),
            frames_dropped: meter
                .u64_counter("gateway_frames_dropped_total")
                .with_description("Frames dropped before reaching the queue")
                .build(),
            frames_rejected: meter
                .u64_counter("gateway_frames_rejected_total")
                .with_description("Malformed client frames")
                .build(),
            results_discarded: meter
                .u64_counter("gateway_results_discarded_total")
                .with_description("Stale or duplicate results not forwarded")
                .build(),
        }
    }

    pub(crate) fn session_opened(&self) {
        self.active_sessions.add(1, &[]);
    }

    pub(crate) fn session_closed(&self) {
        self.active_sessions.add(-1, &[]);
    }

    pub(crate) fn frame_dropped(&self, reason: &'static str) {
        self.frames_dropped
            .add(1, &[KeyValue::new("reason", reason)]);
    }

    pub(crate) fn frame_rejected(&self) {
        self.frames_rejected.add(1, &[]);
    }

    pub(crate) fn result_discarded(&self) {
        self.results_discarded.add(1, &[]);
    }
}

impl Default for GatewayMetrics {
    fn default() -> Self {
        Self::new("gateway")
    }
}
