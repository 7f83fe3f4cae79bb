use crate::config::SessionConfig;
use crate::dispatcher::Dispatcher;
use crate::error::{ProtocolViolation, SessionError};
use crate::metrics::GatewayMetrics;
use crate::stats::{RollingStats, SessionStats};
use bridge::DetectionResult;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

/// Per-connection state machine, independent of the transport.
///
/// Owned by exactly one task; it alone advances `last_sequence_sent`.
pub struct Session {
    id: String,
    config: SessionConfig,
    dispatcher: Arc<Dispatcher>,
    metrics: GatewayMetrics,
    stats: Arc<SessionStats>,
    last_sequence_sent: u64,
    last_sequence_enqueued: u64,
    /// Outstanding sequences and when they were enqueued
    inflight: BTreeMap<u64, Instant>,
    rolling: RollingStats,
}

impl Session {
    pub fn new(
        id: impl Into<String>,
        config: SessionConfig,
        dispatcher: Arc<Dispatcher>,
        metrics: GatewayMetrics,
    ) -> Self {
        Self {
            id: id.into(),
            config,
            dispatcher,
            metrics,
            stats: Arc::new(SessionStats::default()),
            last_sequence_sent: 0,
            last_sequence_enqueued: 0,
            inflight: BTreeMap::new(),
            rolling: RollingStats::default(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn stats(&self) -> Arc<SessionStats> {
        self.stats.clone()
    }

    pub fn inflight(&self) -> usize {
        self.inflight.len()
    }

    pub fn last_sequence_sent(&self) -> u64 {
        self.last_sequence_sent
    }

    pub fn last_sequence_enqueued(&self) -> u64 {
        self.last_sequence_enqueued
    }

    /// Validate a binary frame and submit it, returning its sequence.
    ///
    /// Every error is non-fatal: the frame is simply not processed.
    pub fn on_frame(&mut self, payload: Bytes) -> Result<u64, SessionError> {
        SessionStats::incr(&self.stats.frames_received);

        if let Err(violation) = self.validate(&payload) {
            SessionStats::incr(&self.stats.frames_rejected);
            self.metrics.frame_rejected();
            return Err(violation.into());
        }

        // Drop-newest: the frame that finds the session saturated is the one discarded
        if self.inflight.len() >= self.config.max_inflight {
            SessionStats::incr(&self.stats.frames_dropped);
            self.metrics.frame_dropped("backpressure");
            return Err(SessionError::Backpressure {
                inflight: self.inflight.len(),
                limit: self.config.max_inflight,
            });
        }

        match self.dispatcher.submit(&self.id, payload) {
            Ok(sequence) => {
                self.inflight.insert(sequence, Instant::now());
                self.last_sequence_enqueued = sequence;
                SessionStats::incr(&self.stats.frames_sent);
                self.publish_progress();
                Ok(sequence)
            }
            Err(err) => {
                SessionStats::incr(&self.stats.frames_dropped);
                self.metrics.frame_dropped("queue_unavailable");
                Err(err.into())
            }
        }
    }

    pub fn on_text(&mut self) -> SessionError {
        SessionStats::incr(&self.stats.frames_received);
        SessionStats::incr(&self.stats.frames_rejected);
        self.metrics.frame_rejected();
        ProtocolViolation::UnexpectedText.into()
    }

    /// Returns the result if it should be forwarded to the client.
    pub fn on_result(&mut self, result: DetectionResult) -> Option<DetectionResult> {
        if result.session_id != self.id {
            return None;
        }

        if result.sequence <= self.last_sequence_sent {
            tracing::debug!(
                session_id = %self.id,
                sequence = result.sequence,
                last_sent = self.last_sequence_sent,
                "Discarding stale result"
            );
            SessionStats::incr(&self.stats.results_discarded);
            self.metrics.result_discarded();
            return None;
        }

        let now = Instant::now();
        let enqueued_at = self.inflight.get(&result.sequence).copied();

        // Anything at or below this sequence can no longer be delivered
        self.inflight = self.inflight.split_off(&(result.sequence + 1));
        self.last_sequence_sent = result.sequence;

        self.rolling
            .record(enqueued_at.map(|at| now.duration_since(at)), now);
        let fps = self.rolling.fps(now);
        self.stats.set_rolling(self.rolling.latency_ms(), fps);

        SessionStats::incr(&self.stats.results_delivered);
        if result.is_error() {
            SessionStats::incr(&self.stats.results_failed);
        }
        self.publish_progress();

        Some(result)
    }

    /// Retire outstanding jobs whose results are overdue. Returns how many.
    pub fn sweep(&mut self, now: Instant) -> usize {
        let timeout = self.config.result_timeout();
        let before = self.inflight.len();
        self.inflight
            .retain(|_, enqueued_at| now.saturating_duration_since(*enqueued_at) < timeout);

        let expired = before - self.inflight.len();
        if expired > 0 {
            tracing::warn!(session_id = %self.id, expired, "Retired overdue jobs");
            self.publish_progress();
        }
        let fps = self.rolling.fps(now);
        self.stats.set_rolling(self.rolling.latency_ms(), fps);
        expired
    }

    fn validate(&self, payload: &Bytes) -> Result<(), ProtocolViolation> {
        if payload.is_empty() {
            return Err(ProtocolViolation::EmptyFrame);
        }
        if payload.len() > self.config.max_frame_bytes {
            return Err(ProtocolViolation::FrameTooLarge {
                size: payload.len(),
                limit: self.config.max_frame_bytes,
            });
        }
        Ok(())
    }

    fn publish_progress(&self) {
        self.stats
            .set_progress(self.inflight.len(), self.last_sequence_sent);
    }
}
