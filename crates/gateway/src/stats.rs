use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

const LATENCY_SMOOTHING: f64 = 0.2;
const FPS_WINDOW: Duration = Duration::from_secs(1);

/// Counters a session publishes for the status surface.
///
/// Written only by the owning session task; any thread may read.
#[derive(Debug, Default)]
pub struct SessionStats {
    pub frames_received: AtomicU64,
    pub frames_sent: AtomicU64,
    pub frames_dropped: AtomicU64,
    pub frames_rejected: AtomicU64,
    pub results_delivered: AtomicU64,
    pub results_discarded: AtomicU64,
    pub results_failed: AtomicU64,
    inflight: AtomicU64,
    last_sequence_sent: AtomicU64,
    latency_ms_bits: AtomicU64,
    fps_bits: AtomicU64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub frames_received: u64,
    pub frames_sent: u64,
    pub frames_dropped: u64,
    pub frames_rejected: u64,
    pub results_delivered: u64,
    pub results_discarded: u64,
    pub results_failed: u64,
    pub inflight: u64,
    pub last_sequence_sent: u64,
    pub avg_latency_ms: f64,
    pub fps: f64,
}

impl SessionStats {
    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn set_progress(&self, inflight: usize, last_sequence_sent: u64) {
        self.inflight.store(inflight as u64, Ordering::Relaxed);
        self.last_sequence_sent
            .store(last_sequence_sent, Ordering::Relaxed);
    }

    pub(crate) fn set_rolling(&self, latency_ms: f64, fps: f64) {
        self.latency_ms_bits
            .store(latency_ms.to_bits(), Ordering::Relaxed);
        self.fps_bits.store(fps.to_bits(), Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            frames_rejected: self.frames_rejected.load(Ordering::Relaxed),
            results_delivered: self.results_delivered.load(Ordering::Relaxed),
            results_discarded: self.results_discarded.load(Ordering::Relaxed),
            results_failed: self.results_failed.load(Ordering::Relaxed),
            inflight: self.inflight.load(Ordering::Relaxed),
            last_sequence_sent: self.last_sequence_sent.load(Ordering::Relaxed),
            avg_latency_ms: f64::from_bits(self.latency_ms_bits.load(Ordering::Relaxed)),
            fps: f64::from_bits(self.fps_bits.load(Ordering::Relaxed)),
        }
    }
}

/// Latency EWMA and delivered-results rate over a sliding window.
#[derive(Debug, Default)]
pub struct RollingStats {
    latency_ms: Option<f64>,
    deliveries: VecDeque<Instant>,
}

impl RollingStats {
    pub fn record(&mut self, latency: Option<Duration>, now: Instant) {
        if let Some(latency) = latency {
            let sample = latency.as_secs_f64() * 1000.0;
            self.latency_ms = Some(match self.latency_ms {
                Some(avg) => avg + LATENCY_SMOOTHING * (sample - avg),
                None => sample,
            });
        }
        self.deliveries.push_back(now);
        self.expire(now);
    }

    pub fn latency_ms(&self) -> f64 {
        self.latency_ms.unwrap_or(0.0)
    }

    pub fn fps(&mut self, now: Instant) -> f64 {
        self.expire(now);
        self.deliveries.len() as f64 / FPS_WINDOW.as_secs_f64()
    }

    fn expire(&mut self, now: Instant) {
        while let Some(&oldest) = self.deliveries.front() {
            if now.duration_since(oldest) > FPS_WINDOW {
                self.deliveries.pop_front();
            } else {
                break;
            }
        }
    }
}
