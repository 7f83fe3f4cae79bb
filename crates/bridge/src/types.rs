use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Format the client-facing frame identifier, `"<session_id>:<sequence>"`.
pub fn frame_id(session_id: &str, sequence: u64) -> String {
    format!("{}:{}", session_id, sequence)
}

/// Unit of inference work enqueued for one inbound frame.
#[derive(Debug, Clone)]
pub struct FrameJob {
    pub session_id: String,
    /// Strictly increasing per session, assigned at enqueue time.
    pub sequence: u64,
    /// Encoded image bytes, opaque to the queue.
    pub payload: Bytes,
    pub enqueued_at: Instant,
}

impl FrameJob {
    pub fn new(session_id: impl Into<String>, sequence: u64, payload: Bytes) -> Self {
        Self {
            session_id: session_id.into(),
            sequence,
            payload,
            enqueued_at: Instant::now(),
        }
    }

    pub fn frame_id(&self) -> String {
        frame_id(&self.session_id, self.sequence)
    }

    pub fn age(&self) -> Duration {
        self.enqueued_at.elapsed()
    }
}

/// One detected object, in original-image pixel coordinates (top-left origin).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub label: String,
    pub class_id: u32,
    /// In `[0, 1]`.
    pub confidence: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Success,
    Error,
}

/// Worker output for one [`FrameJob`], also the record sent to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub frame_id: String,
    pub session_id: String,
    pub sequence: u64,
    pub detections: Vec<Detection>,
    pub num_detections: usize,
    pub inference_time_ms: f64,
    pub status: ResultStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl DetectionResult {
    pub fn success(job: &FrameJob, detections: Vec<Detection>, inference_time_ms: f64) -> Self {
        Self {
            frame_id: job.frame_id(),
            session_id: job.session_id.clone(),
            sequence: job.sequence,
            num_detections: detections.len(),
            detections,
            inference_time_ms: round_ms(inference_time_ms),
            status: ResultStatus::Success,
            message: None,
        }
    }

    /// Failed frame: detections are always empty.
    pub fn error(job: &FrameJob, message: impl Into<String>) -> Self {
        Self {
            frame_id: job.frame_id(),
            session_id: job.session_id.clone(),
            sequence: job.sequence,
            detections: Vec::new(),
            num_detections: 0,
            inference_time_ms: 0.0,
            status: ResultStatus::Error,
            message: Some(message.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.status == ResultStatus::Error
    }
}

fn round_ms(ms: f64) -> f64 {
    if ms.is_finite() {
        (ms.max(0.0) * 10.0).round() / 10.0
    } else {
        0.0
    }
}
