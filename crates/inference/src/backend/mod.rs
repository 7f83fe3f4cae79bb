use bridge::Detection;
use image::RgbImage;
use std::time::Duration;
use thiserror::Error;

#[cfg(feature = "ort-backend")]
pub mod ort;

/// Failure classes a worker must tell apart.
///
/// `Decode` and `Fault` fail one frame; the rest also take the worker down.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("Failed to decode frame: {0}")]
    Decode(String),

    #[error("Inference failed: {0}")]
    Fault(String),

    #[error("Inference resources exhausted: {0}")]
    ResourceExhausted(String),

    #[error("Inference timed out after {0:?}")]
    Timeout(Duration),

    #[error("Inference engine stopped: {0}")]
    Crashed(String),
}

impl EngineError {
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Decode(_) => "decode",
            EngineError::Fault(_) => "fault",
            EngineError::ResourceExhausted(_) => "resource_exhausted",
            EngineError::Timeout(_) => "timeout",
            EngineError::Crashed(_) => "crashed",
        }
    }

    /// Whether the worker that hit this error must stop after reporting it.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EngineError::ResourceExhausted(_) | EngineError::Timeout(_) | EngineError::Crashed(_)
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InferenceOutput {
    pub detections: Vec<Detection>,
    /// Time spent inside the model, excluding decode.
    pub elapsed_ms: f64,
}

/// Object-detection model wrapper.
///
/// Engines are not shared: each worker owns one and calls it from a single
/// thread.
pub trait InferenceEngine: Send + 'static {
    fn infer(
        &mut self,
        image: &RgbImage,
        confidence_threshold: f32,
    ) -> Result<InferenceOutput, EngineError>;
}

/// Decode an encoded JPEG/PNG payload into RGB pixels.
pub fn decode_frame(payload: &[u8]) -> Result<RgbImage, EngineError> {
    if payload.is_empty() {
        return Err(EngineError::Decode("empty payload".to_string()));
    }
    let image =
        image::load_from_memory(payload).map_err(|e| EngineError::Decode(e.to_string()))?;
    Ok(image.to_rgb8())
}
