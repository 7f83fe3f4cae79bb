use super::{EngineError, InferenceEngine, InferenceOutput};
use crate::config::{ExecutionProvider, ModelConfig};
use crate::labels::Labels;
use crate::processing::{PostProcessor, PreProcessor};
use image::RgbImage;
use ort::{
    session::{Session, builder::GraphOptimizationLevel},
    value::TensorRef,
};
use std::time::Instant;

/// YOLO detector running on ONNX Runtime.
pub struct OrtBackend {
    session: Session,
    preprocessor: PreProcessor,
    postprocessor: PostProcessor,
}

impl OrtBackend {
    pub fn load(config: &ModelConfig) -> anyhow::Result<Self> {
        // Initialize ORT environment (idempotent)
        let _ = ort::init().commit();

        let mut builder = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(config.intra_threads)?;

        match config.execution_provider {
            ExecutionProvider::Cuda => {
                tracing::info!("Initializing ONNX Runtime with CUDA execution provider");
                builder = builder.with_execution_providers([
                    ort::execution_providers::CUDAExecutionProvider::default()
                        .with_device_id(0)
                        .build()
                        .error_on_failure(),
                ])?;
            }
            ExecutionProvider::Cpu => {
                tracing::info!("Initializing ONNX Runtime with CPU execution provider");
            }
        }

        let session = builder.commit_from_file(&config.path)?;

        let labels = match &config.labels_path {
            Some(path) => Labels::from_file(path)?,
            None => Labels::default(),
        };

        tracing::info!(path = %config.path, input_size = config.input_size, "Model loaded");
        Ok(Self {
            session,
            preprocessor: PreProcessor::new(config.input_size),
            postprocessor: PostProcessor::new(config.iou_threshold, labels),
        })
    }
}

impl InferenceEngine for OrtBackend {
    fn infer(
        &mut self,
        image: &RgbImage,
        confidence_threshold: f32,
    ) -> Result<InferenceOutput, EngineError> {
        let start = Instant::now();

        let (input, transform) = self
            .preprocessor
            .preprocess(image)
            .map_err(|e| EngineError::Fault(e.to_string()))?;

        let tensor = TensorRef::from_array_view(input.view()).map_err(classify)?;
        let outputs = self
            .session
            .run(ort::inputs!["images" => tensor])
            .map_err(classify)?;
        let output = outputs["output0"]
            .try_extract_array::<f32>()
            .map_err(classify)?;

        let detections = self
            .postprocessor
            .parse_detections(&output, &transform, confidence_threshold)
            .map_err(|e| EngineError::Fault(e.to_string()))?;

        Ok(InferenceOutput {
            detections,
            elapsed_ms: start.elapsed().as_secs_f64() * 1000.0,
        })
    }
}

/// Allocation failures mean the device is out of memory; anything else is
/// a per-frame fault.
fn classify(err: ort::Error) -> EngineError {
    let message = err.to_string();
    let lowered = message.to_lowercase();
    if lowered.contains("out of memory") || lowered.contains("failed to allocate") {
        EngineError::ResourceExhausted(message)
    } else {
        EngineError::Fault(message)
    }
}
