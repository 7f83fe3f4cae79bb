use crate::labels::Labels;
use bridge::Detection;
use ndarray::ArrayViewD;

/// Mapping from model-input space back to the original frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformParams {
    pub orig_width: u32,
    pub orig_height: u32,
    pub scale: f32,
    pub offset_x: f32,
    pub offset_y: f32,
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    class_id: usize,
    confidence: f32,
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
}

impl Candidate {
    fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }

    fn intersection(&self, other: &Candidate) -> f32 {
        let w = (self.x2.min(other.x2) - self.x1.max(other.x1)).max(0.0);
        let h = (self.y2.min(other.y2) - self.y1.max(other.y1)).max(0.0);
        w * h
    }

    fn iou(&self, other: &Candidate) -> f32 {
        let intersection = self.intersection(other);
        let union = self.area() + other.area() - intersection;
        if union <= 0.0 { 0.0 } else { intersection / union }
    }
}

/// Turns raw YOLO output into client-facing detections.
pub struct PostProcessor {
    pub iou_threshold: f32,
    labels: Labels,
}

impl PostProcessor {
    pub fn new(iou_threshold: f32, labels: Labels) -> Self {
        Self {
            iou_threshold,
            labels,
        }
    }

    /// Parse a `[1, 4 + classes, anchors]` output whose boxes are
    /// centre/size in model-input pixels.
    #[tracing::instrument(level = "trace", skip_all)]
    pub fn parse_detections(
        &self,
        output: &ArrayViewD<f32>,
        transform: &TransformParams,
        confidence_threshold: f32,
    ) -> anyhow::Result<Vec<Detection>> {
        let shape = output.shape();
        if shape.len() != 3 || shape[0] != 1 || shape[1] <= 4 {
            anyhow::bail!("Unexpected model output shape {:?}", shape);
        }
        let num_classes = shape[1] - 4;
        let num_anchors = shape[2];

        let mut candidates = Vec::new();
        for i in 0..num_anchors {
            let mut class_id = 0usize;
            let mut confidence = f32::NEG_INFINITY;
            for c in 0..num_classes {
                let score = output[[0, 4 + c, i]];
                if score > confidence {
                    confidence = score;
                    class_id = c;
                }
            }

            if confidence < confidence_threshold {
                continue;
            }

            let cx = output[[0, 0, i]];
            let cy = output[[0, 1, i]];
            let w = output[[0, 2, i]];
            let h = output[[0, 3, i]];

            candidates.push(Candidate {
                class_id,
                confidence,
                x1: self.unletterbox_x(cx - w / 2.0, transform),
                y1: self.unletterbox_y(cy - h / 2.0, transform),
                x2: self.unletterbox_x(cx + w / 2.0, transform),
                y2: self.unletterbox_y(cy + h / 2.0, transform),
            });
        }

        let kept = non_max_suppression(candidates, self.iou_threshold);

        Ok(kept
            .into_iter()
            .map(|c| Detection {
                x: c.x1.round() as i32,
                y: c.y1.round() as i32,
                width: (c.x2 - c.x1).round() as i32,
                height: (c.y2 - c.y1).round() as i32,
                label: self.labels.name(c.class_id),
                class_id: c.class_id as u32,
                confidence: (c.confidence.clamp(0.0, 1.0) * 1000.0).round() / 1000.0,
            })
            .collect())
    }

    fn unletterbox_x(&self, x: f32, transform: &TransformParams) -> f32 {
        ((x - transform.offset_x) / transform.scale).clamp(0.0, transform.orig_width as f32)
    }

    fn unletterbox_y(&self, y: f32, transform: &TransformParams) -> f32 {
        ((y - transform.offset_y) / transform.scale).clamp(0.0, transform.orig_height as f32)
    }
}

/// Greedy per-class suppression, highest confidence first.
fn non_max_suppression(mut candidates: Vec<Candidate>, iou_threshold: f32) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<Candidate> = Vec::new();
    for candidate in candidates {
        let suppressed = kept
            .iter()
            .any(|k| k.class_id == candidate.class_id && k.iou(&candidate) > iou_threshold);
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}
