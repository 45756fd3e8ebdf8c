use crate::detection::{BoundingBox, Detection};
use std::cmp::Ordering;

pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.25;
pub const DEFAULT_IOU_THRESHOLD: f32 = 0.7;
pub const MAX_DETECTIONS: usize = 300;

/// Maps model-input coordinates back to the source image.
#[derive(Debug, Clone, Copy)]
pub struct TransformParams {
    pub orig_width: u32,
    pub orig_height: u32,
    pub scale: f32,
    pub offset_x: f32,
    pub offset_y: f32,
}

impl TransformParams {
    fn to_source(&self, x: f32, y: f32) -> (f32, f32) {
        (
            (x - self.offset_x) / self.scale,
            (y - self.offset_y) / self.scale,
        )
    }
}

#[derive(Debug, Clone)]
pub struct PostProcessor {
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
}

impl Default for PostProcessor {
    fn default() -> Self {
        Self::new(DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_IOU_THRESHOLD)
    }
}

struct Candidate {
    bbox: BoundingBox,
    class_id: usize,
    confidence: f32,
}

impl PostProcessor {
    pub fn new(confidence_threshold: f32, iou_threshold: f32) -> Self {
        Self {
            confidence_threshold,
            iou_threshold,
            max_detections: MAX_DETECTIONS,
        }
    }

    /// Parses a YOLOv8 head output of shape `[1, 4 + C, N]`.
    ///
    /// Rows 0..4 hold `cx, cy, w, h` in model-input pixels, the remaining
    /// rows hold per-class scores. Results are ordered by descending
    /// confidence after per-class NMS.
    #[tracing::instrument(skip_all, fields(shape = ?output.shape()))]
    pub fn parse_detections(
        &self,
        output: &ndarray::ArrayViewD<f32>,
        transform: &TransformParams,
        labels: &[&str],
    ) -> anyhow::Result<Vec<Detection>> {
        let shape = output.shape();
        if shape.len() != 3 || shape[0] != 1 || shape[1] <= 4 {
            anyhow::bail!(
                "Unexpected output shape {:?}, expected [1, 4 + classes, anchors]",
                shape
            );
        }

        let num_classes = shape[1] - 4;
        let num_anchors = shape[2];

        let mut candidates = Vec::new();
        for i in 0..num_anchors {
            let mut best_score = f32::NEG_INFINITY;
            let mut class_id = 0usize;
            for c in 0..num_classes {
                let score = output[[0, 4 + c, i]];
                if score > best_score {
                    best_score = score;
                    class_id = c;
                }
            }

            if best_score.is_nan() || best_score < self.confidence_threshold {
                continue;
            }

            let (x1, y1, x2, y2) = cxcywh_to_xyxy(
                output[[0, 0, i]],
                output[[0, 1, i]],
                output[[0, 2, i]],
                output[[0, 3, i]],
            );
            let (x_min, y_min) = transform.to_source(x1, y1);
            let (x_max, y_max) = transform.to_source(x2, y2);

            let Some(bbox) = BoundingBox::new(x_min, y_min, x_max, y_max)
                .clip(transform.orig_width, transform.orig_height)
            else {
                continue;
            };

            candidates.push(Candidate {
                bbox,
                class_id,
                confidence: best_score,
            });
        }

        let kept = self.non_max_suppression(candidates);

        Ok(kept
            .into_iter()
            .map(|c| {
                let label = labels
                    .get(c.class_id)
                    .map(|l| l.to_string())
                    .unwrap_or_else(|| format!("class_{}", c.class_id));
                Detection::new(c.bbox, label, c.confidence.min(1.0))
            })
            .collect())
    }

    /// Greedy NMS, only suppressing boxes that share a class.
    fn non_max_suppression(&self, mut candidates: Vec<Candidate>) -> Vec<Candidate> {
        candidates.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(Ordering::Equal)
        });

        let mut kept: Vec<Candidate> = Vec::new();
        for candidate in candidates {
            if kept.len() >= self.max_detections {
                break;
            }
            let suppressed = kept.iter().any(|k| {
                k.class_id == candidate.class_id && k.bbox.iou(&candidate.bbox) > self.iou_threshold
            });
            if !suppressed {
                kept.push(candidate);
            }
        }
        kept
    }
}

#[inline]
fn cxcywh_to_xyxy(cx: f32, cy: f32, w: f32, h: f32) -> (f32, f32, f32, f32) {
    (cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0)
}
