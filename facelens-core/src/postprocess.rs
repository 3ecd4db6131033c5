use anyhow::Result;
use facelens_utils::config::DetectionSettings;
use std::cmp::Ordering;
use tract_onnx::prelude::{Tensor, tract_ndarray::ArrayView2};

/// Columns per fused YuNet row: bbox (4) + landmarks (10) + score (1).
pub(crate) const DETECTION_COLS: usize = 15;

/// Detection filtering parameters.
#[derive(Debug, Clone)]
pub struct PostprocessConfig {
    /// Minimum confidence score for a detection to be considered valid.
    pub score_threshold: f32,
    /// IoU above which a lower-scored box is suppressed.
    pub nms_threshold: f32,
    /// The maximum number of candidates kept after sorting by score.
    pub top_k: usize,
}

impl Default for PostprocessConfig {
    fn default() -> Self {
        DetectionSettings::default().into()
    }
}

impl From<DetectionSettings> for PostprocessConfig {
    fn from(settings: DetectionSettings) -> Self {
        PostprocessConfig {
            score_threshold: settings.score_threshold,
            nms_threshold: settings.nms_threshold,
            top_k: settings.top_k,
        }
    }
}

impl From<&DetectionSettings> for PostprocessConfig {
    fn from(settings: &DetectionSettings) -> Self {
        settings.clone().into()
    }
}

/// Axis-aligned bounding box in continuous image coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    /// Left edge.
    pub x: f32,
    /// Top edge.
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    /// `true` when every coordinate is a finite number.
    pub fn is_finite(&self) -> bool {
        [self.x, self.y, self.width, self.height]
            .iter()
            .all(|v| v.is_finite())
    }

    pub fn area(&self) -> f32 {
        (self.width.max(0.0)) * (self.height.max(0.0))
    }

    /// Intersection over union with another box.
    pub fn iou(&self, other: &Self) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.width).min(other.x + other.width);
        let y2 = (self.y + self.height).min(other.y + other.height);

        let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        if intersection <= 0.0 {
            return 0.0;
        }

        let union = self.area() + other.area() - intersection;
        if union <= 0.0 {
            0.0
        } else {
            intersection / union
        }
    }
}

/// A single face detection.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub score: f32,
}

/// Turn fused detector rows into filtered detections in source-image coordinates.
///
/// Rows below `score_threshold`, with non-finite coordinates or with a non-positive extent are
/// dropped, the rest are
/// rescaled, sorted by descending score, cut to `top_k` and passed through non-maximum
/// suppression. The first element of the result is therefore the most confident face.
///
/// # Arguments
///
/// * `output` - A `[N, 15]` or `[1, N, 15]` tensor.
/// * `scale_x` - Source width divided by detector input width.
/// * `scale_y` - Source height divided by detector input height.
/// * `config` - The filtering parameters.
pub fn apply_postprocess(
    output: &Tensor,
    scale_x: f32,
    scale_y: f32,
    config: &PostprocessConfig,
) -> Result<Vec<Detection>> {
    let rows = detection_rows(output)?;

    let mut detections: Vec<Detection> = rows
        .rows()
        .into_iter()
        .filter_map(|row| {
            let score = row[14];
            if !score.is_finite() || score < config.score_threshold {
                return None;
            }
            let bbox = BoundingBox {
                x: row[0] * scale_x,
                y: row[1] * scale_y,
                width: row[2] * scale_x,
                height: row[3] * scale_y,
            };
            if !bbox.is_finite() || bbox.width <= 0.0 || bbox.height <= 0.0 {
                return None;
            }
            Some(Detection { bbox, score })
        })
        .collect();

    detections.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));

    if config.top_k > 0 && detections.len() > config.top_k {
        detections.truncate(config.top_k);
    }

    if config.nms_threshold > 0.0 && detections.len() > 1 {
        detections = non_max_suppression(detections, config.nms_threshold);
    }

    Ok(detections)
}

fn detection_rows(output: &Tensor) -> Result<ArrayView2<'_, f32>> {
    let rows = match output.shape() {
        [rows, DETECTION_COLS] => *rows,
        [1, rows, DETECTION_COLS] => *rows,
        other => anyhow::bail!(
            "detector output must have shape [N, 15] or [1, N, 15] (got {:?})",
            other
        ),
    };

    let slice = output
        .as_slice::<f32>()
        .map_err(|e| anyhow::anyhow!("detector output is not f32: {e}"))?;

    ArrayView2::from_shape((rows, DETECTION_COLS), slice)
        .map_err(|_| anyhow::anyhow!("detector output data is not contiguous"))
}

/// Greedy NMS over score-sorted detections.
fn non_max_suppression(detections: Vec<Detection>, threshold: f32) -> Vec<Detection> {
    let mut kept: Vec<Detection> = Vec::with_capacity(detections.len());
    for detection in detections {
        if kept
            .iter()
            .all(|existing| detection.bbox.iou(&existing.bbox) <= threshold)
        {
            kept.push(detection);
        }
    }
    kept
}
