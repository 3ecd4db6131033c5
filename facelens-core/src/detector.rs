//! Face location.
//!
//! [`FaceLocator`] is the seam the pipeline depends on; [`YuNetDetector`] implements it with
//! the YuNet ONNX graph.

use std::path::Path;

use anyhow::Result;
use image::DynamicImage;
use log::trace;
use tract_onnx::prelude::Tensor;

use crate::device::ComputeDevice;
use crate::model::OnnxModel;
use crate::postprocess::{
    BoundingBox, DETECTION_COLS, Detection, PostprocessConfig, apply_postprocess,
};
use crate::preprocess::{InputSize, PreprocessConfig, preprocess_dynamic_image};
use facelens_utils::timing_guard;

const STRIDES: [usize; 3] = [8, 16, 32];
const OUTPUTS_PER_STRIDE: usize = 4; // cls, obj, bbox, kps

/// Finds the primary face in an image.
pub trait FaceLocator: Send + Sync + std::fmt::Debug {
    /// Return the first face the detector reports, in source-image coordinates, or `None`.
    fn locate(&self, image: &DynamicImage) -> Result<Option<BoundingBox>>;
}

/// YuNet model coupled with its pre- and post-processing settings.
#[derive(Debug)]
pub struct YuNetDetector {
    model: OnnxModel,
    preprocess: PreprocessConfig,
    postprocess: PostprocessConfig,
}

impl YuNetDetector {
    /// Load the detector graph.
    ///
    /// # Arguments
    ///
    /// * `model_path` - The path to the YuNet ONNX file.
    /// * `preprocess` - Detector input resolution and resize filter.
    /// * `postprocess` - Score, NMS and top-k filtering.
    /// * `device` - The compute device resolved at startup.
    pub fn new<P: AsRef<Path>>(
        model_path: P,
        preprocess: PreprocessConfig,
        postprocess: PostprocessConfig,
        device: ComputeDevice,
    ) -> Result<Self> {
        // YuNet exports carry their own input shape; it is not pinned here.
        let model = OnnxModel::load(model_path, "YuNet", None, device)?;
        Ok(Self {
            model,
            preprocess,
            postprocess,
        })
    }

    /// Run detection on an in-memory image.
    ///
    /// Detections are in source-image coordinates, sorted by descending score.
    pub fn detect_image(&self, image: &DynamicImage) -> Result<Vec<Detection>> {
        let _guard = timing_guard("facelens_core::detect_image", log::Level::Debug);
        let prep = preprocess_dynamic_image(image, &self.preprocess)?;

        let raw = {
            let _guard = timing_guard("facelens_core::detector_inference", log::Level::Debug);
            let outputs = self.model.run(prep.tensor)?;
            fuse_outputs(outputs, self.preprocess.input_size)?
        };

        let detections = apply_postprocess(&raw, prep.scale_x, prep.scale_y, &self.postprocess)?;
        trace!("YuNet kept {} detection(s)", detections.len());

        Ok(detections)
    }

    pub fn postprocess_config(&self) -> &PostprocessConfig {
        &self.postprocess
    }

    pub fn preprocess_config(&self) -> &PreprocessConfig {
        &self.preprocess
    }
}

impl FaceLocator for YuNetDetector {
    fn locate(&self, image: &DynamicImage) -> Result<Option<BoundingBox>> {
        let detections = self.detect_image(image)?;
        Ok(detections.first().map(|detection| detection.bbox))
    }
}

/// Normalize the graph outputs into a single `[N, 15]` tensor.
///
/// Newer YuNet exports already emit the fused tensor; older ones emit twelve per-stride heads
/// that have to be decoded against the anchor grid.
fn fuse_outputs(mut outputs: Vec<Tensor>, input_size: InputSize) -> Result<Tensor> {
    match outputs.len() {
        0 => anyhow::bail!("YuNet model produced no outputs"),
        1 => outputs
            .pop()
            .ok_or_else(|| anyhow::anyhow!("YuNet model produced no outputs")),
        len if len == STRIDES.len() * OUTPUTS_PER_STRIDE => {
            decode_yunet_outputs(&outputs, input_size)
        }
        other => anyhow::bail!(
            "unexpected number of YuNet outputs: expected 1 or {}, got {}",
            STRIDES.len() * OUTPUTS_PER_STRIDE,
            other
        ),
    }
}

/// Decode per-stride YuNet heads into fused rows.
///
/// Head order is `cls[8,16,32]`, `obj[8,16,32]`, `bbox[8,16,32]`, `kps[8,16,32]`. Each output
/// row is `[x, y, w, h, 5 × (lx, ly), score]` in detector input coordinates with
/// `score = sqrt(cls * obj)`.
pub(crate) fn decode_yunet_outputs(outputs: &[Tensor], input_size: InputSize) -> Result<Tensor> {
    anyhow::ensure!(
        outputs.len() == STRIDES.len() * OUTPUTS_PER_STRIDE,
        "YuNet decode expects {} tensors, got {}",
        STRIDES.len() * OUTPUTS_PER_STRIDE,
        outputs.len()
    );

    let pad_w = (input_size.width as usize).div_ceil(32) * 32;
    let pad_h = (input_size.height as usize).div_ceil(32) * 32;
    let total_cells: usize = STRIDES
        .iter()
        .map(|stride| (pad_w / stride) * (pad_h / stride))
        .sum();
    let mut fused = Vec::with_capacity(total_cells * DETECTION_COLS);

    for (stride_index, &stride) in STRIDES.iter().enumerate() {
        let cols = pad_w / stride;
        let rows = pad_h / stride;
        let cell_count = rows * cols;
        let stride_f = stride as f32;

        let head = |kind: usize, name: &'static str, per_cell: usize| {
            head_slice(
                &outputs[stride_index + STRIDES.len() * kind],
                name,
                stride,
                cell_count * per_cell,
            )
        };
        let cls = head(0, "cls", 1)?;
        let obj = head(1, "obj", 1)?;
        let bbox = head(2, "bbox", 4)?;
        let kps = head(3, "kps", 10)?;

        for row in 0..rows {
            for col in 0..cols {
                let idx = row * cols + col;
                let score = (cls[idx].clamp(0.0, 1.0) * obj[idx].clamp(0.0, 1.0)).sqrt();
                let score = if score.is_finite() { score } else { 0.0 };

                let [dx, dy, dw, dh] = [
                    bbox[idx * 4],
                    bbox[idx * 4 + 1],
                    bbox[idx * 4 + 2],
                    bbox[idx * 4 + 3],
                ];
                let cx = (col as f32 + dx) * stride_f;
                let cy = (row as f32 + dy) * stride_f;
                let w = dw.exp() * stride_f;
                let h = dh.exp() * stride_f;
                fused.extend_from_slice(&[cx - 0.5 * w, cy - 0.5 * h, w, h]);

                for lm in 0..5 {
                    let kx = kps[idx * 10 + lm * 2];
                    let ky = kps[idx * 10 + lm * 2 + 1];
                    fused.push((kx + col as f32) * stride_f);
                    fused.push((ky + row as f32) * stride_f);
                }

                fused.push(score);
            }
        }
    }

    let rows = fused.len() / DETECTION_COLS;
    Tensor::from_shape(&[rows, DETECTION_COLS], &fused)
        .map_err(|e| anyhow::anyhow!("failed to build fused YuNet tensor: {e}"))
}

fn head_slice<'a>(
    tensor: &'a Tensor,
    name: &str,
    stride: usize,
    expected: usize,
) -> Result<&'a [f32]> {
    let slice = tensor
        .as_slice::<f32>()
        .map_err(|e| anyhow::anyhow!("{name} output not f32: {e}"))?;
    anyhow::ensure!(
        slice.len() == expected,
        "{name} length mismatch at stride {stride}: expected {expected}, got {}",
        slice.len()
    );
    Ok(slice)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zero_heads(input_size: InputSize) -> Vec<Tensor> {
        let pad_w = (input_size.width as usize).div_ceil(32) * 32;
        let pad_h = (input_size.height as usize).div_ceil(32) * 32;
        let mut heads = Vec::new();
        for per_cell in [1usize, 1, 4, 10] {
            for stride in STRIDES {
                let cells = (pad_w / stride) * (pad_h / stride);
                heads.push(
                    Tensor::from_shape(&[cells, per_cell], &vec![0.0f32; cells * per_cell])
                        .unwrap(),
                );
            }
        }
        heads
    }

    #[test]
    fn decodes_anchor_grid() {
        let input_size = InputSize::new(32, 32);
        let mut heads = zero_heads(input_size);
        // Stride 8 grid is 4x4; light up cell (row 1, col 2).
        let idx = 4 + 2;
        let mut cls = vec![0.0f32; 16];
        let mut obj = vec![0.0f32; 16];
        cls[idx] = 0.81;
        obj[idx] = 1.0;
        heads[0] = Tensor::from_shape(&[16, 1], &cls).unwrap();
        heads[3] = Tensor::from_shape(&[16, 1], &obj).unwrap();

        let fused = decode_yunet_outputs(&heads, input_size).expect("decode");
        // 16 + 4 + 1 cells across the three strides.
        assert_eq!(fused.shape(), &[21, DETECTION_COLS]);

        let data = fused.as_slice::<f32>().unwrap();
        let row = &data[idx * DETECTION_COLS..(idx + 1) * DETECTION_COLS];
        // Zero deltas: an 8x8 box centred on the cell's top-left anchor.
        assert_eq!(&row[..4], &[12.0, 4.0, 8.0, 8.0]);
        assert_eq!(&row[4..6], &[16.0, 8.0]);
        assert!((row[14] - 0.9).abs() < 1e-6);

        let untouched = &data[..DETECTION_COLS];
        assert_eq!(untouched[14], 0.0);
    }

    #[test]
    fn rejects_wrong_head_count() {
        let heads = zero_heads(InputSize::new(32, 32));
        assert!(decode_yunet_outputs(&heads[..11], InputSize::new(32, 32)).is_err());
        assert!(fuse_outputs(Vec::new(), InputSize::new(32, 32)).is_err());
        assert!(fuse_outputs(heads[..5].to_vec(), InputSize::new(32, 32)).is_err());
    }

    #[test]
    fn rejects_mismatched_head_length() {
        let input_size = InputSize::new(32, 32);
        let mut heads = zero_heads(input_size);
        heads[6] = Tensor::from_shape(&[3], &[0.0f32; 3]).unwrap();
        let err = decode_yunet_outputs(&heads, input_size).expect_err("should fail");
        assert!(format!("{err}").contains("bbox length mismatch"));
    }

    #[test]
    fn fused_output_passes_through() {
        let fused = Tensor::from_shape(&[1, DETECTION_COLS], &[0.5f32; DETECTION_COLS]).unwrap();
        let out = fuse_outputs(vec![fused.clone()], InputSize::default()).expect("fuse");
        assert_eq!(out, fused);
    }

    #[test]
    fn missing_model_fails_to_load() {
        let result = YuNetDetector::new(
            "missing.onnx",
            PreprocessConfig::default(),
            PostprocessConfig::default(),
            ComputeDevice::Cpu,
        );
        assert!(result.is_err());
    }
}
