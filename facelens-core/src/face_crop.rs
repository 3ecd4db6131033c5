//! Face crop extraction and classifier input preparation.
//!
//! The detector reports a continuous box; [`FaceBox`] truncates it to integer corners once, and
//! every later stage (crop, response) uses those integers. Crops are taken exactly as
//! requested: pixels outside the source image are black.

use anyhow::Result;
use facelens_utils::{rgb_to_normalized_chw, timing_guard};
use image::{
    RgbImage,
    imageops::{self, FilterType},
};
use tract_onnx::prelude::Tensor;

use crate::postprocess::BoundingBox;

/// Side length of the square classifier input.
pub const FACE_INPUT_SIZE: u32 = 224;
/// Per-channel (R, G, B) mean applied after scaling pixels to `[0, 1]`.
pub const CHANNEL_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// Per-channel (R, G, B) standard deviation.
pub const CHANNEL_STD: [f32; 3] = [0.229, 0.224, 0.225];
/// Largest accepted crop side, as a multiple of the matching image side.
pub const MAX_CROP_SCALE: u32 = 4;

/// Integer face rectangle `[x1, x2) × [y1, y2)` in source pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FaceBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl FaceBox {
    /// Convert a detector box by truncating each corner toward zero.
    ///
    /// Truncation happens on the corners, not on width/height, so `width()` equals
    /// `trunc(x + w) - trunc(x)`.
    pub fn from_bbox(bbox: &BoundingBox) -> Self {
        Self {
            x1: bbox.x as i32,
            y1: bbox.y as i32,
            x2: (bbox.x + bbox.width) as i32,
            y2: (bbox.y + bbox.height) as i32,
        }
    }

    pub fn width(&self) -> i32 {
        self.x2.saturating_sub(self.x1)
    }

    pub fn height(&self) -> i32 {
        self.y2.saturating_sub(self.y1)
    }

    /// `true` when the box covers no pixels.
    pub fn is_empty(&self) -> bool {
        self.width() <= 0 || self.height() <= 0
    }
}

/// Copy the `face` rectangle out of `image`.
///
/// The crop always has the box's exact size. Regions of the box that fall outside the image
/// stay black; the box itself is never clamped or shifted. Returns `Ok(None)` for an empty box
/// and an error when either side exceeds [`MAX_CROP_SCALE`] times the image side.
pub fn crop_face(image: &RgbImage, face: &FaceBox) -> Result<Option<RgbImage>> {
    if face.is_empty() {
        return Ok(None);
    }
    let (img_w, img_h) = image.dimensions();
    let (crop_w, crop_h) = (face.width() as u64, face.height() as u64);
    anyhow::ensure!(
        crop_w <= u64::from(img_w) * u64::from(MAX_CROP_SCALE)
            && crop_h <= u64::from(img_h) * u64::from(MAX_CROP_SCALE),
        "face box {face:?} is out of proportion to the {img_w}x{img_h} image"
    );
    let mut canvas = RgbImage::new(crop_w as u32, crop_h as u32);

    let src_x1 = face.x1.max(0);
    let src_y1 = face.y1.max(0);
    let src_x2 = face.x2.min(img_w.min(i32::MAX as u32) as i32);
    let src_y2 = face.y2.min(img_h.min(i32::MAX as u32) as i32);

    if src_x2 > src_x1 && src_y2 > src_y1 {
        let visible = imageops::crop_imm(
            image,
            src_x1 as u32,
            src_y1 as u32,
            (src_x2 - src_x1) as u32,
            (src_y2 - src_y1) as u32,
        )
        .to_image();
        imageops::replace(
            &mut canvas,
            &visible,
            i64::from(src_x1) - i64::from(face.x1),
            i64::from(src_y1) - i64::from(face.y1),
        );
    }

    Ok(Some(canvas))
}

/// Build the `[1, 3, 224, 224]` classifier input for `face`.
///
/// The crop is stretched to 224×224 with a bilinear filter, scaled to `[0, 1]` and normalized
/// with [`CHANNEL_MEAN`] / [`CHANNEL_STD`]. Returns `Ok(None)` for an empty box.
pub fn face_tensor(image: &RgbImage, face: &FaceBox) -> Result<Option<Tensor>> {
    let _guard = timing_guard("facelens_core::face_tensor", log::Level::Trace);
    let Some(crop) = crop_face(image, face)? else {
        return Ok(None);
    };
    let resized = imageops::resize(&crop, FACE_INPUT_SIZE, FACE_INPUT_SIZE, FilterType::Triangle);
    let chw = rgb_to_normalized_chw(&resized, CHANNEL_MEAN, CHANNEL_STD);

    let side = FACE_INPUT_SIZE as usize;
    let (data, offset) = chw.into_raw_vec_and_offset();
    debug_assert_eq!(offset, Some(0), "expected contiguous array");
    let tensor = Tensor::from_shape(&[1, 3, side, side], &data)
        .map_err(|e| anyhow::anyhow!("failed to build classifier tensor: {e}"))?;
    Ok(Some(tensor))
}
