//! Detector input preparation.
//!
//! YuNet expects a BGR CHW blob in `[0, 255]`, the layout OpenCV's `blobFromImage` produces.
//! The helpers here resize the source image to the detector resolution and return the scale
//! factors that map detections back to source pixels.

use std::borrow::Cow;

use anyhow::Result;
use facelens_utils::config::{InputDimensions, ResizeQuality};
use facelens_utils::telemetry::timing_guard;
use facelens_utils::{compute_resize_scales, resize_image, rgb_to_bgr_chw};
use image::{DynamicImage, GenericImageView, RgbImage, imageops::FilterType};
use tract_onnx::prelude::Tensor;

/// Detector input resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputSize {
    pub width: u32,
    pub height: u32,
}

impl InputSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for InputSize {
    fn default() -> Self {
        Self::new(640, 640)
    }
}

/// Configuration for preparing an image before detection.
#[derive(Debug, Clone, Default)]
pub struct PreprocessConfig {
    pub input_size: InputSize,
    pub resize_quality: ResizeQuality,
}

impl PreprocessConfig {
    fn resize_filter(&self) -> FilterType {
        match self.resize_quality {
            ResizeQuality::Quality => FilterType::Triangle,
            ResizeQuality::Speed => FilterType::Nearest,
        }
    }
}

impl From<InputDimensions> for PreprocessConfig {
    fn from(dimensions: InputDimensions) -> Self {
        PreprocessConfig {
            input_size: InputSize::new(dimensions.width, dimensions.height),
            resize_quality: dimensions.resize_quality,
        }
    }
}

impl From<&InputDimensions> for PreprocessConfig {
    fn from(dimensions: &InputDimensions) -> Self {
        (*dimensions).into()
    }
}

/// Detector-ready tensor plus the metadata needed to rescale detections.
#[derive(Debug)]
pub struct PreprocessOutput {
    /// `[1, 3, H, W]` BGR tensor.
    pub tensor: Tensor,
    /// Source width divided by detector input width.
    pub scale_x: f32,
    /// Source height divided by detector input height.
    pub scale_y: f32,
    pub original_size: (u32, u32),
}

/// Resize `image` to the detector resolution and lay it out as a BGR CHW tensor.
pub fn preprocess_dynamic_image(
    image: &DynamicImage,
    config: &PreprocessConfig,
) -> Result<PreprocessOutput> {
    let _guard = timing_guard("facelens_core::detector_preprocess", log::Level::Trace);
    let input_w = config.input_size.width;
    let input_h = config.input_size.height;
    anyhow::ensure!(
        input_w > 0 && input_h > 0,
        "input dimensions must be greater than zero"
    );

    let (orig_w, orig_h) = image.dimensions();
    anyhow::ensure!(
        orig_w > 0 && orig_h > 0,
        "source image dimensions must be greater than zero"
    );
    let resized_rgb: Cow<'_, RgbImage> = if orig_w == input_w && orig_h == input_h {
        match image.as_rgb8() {
            Some(rgb) => Cow::Borrowed(rgb),
            None => Cow::Owned(image.to_rgb8()),
        }
    } else {
        Cow::Owned(resize_image(
            image,
            input_w,
            input_h,
            config.resize_filter(),
        ))
    };
    let chw = rgb_to_bgr_chw(&resized_rgb);

    let shape = [1usize, 3, input_h as usize, input_w as usize];
    let (data, offset) = chw.into_raw_vec_and_offset();
    debug_assert_eq!(offset, Some(0), "expected contiguous array");
    let tensor = Tensor::from_shape(&shape, &data)
        .map_err(|e| anyhow::anyhow!("failed to build detector tensor: {e}"))?;

    let (scale_x, scale_y) = compute_resize_scales((orig_w, orig_h), (input_w, input_h))?;

    Ok(PreprocessOutput {
        tensor,
        scale_x,
        scale_y,
        original_size: (orig_w, orig_h),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};

    #[test]
    fn preprocess_generates_bgr_tensor() {
        let mut img = ImageBuffer::<Rgb<u8>, _>::new(4, 4);
        for (x, y, pixel) in img.enumerate_pixels_mut() {
            let value = ((x + y) * 32) as u8;
            *pixel = Rgb([value, value / 2, 255]);
        }

        let dynamic = DynamicImage::ImageRgb8(img);
        let config = PreprocessConfig {
            input_size: InputSize::new(2, 2),
            ..Default::default()
        };

        let output =
            preprocess_dynamic_image(&dynamic, &config).expect("preprocess should succeed");

        assert_eq!(output.original_size, (4, 4));
        assert_eq!(output.scale_x, 2.0);
        assert_eq!(output.scale_y, 2.0);
        assert_eq!(output.tensor.shape(), &[1, 3, 2, 2]);

        let data = output.tensor.as_slice::<f32>().unwrap();
        assert!(data.iter().all(|v| *v >= 0.0 && *v <= 255.0));
        // Blue plane comes first and the source blue channel is saturated.
        assert!(data[..4].iter().all(|v| *v == 255.0));
    }

    #[test]
    fn same_size_input_is_not_resampled() {
        let img = ImageBuffer::from_fn(3, 2, |x, y| Rgb([(x * 50) as u8, (y * 70) as u8, 9]));
        let dynamic = DynamicImage::ImageRgb8(img);
        let config = PreprocessConfig {
            input_size: InputSize::new(3, 2),
            ..Default::default()
        };

        let output = preprocess_dynamic_image(&dynamic, &config).expect("preprocess");
        let data = output.tensor.as_slice::<f32>().unwrap();
        // Red plane, pixel (2, 1).
        assert_eq!(data[2 * 6 + 3 + 2], 100.0);
        assert_eq!((output.scale_x, output.scale_y), (1.0, 1.0));
    }

    #[test]
    fn converts_dimensions_into_config() {
        let dims = InputDimensions {
            width: 320,
            height: 240,
            resize_quality: ResizeQuality::Speed,
        };

        let config: PreprocessConfig = (&dims).into();
        assert_eq!(config.input_size, InputSize::new(320, 240));
        assert_eq!(config.resize_quality, ResizeQuality::Speed);
    }

    #[test]
    fn rejects_zero_sized_target() {
        let dynamic = DynamicImage::ImageRgb8(ImageBuffer::new(4, 4));
        let config = PreprocessConfig {
            input_size: InputSize::new(0, 4),
            ..Default::default()
        };
        assert!(preprocess_dynamic_image(&dynamic, &config).is_err());
    }
}
