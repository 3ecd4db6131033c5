//! Core age/gender inference primitives.
//!
//! This crate loads the YuNet face detector and the ResNet age/gender classifier with
//! `tract-onnx`, and chains them into an [`InferencePipeline`] that turns encoded image bytes into
//! a [`Prediction`].

/// Age/gender classifier and argmax helpers.
pub mod classifier;
/// High-level face detection runner.
pub mod detector;
/// Compute device selection.
pub mod device;
/// Prediction error taxonomy.
pub mod error;
/// Face crop extraction and normalization.
pub mod face_crop;
/// Class index to label mapping.
pub mod labels;
/// ONNX model loading and execution.
pub mod model;
/// End-to-end prediction pipeline.
pub mod pipeline;
/// Detection post-processing (NMS, score filtering).
pub mod postprocess;
/// Image pre-processing (resizing, tensor conversion).
pub mod preprocess;

pub use classifier::{AgeGenderClassifier, ClassifierLogits, ResNetClassifier, argmax};
pub use detector::{FaceLocator, YuNetDetector};
pub use device::ComputeDevice;
pub use error::PredictError;
pub use face_crop::{
    CHANNEL_MEAN, CHANNEL_STD, FACE_INPUT_SIZE, FaceBox, MAX_CROP_SCALE, crop_face, face_tensor,
};
pub use labels::{AgeRange, Gender, NUM_AGE_CLASSES, class_to_age_range};
pub use model::OnnxModel;
pub use pipeline::{BoxPayload, InferencePipeline, Prediction};
pub use postprocess::{BoundingBox, Detection, PostprocessConfig, apply_postprocess};
pub use preprocess::{InputSize, PreprocessConfig, PreprocessOutput, preprocess_dynamic_image};
pub use tract_onnx::prelude::Tensor;

/// Returns the crate version for diagnostics.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
