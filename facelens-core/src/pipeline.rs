//! End-to-end prediction: decode, locate, crop, classify, format.

use std::borrow::Cow;

use anyhow::{Context, anyhow};
use facelens_utils::{config::AppSettings, decode_rgb_image, timing_guard};
use image::{DynamicImage, RgbImage};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::classifier::{AgeGenderClassifier, ClassifierLogits, ResNetClassifier};
use crate::detector::{FaceLocator, YuNetDetector};
use crate::device::ComputeDevice;
use crate::error::PredictError;
use crate::face_crop::{FaceBox, face_tensor};
use crate::labels::{AgeRange, Gender};

/// Face rectangle as reported to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoxPayload {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl From<FaceBox> for BoxPayload {
    fn from(face: FaceBox) -> Self {
        Self {
            x: face.x1,
            y: face.y1,
            w: face.width(),
            h: face.height(),
        }
    }
}

/// Successful prediction for one image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prediction {
    pub gender: Gender,
    pub age_range: String,
    #[serde(rename = "box")]
    pub face_box: BoxPayload,
}

impl Prediction {
    /// Label the classifier scores for `face`.
    pub fn from_logits(face: FaceBox, logits: &ClassifierLogits) -> Result<Self, PredictError> {
        let gender = logits
            .gender_class()
            .and_then(Gender::from_class)
            .ok_or_else(|| anyhow!("gender logits have no usable maximum: {:?}", logits.gender))?;
        let age = logits
            .age_class()
            .and_then(AgeRange::from_class)
            .ok_or_else(|| anyhow!("age logits have no usable maximum: {:?}", logits.age))?;

        Ok(Self {
            gender,
            age_range: age.to_string(),
            face_box: face.into(),
        })
    }
}

/// The loaded models plus the glue between them.
///
/// Built once at startup and shared read-only; every method takes `&self`.
#[derive(Debug)]
pub struct InferencePipeline {
    locator: Box<dyn FaceLocator>,
    classifier: Box<dyn AgeGenderClassifier>,
}

impl InferencePipeline {
    pub fn new(locator: Box<dyn FaceLocator>, classifier: Box<dyn AgeGenderClassifier>) -> Self {
        Self {
            locator,
            classifier,
        }
    }

    /// Load both models described by `settings` on the configured device.
    pub fn from_settings(settings: &AppSettings) -> anyhow::Result<Self> {
        let device = ComputeDevice::resolve(settings.device);
        let detector = YuNetDetector::new(
            &settings.models.detector_path,
            (&settings.input).into(),
            (&settings.detection).into(),
            device,
        )
        .with_context(|| {
            format!(
                "failed to load face detector from {}",
                settings.models.detector_path.display()
            )
        })?;
        let classifier = ResNetClassifier::load(&settings.models.classifier_path, device)
            .with_context(|| {
                format!(
                    "failed to load classifier from {}",
                    settings.models.classifier_path.display()
                )
            })?;
        Ok(Self::new(Box::new(detector), Box::new(classifier)))
    }

    /// Run the full pipeline on an encoded image.
    pub fn predict_bytes(&self, bytes: &[u8]) -> Result<Prediction, PredictError> {
        let image = decode_rgb_image(bytes).map_err(|err| {
            debug!("Rejecting upload of {} bytes: {err:#}", bytes.len());
            PredictError::InvalidImage
        })?;
        self.predict_image(&image)
    }

    /// Run the pipeline on an already decoded image.
    pub fn predict_image(&self, image: &DynamicImage) -> Result<Prediction, PredictError> {
        let _guard = timing_guard("facelens_core::predict", log::Level::Debug);
        let rgb: Cow<'_, RgbImage> = match image.as_rgb8() {
            Some(rgb) => Cow::Borrowed(rgb),
            None => Cow::Owned(image.to_rgb8()),
        };

        let bbox = self.locator.locate(image)?.ok_or(PredictError::NoFace)?;
        let face = FaceBox::from_bbox(&bbox);
        let Some(input) = face_tensor(&rgb, &face)? else {
            debug!("Detector box {bbox:?} truncates to an empty rectangle");
            return Err(PredictError::NoFace);
        };

        let logits = self.classifier.classify(input)?;
        Prediction::from_logits(face, &logits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::NUM_AGE_CLASSES;
    use crate::postprocess::BoundingBox;
    use image::{ImageFormat, Rgb};
    use std::io::Cursor;
    use std::sync::Mutex;
    use tract_onnx::prelude::Tensor;

    #[derive(Debug)]
    struct FixedLocator(Option<BoundingBox>);

    impl FaceLocator for FixedLocator {
        fn locate(&self, _image: &DynamicImage) -> anyhow::Result<Option<BoundingBox>> {
            Ok(self.0)
        }
    }

    #[derive(Debug)]
    struct FailingLocator;

    impl FaceLocator for FailingLocator {
        fn locate(&self, _image: &DynamicImage) -> anyhow::Result<Option<BoundingBox>> {
            anyhow::bail!("detector exploded")
        }
    }

    #[derive(Debug, Default)]
    struct RecordingClassifier {
        shapes: Mutex<Vec<Vec<usize>>>,
    }

    impl AgeGenderClassifier for RecordingClassifier {
        fn classify(&self, input: Tensor) -> anyhow::Result<ClassifierLogits> {
            self.shapes.lock().unwrap().push(input.shape().to_vec());
            let mut age = vec![0.0; NUM_AGE_CLASSES];
            age[10] = 3.0;
            Ok(ClassifierLogits {
                gender: vec![0.1, 0.9],
                age,
            })
        }
    }

    fn pipeline(locator: impl FaceLocator + 'static) -> InferencePipeline {
        InferencePipeline::new(Box::new(locator), Box::new(RecordingClassifier::default()))
    }

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let image = RgbImage::from_fn(width, height, |x, y| Rgb([x as u8, y as u8, 64]));
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(image)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn bbox(x: f32, y: f32, width: f32, height: f32) -> BoundingBox {
        BoundingBox {
            x,
            y,
            width,
            height,
        }
    }

    #[test]
    fn corrupt_and_empty_uploads_are_invalid_images() {
        let pipeline = pipeline(FixedLocator(Some(bbox(0.0, 0.0, 4.0, 4.0))));
        assert!(matches!(
            pipeline.predict_bytes(b"definitely not an image"),
            Err(PredictError::InvalidImage)
        ));
        assert!(matches!(
            pipeline.predict_bytes(&[]),
            Err(PredictError::InvalidImage)
        ));
    }

    #[test]
    fn no_detection_is_no_face() {
        let pipeline = pipeline(FixedLocator(None));
        let err = pipeline.predict_bytes(&png_bytes(16, 16)).unwrap_err();
        assert!(matches!(err, PredictError::NoFace));
        assert_eq!(err.to_string(), "No face detected");
    }

    #[test]
    fn empty_box_is_no_face() {
        let pipeline = pipeline(FixedLocator(Some(bbox(3.2, 3.2, 0.6, 8.0))));
        assert!(matches!(
            pipeline.predict_bytes(&png_bytes(16, 16)),
            Err(PredictError::NoFace)
        ));
    }

    #[test]
    fn prediction_reports_truncated_box() {
        let classifier = std::sync::Arc::new(RecordingClassifier::default());
        #[derive(Debug)]
        struct Shared(std::sync::Arc<RecordingClassifier>);
        impl AgeGenderClassifier for Shared {
            fn classify(&self, input: Tensor) -> anyhow::Result<ClassifierLogits> {
                self.0.classify(input)
            }
        }

        let pipeline = InferencePipeline::new(
            Box::new(FixedLocator(Some(bbox(10.7, 5.2, 20.9, 30.1)))),
            Box::new(Shared(classifier.clone())),
        );
        let prediction = pipeline.predict_bytes(&png_bytes(64, 48)).expect("prediction");

        assert_eq!(prediction.gender, Gender::Female);
        assert_eq!(prediction.age_range, "50-54");
        assert_eq!(
            prediction.face_box,
            BoxPayload {
                x: 10,
                y: 5,
                w: 21,
                h: 30
            }
        );
        assert_eq!(
            classifier.shapes.lock().unwrap().as_slice(),
            &[vec![1, 3, 224, 224]]
        );
    }

    #[test]
    fn box_partly_outside_image_is_kept_as_reported() {
        let pipeline = pipeline(FixedLocator(Some(bbox(-4.5, 10.0, 30.0, 30.0))));
        let prediction = pipeline.predict_bytes(&png_bytes(20, 20)).expect("prediction");
        assert_eq!(
            prediction.face_box,
            BoxPayload {
                x: -4,
                y: 10,
                w: 29,
                h: 30
            }
        );
    }

    #[test]
    fn identical_input_gives_identical_output() {
        let pipeline = pipeline(FixedLocator(Some(bbox(2.0, 2.0, 10.0, 12.0))));
        let bytes = png_bytes(32, 32);
        let first = pipeline.predict_bytes(&bytes).unwrap();
        let second = pipeline.predict_bytes(&bytes).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn unbounded_box_is_an_inference_error() {
        let pipeline = pipeline(FixedLocator(Some(bbox(
            f32::NEG_INFINITY,
            0.0,
            f32::INFINITY,
            10.0,
        ))));
        let err = pipeline.predict_bytes(&png_bytes(32, 32)).unwrap_err();
        assert!(matches!(err, PredictError::Inference(_)));
    }

    #[test]
    fn locator_failure_is_an_inference_error() {
        let pipeline = pipeline(FailingLocator);
        let err = pipeline.predict_bytes(&png_bytes(8, 8)).unwrap_err();
        assert!(!err.is_client_error());
        assert!(format!("{err}").contains("detector exploded"));
    }

    #[test]
    fn serializes_with_box_key() {
        let prediction = Prediction {
            gender: Gender::Male,
            age_range: "95+".to_string(),
            face_box: BoxPayload {
                x: 1,
                y: 2,
                w: 3,
                h: 4,
            },
        };
        let json = serde_json::to_value(&prediction).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "gender": "Male",
                "age_range": "95+",
                "box": {"x": 1, "y": 2, "w": 3, "h": 4}
            })
        );
    }

    #[test]
    fn unusable_logits_are_internal_errors() {
        let face = FaceBox {
            x1: 0,
            y1: 0,
            x2: 4,
            y2: 4,
        };
        let logits = ClassifierLogits {
            gender: vec![f32::NAN, f32::NAN],
            age: vec![0.0; NUM_AGE_CLASSES],
        };
        assert!(matches!(
            Prediction::from_logits(face, &logits),
            Err(PredictError::Inference(_))
        ));
    }
}
