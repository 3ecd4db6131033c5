//! Common test utilities for the HTTP and CLI integration tests.
#![allow(dead_code)]

use std::{io::Cursor, path::PathBuf, sync::Arc};

use axum::{
    Router,
    body::Body,
    http::{Request, header},
};
use facelens_core::{
    AgeGenderClassifier, BoundingBox, ClassifierLogits, FaceLocator, InferencePipeline,
    NUM_AGE_CLASSES, Tensor,
};
use facelens_server::{AppState, build_router};
use facelens_utils::config::ServerSettings;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

pub const BOUNDARY: &str = "facelens-test-boundary";

/// Locator that reports the same box for every image.
#[derive(Debug)]
pub struct FixedLocator(pub Option<BoundingBox>);

impl FaceLocator for FixedLocator {
    fn locate(&self, _image: &DynamicImage) -> anyhow::Result<Option<BoundingBox>> {
        Ok(self.0)
    }
}

/// Locator whose runtime always fails.
#[derive(Debug)]
pub struct BrokenLocator;

impl FaceLocator for BrokenLocator {
    fn locate(&self, _image: &DynamicImage) -> anyhow::Result<Option<BoundingBox>> {
        anyhow::bail!("detector runtime unavailable")
    }
}

/// Classifier that always answers `Female`, age class `age_class`.
#[derive(Debug)]
pub struct FixedClassifier {
    pub age_class: usize,
}

impl AgeGenderClassifier for FixedClassifier {
    fn classify(&self, input: Tensor) -> anyhow::Result<ClassifierLogits> {
        anyhow::ensure!(input.shape() == [1, 3, 224, 224].as_slice(), "unexpected input shape");
        let mut age = vec![-1.0; NUM_AGE_CLASSES];
        age[self.age_class] = 5.0;
        Ok(ClassifierLogits {
            gender: vec![-0.5, 0.5],
            age,
        })
    }
}

pub fn face_box(x: f32, y: f32, width: f32, height: f32) -> BoundingBox {
    BoundingBox {
        x,
        y,
        width,
        height,
    }
}

pub fn router_with(locator: impl FaceLocator + 'static, settings: ServerSettings) -> Router {
    let pipeline = InferencePipeline::new(
        Box::new(locator),
        Box::new(FixedClassifier { age_class: 19 }),
    );
    build_router(Arc::new(AppState::new(pipeline, &settings)), &settings)
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x * 3) as u8, (y * 5) as u8, 200])
    });
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(image)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .expect("encode png");
    bytes
}

/// Build a multipart POST with a single file field named `field`.
pub fn multipart_request(uri: &str, field: &str, contents: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"upload.png\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(contents);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .expect("build request")
}

pub fn find_model_paths() -> Option<(PathBuf, PathBuf)> {
    let root = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("..");
    let classifier = root.join(facelens_utils::config::DEFAULT_CLASSIFIER_MODEL);
    let detector = root.join(facelens_utils::config::DEFAULT_DETECTOR_MODEL);
    (classifier.exists() && detector.exists()).then_some((classifier, detector))
}
