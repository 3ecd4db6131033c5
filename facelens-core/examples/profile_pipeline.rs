use std::{env, time::Instant};

use facelens_core::{
    AgeGenderClassifier, ComputeDevice, FaceBox, PostprocessConfig, PreprocessConfig, Prediction,
    ResNetClassifier, YuNetDetector, face_tensor,
};
use facelens_utils::{
    config::{DEFAULT_CLASSIFIER_MODEL, DEFAULT_DETECTOR_MODEL},
    decode_rgb_image,
};

fn main() -> anyhow::Result<()> {
    let image_path = env::args()
        .nth(1)
        .unwrap_or_else(|| "fixtures/images/reference_face.jpg".to_string());
    let device = ComputeDevice::Cpu;

    println!("=== facelens Pipeline Performance Breakdown ===\n");

    // 1. Model Loading
    let start = Instant::now();
    let detector = YuNetDetector::new(
        DEFAULT_DETECTOR_MODEL,
        PreprocessConfig::default(),
        PostprocessConfig::default(),
        device,
    )?;
    let classifier = ResNetClassifier::load(DEFAULT_CLASSIFIER_MODEL, device)?;
    let load_time = start.elapsed();
    println!(
        "1. Model Loading:     {:>8.4}s (excluded from per-request total)\n",
        load_time.as_secs_f64()
    );

    // 2. Decode
    let start = Instant::now();
    let bytes = std::fs::read(&image_path)?;
    let image = decode_rgb_image(&bytes)?;
    let decode_time = start.elapsed();

    // 3. Detection
    let start = Instant::now();
    let detections = detector.detect_image(&image)?;
    let detect_time = start.elapsed();
    let Some(first) = detections.first() else {
        println!("No face detected in {image_path}");
        return Ok(());
    };

    // 4. Crop + normalize
    let start = Instant::now();
    let face = FaceBox::from_bbox(&first.bbox);
    let Some(input) = face_tensor(&image.to_rgb8(), &face)? else {
        println!("Detected box {face:?} is empty");
        return Ok(());
    };
    let crop_time = start.elapsed();

    // 5. Classification
    let start = Instant::now();
    let logits = classifier.classify(input)?;
    let classify_time = start.elapsed();

    let stages = [
        ("2. Decode:", decode_time),
        ("3. Detection:", detect_time),
        ("4. Crop + normalize:", crop_time),
        ("5. Classification:", classify_time),
    ];
    let total_secs: f64 = stages.iter().map(|(_, t)| t.as_secs_f64()).sum();
    for (label, time) in stages {
        println!(
            "{label:<22}{:>8.4}s ({:>5.1}%)",
            time.as_secs_f64(),
            time.as_secs_f64() / total_secs * 100.0
        );
    }
    println!("{}", "─".repeat(45));
    println!("   TOTAL:             {:>8.4}s (100.0%)\n", total_secs);

    let prediction = Prediction::from_logits(face, &logits)?;
    println!("{}", serde_json::to_string_pretty(&prediction)?);

    Ok(())
}
