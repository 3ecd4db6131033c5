//! Offline predictions over image files (`facelens predict`).

use std::{
    fs::{self, File},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use facelens_core::{InferencePipeline, Prediction, PredictError};
use log::{debug, info, warn};
use serde::Serialize;
use walkdir::WalkDir;

const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "bmp", "webp"];

/// Prediction or error for one image.
#[derive(Debug, Serialize)]
pub struct PredictionRecord {
    pub image: String,
    #[serde(flatten)]
    pub outcome: RecordOutcome,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum RecordOutcome {
    Prediction(Prediction),
    Error { error: String },
}

/// Collect all image paths from a file or directory, sorted.
pub fn collect_images(path: &Path) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    if !path.is_dir() {
        anyhow::bail!(
            "input path is neither file nor directory: {}",
            path.display()
        );
    }

    let mut images = Vec::new();
    for entry in WalkDir::new(path)
        .follow_links(false)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
    {
        if let Some(ext) = entry.path().extension().and_then(|e| e.to_str()) {
            let ext_lower = ext.to_ascii_lowercase();
            if IMAGE_EXTENSIONS.contains(&ext_lower.as_str()) {
                images.push(entry.path().to_path_buf());
            } else {
                debug!("Skipping non-image file {}", entry.path().display());
            }
        }
    }
    images.sort();
    Ok(images)
}

/// Run the pipeline over every image, keeping going past per-image failures.
pub fn predict_images(pipeline: &InferencePipeline, images: &[PathBuf]) -> Vec<PredictionRecord> {
    images
        .iter()
        .map(|image_path| {
            let outcome = match fs::read(image_path) {
                Ok(bytes) => match pipeline.predict_bytes(&bytes) {
                    Ok(prediction) => {
                        info!(
                            "{} -> {} / {}",
                            image_path.display(),
                            prediction.gender,
                            prediction.age_range
                        );
                        RecordOutcome::Prediction(prediction)
                    }
                    Err(err) => {
                        match &err {
                            PredictError::Inference(cause) => {
                                warn!("Failed to process {}: {cause:#}", image_path.display());
                            }
                            client => info!("{} -> {client}", image_path.display()),
                        }
                        RecordOutcome::Error {
                            error: err.to_string(),
                        }
                    }
                },
                Err(err) => {
                    warn!("Failed to read {}: {err}", image_path.display());
                    RecordOutcome::Error {
                        error: format!("failed to read file: {err}"),
                    }
                }
            };
            PredictionRecord {
                image: image_path.display().to_string(),
                outcome,
            }
        })
        .collect()
}

/// Write records as pretty JSON to `json_path`, or to stdout when no path is given.
pub fn write_records(records: &[PredictionRecord], json_path: Option<&Path>) -> Result<()> {
    if let Some(json_path) = json_path {
        if let Some(dir) = json_path.parent()
            && !dir.as_os_str().is_empty()
        {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create directory {}", dir.display()))?;
        }
        let file = File::create(json_path)
            .with_context(|| format!("failed to create {}", json_path.display()))?;
        serde_json::to_writer_pretty(file, records).with_context(|| {
            format!("failed to write predictions to {}", json_path.display())
        })?;
        info!("Wrote predictions to {}", json_path.display());
    } else {
        let json =
            serde_json::to_string_pretty(records).context("failed to serialize predictions")?;
        println!("{json}");
    }
    Ok(())
}
