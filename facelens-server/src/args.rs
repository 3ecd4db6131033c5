//! Command-line argument definitions for the `facelens` binary.

use clap::{ArgAction, Args, Parser, Subcommand};
use facelens_utils::config::{DevicePreference, ResizeQuality};
use std::path::PathBuf;

/// Predict age range and gender for the most prominent face in an image.
#[derive(Debug, Parser)]
#[command(name = "facelens", author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Serve predictions over HTTP (`POST /predict/`).
    Serve(ServeArgs),
    /// Run predictions over an image file or directory and print JSON.
    Predict(PredictArgs),
}

/// Options shared by every subcommand that loads the models.
#[derive(Debug, Args)]
pub struct ModelArgs {
    /// Optional settings JSON. Defaults to `config/facelens.json` when present, otherwise built-in parameters.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Path to the age/gender classifier ONNX model.
    #[arg(long, value_name = "PATH")]
    pub classifier_model: Option<PathBuf>,

    /// Path to the YuNet face detector ONNX model.
    #[arg(long, value_name = "PATH")]
    pub detector_model: Option<PathBuf>,

    /// Compute device: `auto`, `cpu` or `accelerator`.
    #[arg(long, value_name = "DEVICE")]
    pub device: Option<DevicePreference>,

    /// Override detector input width (pixels).
    #[arg(long)]
    pub width: Option<u32>,

    /// Override detector input height (pixels).
    #[arg(long)]
    pub height: Option<u32>,

    /// Resize quality mode for the detector input: `quality` (Triangle) or `speed` (Nearest).
    #[arg(long, value_name = "MODE")]
    pub resize_quality: Option<ResizeQuality>,

    /// Override detector score threshold.
    #[arg(long)]
    pub score_threshold: Option<f32>,

    /// Override NMS threshold.
    #[arg(long)]
    pub nms_threshold: Option<f32>,

    /// Override top_k limit.
    #[arg(long)]
    pub top_k: Option<usize>,

    /// Enable telemetry timing logs (defaults to settings file).
    #[arg(long, action = ArgAction::SetTrue)]
    pub telemetry: bool,

    /// Override telemetry logging level (error, warn, info, debug, trace).
    #[arg(long, value_name = "LEVEL")]
    pub telemetry_level: Option<String>,
}

#[derive(Debug, Args)]
pub struct ServeArgs {
    #[command(flatten)]
    pub model: ModelArgs,

    /// Address to listen on, e.g. `0.0.0.0:8000`.
    #[arg(long, value_name = "ADDR")]
    pub bind: Option<String>,

    /// Answer invalid images with 400 and missing faces with 422 instead of 200.
    #[arg(long, action = ArgAction::SetTrue)]
    pub strict_status: bool,

    /// Maximum accepted upload size in bytes.
    #[arg(long, value_name = "BYTES")]
    pub max_upload_bytes: Option<usize>,
}

#[derive(Debug, Args)]
pub struct PredictArgs {
    #[command(flatten)]
    pub model: ModelArgs,

    /// Path to an image file or a directory containing images.
    #[arg(short, long)]
    pub input: PathBuf,

    /// Write predictions to a JSON file instead of stdout.
    #[arg(long)]
    pub json: Option<PathBuf>,
}
