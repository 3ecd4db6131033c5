//! Settings shared by the facelens server and the offline predictor.
//!
//! Every section is `#[serde(default)]`, so a settings file only needs to name the values it
//! changes. Settings are stored as pretty-printed JSON.

use anyhow::{Context, Result};
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::{
    env, fmt, fs,
    path::{Path, PathBuf},
    str::FromStr,
};

/// Default location of the age/gender classifier graph.
pub const DEFAULT_CLASSIFIER_MODEL: &str = "models/age_gender_resnet50.onnx";
/// Default location of the YuNet face detector graph.
pub const DEFAULT_DETECTOR_MODEL: &str = "models/face_detection_yunet_2023mar_640.onnx";

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerSettings {
    /// Socket address the server binds to.
    pub bind: String,
    /// Largest accepted request body, in bytes.
    pub max_upload_bytes: usize,
    /// Answer "Invalid image" with 400 and "No face detected" with 422 instead of 200.
    pub strict_status_codes: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8000".to_string(),
            max_upload_bytes: 16 * 1024 * 1024,
            strict_status_codes: false,
        }
    }
}

/// Locations of the two ONNX graphs loaded at startup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ModelSettings {
    pub classifier_path: PathBuf,
    pub detector_path: PathBuf,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            classifier_path: PathBuf::from(DEFAULT_CLASSIFIER_MODEL),
            detector_path: PathBuf::from(DEFAULT_DETECTOR_MODEL),
        }
    }
}

/// Face detector parameters, mirroring the YuNet reference defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DetectionSettings {
    /// Minimum confidence score for a detection to be considered valid.
    pub score_threshold: f32,
    /// IoU above which overlapping boxes are suppressed.
    pub nms_threshold: f32,
    /// The maximum number of candidates kept before suppression.
    pub top_k: usize,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            score_threshold: 0.9,
            nms_threshold: 0.3,
            top_k: 5_000,
        }
    }
}

/// Resize filter preference for the detector input.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResizeQuality {
    /// Bilinear (Triangle) filtering.
    #[default]
    Quality,
    /// Nearest-neighbour filtering.
    Speed,
}

impl fmt::Display for ResizeQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResizeQuality::Quality => "quality",
            ResizeQuality::Speed => "speed",
        })
    }
}

impl FromStr for ResizeQuality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "quality" => Ok(ResizeQuality::Quality),
            "speed" => Ok(ResizeQuality::Speed),
            other => Err(format!(
                "invalid resize quality '{other}'; expected 'quality' or 'speed'"
            )),
        }
    }
}

/// Detector input resolution in pixels.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct InputDimensions {
    pub width: u32,
    pub height: u32,
    pub resize_quality: ResizeQuality,
}

impl Default for InputDimensions {
    fn default() -> Self {
        Self {
            width: 640,
            height: 640,
            resize_quality: ResizeQuality::Quality,
        }
    }
}

/// Which compute device the models should run on.
///
/// Resolved once at startup; see `facelens_core::ComputeDevice`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum DevicePreference {
    /// Use an accelerator when the runtime offers one, otherwise the CPU.
    #[default]
    Auto,
    Cpu,
    Accelerator,
}

impl fmt::Display for DevicePreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DevicePreference::Auto => "auto",
            DevicePreference::Cpu => "cpu",
            DevicePreference::Accelerator => "accelerator",
        })
    }
}

impl FromStr for DevicePreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(DevicePreference::Auto),
            "cpu" => Ok(DevicePreference::Cpu),
            "accelerator" | "gpu" | "cuda" => Ok(DevicePreference::Accelerator),
            other => Err(format!(
                "invalid device '{other}'; expected 'auto', 'cpu' or 'accelerator'"
            )),
        }
    }
}

/// Settings controlling optional runtime telemetry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TelemetrySettings {
    /// Whether telemetry timing logs are enabled.
    pub enabled: bool,
    /// Logging level for telemetry output (error, warn, info, debug, trace).
    pub level: String,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            level: "debug".to_string(),
        }
    }
}

impl TelemetrySettings {
    /// Resolve the configured level string into a `LevelFilter`.
    pub fn level_filter(&self) -> LevelFilter {
        match self.level.trim().to_ascii_lowercase().as_str() {
            "off" => LevelFilter::Off,
            "error" => LevelFilter::Error,
            "warn" | "warning" => LevelFilter::Warn,
            "info" => LevelFilter::Info,
            "trace" => LevelFilter::Trace,
            _ => LevelFilter::Debug,
        }
    }
}

/// Everything the front ends need to build and serve the inference pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppSettings {
    pub server: ServerSettings,
    pub models: ModelSettings,
    /// Detector input resolution.
    pub input: InputDimensions,
    pub detection: DetectionSettings,
    pub device: DevicePreference,
    pub telemetry: TelemetrySettings,
}

impl AppSettings {
    /// Load settings from a JSON file.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read settings file {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse settings JSON at {}", path.display()))
    }

    /// Write settings as pretty JSON, creating parent directories as needed.
    pub fn save_to_path<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let payload =
            serde_json::to_string_pretty(self).context("failed to serialize settings JSON")?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        fs::write(path, payload)
            .with_context(|| format!("failed to write settings file {}", path.display()))
    }
}

/// Settings file picked up when no `--config` is given.
pub fn default_settings_path() -> PathBuf {
    env::current_dir()
        .map(|dir| dir.join("config/facelens.json"))
        .unwrap_or_else(|_| PathBuf::from("config/facelens.json"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{NamedTempFile, tempdir};

    #[test]
    fn default_settings_round_trip() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("nested/facelens.json");
        let mut settings = AppSettings::default();
        settings.server.strict_status_codes = true;
        settings.device = DevicePreference::Cpu;
        settings.save_to_path(&path).expect("save");

        let loaded = AppSettings::load_from_path(&path).expect("load");
        assert_eq!(loaded, settings);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let file = NamedTempFile::new().expect("tempfile");
        let json = r#"{
            "detection": { "score_threshold": 0.8 },
            "models": { "classifier_path": "weights/custom.onnx" },
            "device": "cpu"
        }"#;
        fs::write(file.path(), json).expect("write custom settings");

        let loaded = AppSettings::load_from_path(file.path()).expect("load");
        assert_eq!(loaded.detection.score_threshold, 0.8);
        assert_eq!(loaded.detection.top_k, 5_000);
        assert_eq!(
            loaded.models.classifier_path,
            PathBuf::from("weights/custom.onnx")
        );
        assert_eq!(
            loaded.models.detector_path,
            PathBuf::from(DEFAULT_DETECTOR_MODEL)
        );
        assert_eq!(loaded.device, DevicePreference::Cpu);
        assert_eq!(loaded.server, ServerSettings::default());
        assert_eq!(loaded.input, InputDimensions::default());
    }

    #[test]
    fn malformed_file_reports_path() {
        let file = NamedTempFile::new().expect("tempfile");
        fs::write(file.path(), "{ not json").expect("write");
        let err = AppSettings::load_from_path(file.path()).expect_err("should fail");
        assert!(format!("{err}").contains("failed to parse settings JSON"));
    }

    #[test]
    fn device_preference_parses_aliases() {
        assert_eq!("AUTO".parse::<DevicePreference>(), Ok(DevicePreference::Auto));
        assert_eq!(" cpu ".parse::<DevicePreference>(), Ok(DevicePreference::Cpu));
        assert_eq!("gpu".parse::<DevicePreference>(), Ok(DevicePreference::Accelerator));
        assert!("tpu".parse::<DevicePreference>().is_err());
    }

    #[test]
    fn telemetry_level_parses_variants() {
        let telemetry = TelemetrySettings {
            level: "TRACE".into(),
            ..TelemetrySettings::default()
        };
        assert_eq!(telemetry.level_filter(), LevelFilter::Trace);

        let telemetry = TelemetrySettings {
            level: "Warning".into(),
            ..TelemetrySettings::default()
        };
        assert_eq!(telemetry.level_filter(), LevelFilter::Warn);
        assert_eq!(
            TelemetrySettings::default().level_filter(),
            LevelFilter::Debug
        );
    }
}
