//! Configuration loading and CLI override logic.

use std::path::PathBuf;

use anyhow::{Context, Result};
use facelens_utils::{
    config::{AppSettings, default_settings_path},
    configure_telemetry, normalize_path,
};
use log::info;

use crate::args::{ModelArgs, ServeArgs};

/// Load application settings from a file or use defaults.
pub fn load_settings(config_path: Option<&PathBuf>) -> Result<AppSettings> {
    if let Some(path) = config_path {
        let resolved = normalize_path(path)?;
        let settings = AppSettings::load_from_path(&resolved)?;
        info!("Loaded settings from {}", resolved.display());
        Ok(settings)
    } else {
        let default_path = default_settings_path();
        if default_path.exists() {
            let settings = AppSettings::load_from_path(&default_path).with_context(|| {
                format!(
                    "failed to load default settings from {}",
                    default_path.display()
                )
            })?;
            info!("Loaded settings from {}", default_path.display());
            Ok(settings)
        } else {
            Ok(AppSettings::default())
        }
    }
}

/// Apply model, detection and telemetry flags on top of loaded settings.
pub fn apply_model_overrides(settings: &mut AppSettings, args: &ModelArgs) {
    if let Some(path) = args.classifier_model.as_ref() {
        settings.models.classifier_path = path.clone();
    }
    if let Some(path) = args.detector_model.as_ref() {
        settings.models.detector_path = path.clone();
    }
    if let Some(device) = args.device {
        settings.device = device;
    }

    if args.telemetry {
        settings.telemetry.enabled = true;
    }
    if let Some(level) = args.telemetry_level.as_ref() {
        let normalized = level.trim();
        if !normalized.is_empty() {
            let lower = normalized.to_ascii_lowercase();
            settings.telemetry.level = lower.clone();
            if lower == "off" {
                settings.telemetry.enabled = false;
            }
        }
    }

    if let Some(width) = args.width {
        settings.input.width = width;
    }
    if let Some(height) = args.height {
        settings.input.height = height;
    }
    if let Some(mode) = args.resize_quality {
        settings.input.resize_quality = mode;
    }
    if let Some(score) = args.score_threshold {
        settings.detection.score_threshold = score;
    }
    if let Some(nms) = args.nms_threshold {
        settings.detection.nms_threshold = nms;
    }
    if let Some(top_k) = args.top_k {
        settings.detection.top_k = top_k;
    }
}

/// Apply `serve`-only flags.
pub fn apply_serve_overrides(settings: &mut AppSettings, args: &ServeArgs) {
    apply_model_overrides(settings, &args.model);
    if let Some(bind) = args.bind.as_ref() {
        settings.server.bind = bind.clone();
    }
    if args.strict_status {
        settings.server.strict_status_codes = true;
    }
    if let Some(limit) = args.max_upload_bytes {
        settings.server.max_upload_bytes = limit;
    }
}

/// Push the telemetry section of `settings` into the global telemetry switch.
pub fn apply_telemetry(settings: &AppSettings) {
    configure_telemetry(
        settings.telemetry.enabled,
        settings.telemetry.level_filter(),
    );
}
