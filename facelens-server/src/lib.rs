//! HTTP and command-line front-end for the facelens age/gender predictor.

pub mod args;
pub mod batch;
pub mod config;
pub mod handlers;
pub mod response;
pub mod server;
pub mod state;

use anyhow::Result;
use facelens_core::InferencePipeline;
use facelens_utils::config::AppSettings;
use log::info;

pub use server::build_router;
pub use state::AppState;

/// Load both models described by `settings`.
pub fn load_pipeline(settings: &AppSettings) -> Result<InferencePipeline> {
    info!(
        "Loading classifier from {} and YuNet from {} at resolution {}x{} (device preference: {})",
        settings.models.classifier_path.display(),
        settings.models.detector_path.display(),
        settings.input.width,
        settings.input.height,
        settings.device
    );
    let pipeline = InferencePipeline::from_settings(settings)?;
    info!("Models loaded");
    Ok(pipeline)
}
