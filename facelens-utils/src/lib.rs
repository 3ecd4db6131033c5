//! Common helpers shared across facelens crates.

/// Application settings and their JSON persistence.
pub mod config;
/// Test fixture loading and path resolution.
pub mod fixtures;
/// Image decoding, resizing, and tensor layout conversion.
pub mod image_utils;
/// Instrumentation helpers for optional performance tracing.
pub mod telemetry;

use std::path::Path;

use anyhow::Result;
use log::LevelFilter;

pub use fixtures::{fixture_path, fixtures_dir, load_fixture_bytes, load_fixture_json};
pub use image_utils::{
    compute_resize_scales, decode_rgb_image, resize_image, rgb_to_bgr_chw,
    rgb_to_normalized_chw,
};
pub use telemetry::{
    TELEMETRY_TARGET, TimingGuard, configure as configure_telemetry, telemetry_allows,
    telemetry_enabled, telemetry_level, timing_guard, timing_guard_if,
};

/// Initialize logging once for the server and CLI.
///
/// `RUST_LOG` takes precedence; otherwise `default_filter` applies. The telemetry target is
/// always let through so that [`configure_telemetry`] alone decides whether timings are logged.
pub fn init_logging(default_filter: LevelFilter) -> Result<()> {
    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(default_filter.as_str()),
    );
    builder.filter_module(TELEMETRY_TARGET, LevelFilter::Trace);

    if builder.try_init().is_err() {
        // Logger already initialized; nothing to do.
    }
    Ok(())
}

/// Validate that a path exists and resolve it to an absolute path.
pub fn normalize_path<P: AsRef<Path>>(path: P) -> Result<std::path::PathBuf> {
    let path = path.as_ref();
    anyhow::ensure!(path.exists(), "path does not exist: {}", path.display());
    Ok(path.canonicalize()?)
}
