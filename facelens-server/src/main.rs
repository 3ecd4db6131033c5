use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use facelens_server::{
    AppState,
    args::{Cli, Command, PredictArgs, ServeArgs},
    batch::{collect_images, predict_images, write_records},
    config::{apply_model_overrides, apply_serve_overrides, apply_telemetry, load_settings},
    load_pipeline, server,
};
use facelens_utils::{init_logging, normalize_path};
use log::info;

fn main() -> Result<()> {
    init_logging(log::LevelFilter::Info)?;
    let cli = Cli::parse();

    match cli.command {
        Command::Serve(args) => serve(args),
        Command::Predict(args) => predict(args),
    }
}

fn serve(args: ServeArgs) -> Result<()> {
    let mut settings = load_settings(args.model.config.as_ref())?;
    apply_serve_overrides(&mut settings, &args);
    apply_telemetry(&settings);

    let pipeline = load_pipeline(&settings)?;
    let state = Arc::new(AppState::new(pipeline, &settings.server));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    runtime.block_on(server::run(state, &settings.server))
}

fn predict(args: PredictArgs) -> Result<()> {
    let mut settings = load_settings(args.model.config.as_ref())?;
    apply_model_overrides(&mut settings, &args.model);
    apply_telemetry(&settings);

    let input_path = normalize_path(&args.input)?;
    let images = collect_images(&input_path)?;
    if images.is_empty() {
        anyhow::bail!(
            "no images found at {} (supported extensions: jpg, jpeg, png, bmp, webp)",
            input_path.display()
        );
    }

    let pipeline = load_pipeline(&settings)?;
    info!("Processing {} image(s)...", images.len());
    let records = predict_images(&pipeline, &images);
    write_records(&records, args.json.as_deref())
}
