//! brushd - brushing witness daemon
//!
//! Loads configuration, builds the detector, serves the HTTP API and runs the
//! capture loop whenever a session is started.

use anyhow::{anyhow, Context, Result};
use std::sync::{mpsc, Arc};

use brush_witness::{
    api::{ApiConfig, ApiServer},
    config::ServiceConfig,
    CaptureSettings, DetectionAdapter, SessionController,
};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = ServiceConfig::load()?;
    log::info!(
        "brushd {} camera={} detector={} classes={:?}",
        env!("CARGO_PKG_VERSION"),
        config.camera.device,
        config.detector.backend,
        config.classes.iter().map(|c| c.label()).collect::<Vec<_>>()
    );

    let registry = config.build_registry()?;
    let adapter = DetectionAdapter::new(registry.resolve(None)?)?;
    adapter.warm_up().context("detector warm-up failed")?;

    let controller = Arc::new(SessionController::new(
        adapter,
        CaptureSettings {
            camera: config.camera.clone(),
            classes: config.classes.clone(),
            preview: config.preview,
        },
        config.session,
    )?);

    let api_config = ApiConfig {
        addr: config.api_addr.clone(),
        session_defaults: config.session,
    };
    let api_handle = ApiServer::new(api_config, controller.clone()).spawn()?;

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    log::info!("brushd waiting for shutdown signal (Ctrl-C)...");
    let _ = rx.recv();
    log::info!("shutdown signal received, stopping...");
    api_handle.stop()?;
    controller.shutdown()?;
    Ok(())
}
