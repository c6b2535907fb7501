use overlay_host::surface::OverlaySurface;

use bridge_core::config::BridgeConfig;
use bridge_core::logging::initialize as LoggerInitialize;
use bridge_core::supervisor::Supervisor;

use std::fs::create_dir_all;
use std::path::PathBuf;
use std::sync::Arc;

use log::{error, info, warn};
use tokio::signal::ctrl_c;

const LOG_FILE_NAME: &str = "overlay-host.log";
const PRODUCT_DIR: &str = "input-overlay";

#[tokio::main]
async fn main() {
    let log_dir = data_directory().join("logs");
    if create_dir_all(&log_dir).is_ok()
        && let Err(e) = LoggerInitialize(&log_dir, LOG_FILE_NAME)
    {
        eprintln!("Logger initialization failed: {e}");
    }

    info!("Input overlay host starting (PID {})", std::process::id());

    let config = BridgeConfig::load_or_default(&config_directory());

    let surface = Arc::new(OverlaySurface::new());
    let (mut supervisor, handle) = Supervisor::new(config, surface);

    // The one user-visible failure of the bridge subsystem. The overlay
    // itself would keep running on platform-sourced input; this stand-in
    // host has nothing else to do, so it exits after reporting.
    if let Err(e) = supervisor.start().await {
        error!("Input bridge unavailable: {e}");
        warn!("Continuing without bridge-sourced device input");
        return;
    }

    // Ctrl-C stands in for the window-close / application-quit events the
    // full product's UI shell would deliver.
    tokio::spawn(async move {
        if ctrl_c().await.is_ok() {
            info!("Interrupt received, shutting the bridge down");
            handle.notify_application_quit().await;
        }
    });

    supervisor.run().await;

    if let Some(condition) = supervisor.failure() {
        error!("Bridge ended with a failure: {condition}");
    }
    match supervisor.exit_status() {
        Some(status) => info!("Worker final status: {status}"),
        None => info!("Worker exit status was not observed"),
    }
    info!("Input overlay host exiting");
}

fn data_directory() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(PRODUCT_DIR)
}

fn config_directory() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(PRODUCT_DIR)
}
