use bridge_worker::args::WorkerArgs;
use bridge_worker::backend;
use bridge_worker::uplink;
use bridge_worker::{WORKER_LOG_PREFIX, backend::EVENT_CHANNEL_CAPACITY};

use bridge_core::logging::initialize as LoggerInitialize;

use models::BridgeMessage;

use std::env::args as EnvArgs;
use std::fs::create_dir_all;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use log::{error, info};
use tokio::sync::mpsc;

const LOG_FILE_NAME: &str = "bridge-worker.log";
const PRODUCT_DIR: &str = "input-overlay";

/// Heartbeat cadence. The host's liveness watchdog is calibrated against
/// this; see the host-side configuration.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

const EXIT_USAGE: u8 = 2;
const EXIT_STARTUP_FAILED: u8 = 1;

#[tokio::main]
async fn main() -> ExitCode {
    // The worker logs to its own file so a crashed worker's trail survives
    // the next host launch.
    let log_dir = log_directory();
    if create_dir_all(&log_dir).is_ok()
        && let Err(e) = LoggerInitialize(&log_dir, LOG_FILE_NAME)
    {
        eprintln!("Worker logger initialization failed: {e}");
    }

    let args = match WorkerArgs::parse(EnvArgs().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            error!("{e}");
            error!("Usage: bridge-worker [port] [host-pid]");
            return ExitCode::from(EXIT_USAGE);
        }
    };

    info!(
        "Bridge worker starting (port {}, host PID {})",
        args.port, args.host_pid
    );

    let mut stream = match uplink::connect(&args).await {
        Ok(stream) => stream,
        Err(e) => {
            error!("{e}");
            return ExitCode::from(EXIT_STARTUP_FAILED);
        }
    };
    info!("Connected to host on port {}", args.port);

    let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let backend = match backend::start(events_tx) {
        Ok(backend) => backend,
        Err(e) => {
            error!("{e}");
            // Mirror the fatal condition to the host before going down.
            let fatal = BridgeMessage::Log {
                message: format!("{WORKER_LOG_PREFIX} FATAL: {e}"),
            };
            let _ = uplink::write_message(&mut stream, &fatal).await;
            return ExitCode::from(EXIT_STARTUP_FAILED);
        }
    };

    let end = uplink::run_uplink(
        stream,
        &args,
        events_rx,
        || backend.open_device_count(),
        HEARTBEAT_INTERVAL,
    )
    .await;

    info!("Bridge worker exiting cleanly ({end:?})");
    ExitCode::SUCCESS
}

fn log_directory() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(PRODUCT_DIR)
        .join("logs")
}
