//! Startup-argument parsing for the worker process.
//!
//! The supervisor passes two positional arguments: the loopback port to
//! connect back on and the host's process identifier. Both are optional on
//! the command line so the worker can also be launched by hand for
//! debugging; the port falls back to the well-known default and the host
//! PID to zero (meaning "unknown").

use crate::error::WorkerError;

use bridge_core::DEFAULT_BRIDGE_PORT;

use common::ErrorLocation;

/// Parsed worker startup arguments.
///
/// `host_pid` is carried for diagnostic and heartbeat correlation only; the
/// worker never signals the host process directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerArgs {
    pub port: u16,
    pub host_pid: u32,
}

impl WorkerArgs {
    /// Parse positional arguments, excluding the program name.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Args`] when a supplied argument is present but
    /// not numeric. Missing arguments are not an error.
    #[track_caller]
    pub fn parse<I>(mut args: I) -> Result<Self, WorkerError>
    where
        I: Iterator<Item = String>,
    {
        let port = match args.next() {
            Some(raw) => raw.parse::<u16>().map_err(|e| WorkerError::Args {
                message: format!("Invalid port argument '{raw}': {e}"),
                location: ErrorLocation::here(),
            })?,
            None => DEFAULT_BRIDGE_PORT,
        };

        let host_pid = match args.next() {
            Some(raw) => raw.parse::<u32>().map_err(|e| WorkerError::Args {
                message: format!("Invalid host PID argument '{raw}': {e}"),
                location: ErrorLocation::here(),
            })?,
            None => 0,
        };

        Ok(Self { port, host_pid })
    }
}
