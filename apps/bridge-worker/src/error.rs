use common::ErrorLocation;

use std::error::Error as StdError;

use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum WorkerError {
    #[error("Argument Error: {message} {location}")]
    Args {
        message: String,
        location: ErrorLocation,
    },

    /// Connecting back to the host's channel server failed.
    #[error("Connect Error: {message} {location}")]
    Connect {
        message: String,
        location: ErrorLocation,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    /// The input backend could not be opened. Unrecoverable: the worker
    /// logs it, mirrors it to the host, and exits non-zero.
    #[error("Backend Error: {message} {location}")]
    Backend {
        message: String,
        location: ErrorLocation,
    },
}
