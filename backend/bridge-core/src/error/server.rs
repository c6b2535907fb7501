use common::ErrorLocation;

use std::error::Error as StdError;

use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum ServerError {
    /// The listener could not claim the loopback port. After orphan cleanup
    /// this is the one user-visible failure of the subsystem; per-connection
    /// read failures are downgraded to logged conditions and never surface
    /// as errors.
    #[error("Bind Error: {message} {location}")]
    Bind {
        message: String,
        location: ErrorLocation,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
}
