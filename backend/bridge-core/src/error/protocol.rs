use common::ErrorLocation;

use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum ProtocolError {
    /// A line arrived that does not parse as any catalog message. Recoverable:
    /// the connection continues, the line is dropped.
    #[error("Malformed Line Error: {message} {location}")]
    Malformed {
        message: String,
        location: ErrorLocation,
    },

    #[error("Serialize Error: {message} {location}")]
    Serialize {
        message: String,
        location: ErrorLocation,
    },

    /// A serialized message contained a raw line terminator, which would
    /// desynchronize the framing on the other side.
    #[error("Embedded Newline Error: {message} {location}")]
    EmbeddedNewline {
        message: String,
        location: ErrorLocation,
    },
}
