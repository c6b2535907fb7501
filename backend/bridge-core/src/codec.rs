//! Framed channel codec: one message per newline-terminated UTF-8 line.
//!
//! TCP delivers a byte stream, not messages, so a read may end mid-line or
//! carry several lines at once. [`LineDecoder`] reassembles chunks into
//! complete lines and holds the partial tail across reads; nothing is ever
//! dropped or delivered twice. [`encode_line`] produces the matching wire
//! form for the outbound path.

use crate::protocol;
use crate::error::protocol::ProtocolError;

use common::ErrorLocation;

use models::BridgeMessage;

/// Frame terminator. A message is complete exactly when this byte arrives.
const LINE_TERMINATOR: u8 = b'\n';

/// Encode one message as a single newline-terminated line.
///
/// JSON string escaping keeps embedded newlines out of the serialized form;
/// the encoder still refuses to emit a payload containing a raw terminator,
/// since such a line would desynchronize the peer's framing.
#[track_caller]
pub fn encode_line(message: &BridgeMessage) -> Result<Vec<u8>, ProtocolError> {
    let serialized = protocol::serialize(message)?;

    if serialized.as_bytes().contains(&LINE_TERMINATOR) {
        return Err(ProtocolError::EmbeddedNewline {
            message: format!(
                "refusing to frame '{}' message containing a raw newline",
                message.kind()
            ),
            location: ErrorLocation::here(),
        });
    }

    let mut bytes = serialized.into_bytes();
    bytes.push(LINE_TERMINATOR);
    Ok(bytes)
}

/// Incremental line reassembler for one channel connection.
///
/// Feed raw chunks via [`feed`](LineDecoder::feed) and get back every line
/// completed by that chunk, in arrival order. Lines that are empty after
/// trimming are skipped silently. Content validity is not this layer's
/// concern; see [`protocol::parse`].
#[derive(Debug, Default)]
pub struct LineDecoder {
    buf: Vec<u8>,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Append a chunk and drain all lines it completes.
    ///
    /// The bytes after the last terminator stay buffered until a later chunk
    /// finishes the line. Invalid UTF-8 within a line is replaced lossily.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(end) = self.buf.iter().position(|&b| b == LINE_TERMINATOR) {
            let raw: Vec<u8> = self.buf.drain(..=end).collect();
            let line = String::from_utf8_lossy(&raw[..end]);
            let trimmed = line.trim();
            if !trimmed.is_empty() {
                lines.push(trimmed.to_string());
            }
        }
        lines
    }

    /// True if an unterminated line fragment is buffered.
    pub fn has_partial(&self) -> bool {
        !self.buf.is_empty()
    }
}
