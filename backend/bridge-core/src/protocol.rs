//! Message protocol: parsing and serializing the closed message catalog.
//!
//! One layer above the codec: the codec deals in lines, this module deals in
//! [`BridgeMessage`] values. The catalog is a fixed enumeration, but parsing
//! is forward compatible - a structurally valid object with an unrecognized
//! `type` is downgraded to a `log` diagnostic instead of an error, so a newer
//! worker never kills an older host's connection.

use crate::error::protocol::ProtocolError;

use common::ErrorLocation;

use models::BridgeMessage;

use serde_json::Value;

/// Every discriminator the catalog knows. Used to tell "known kind, bad
/// fields" apart from "unknown kind" when serde rejects a line.
const KNOWN_KINDS: [&str; 10] = [
    "log",
    "device-state",
    "key-down",
    "key-up",
    "pointer-move",
    "pointer-down",
    "pointer-up",
    "pointer-wheel",
    "heartbeat",
    "shutdown-request",
];

/// Parse one complete line into a message.
///
/// Returns `Ok` for every catalog message and for unknown-kind objects
/// (downgraded to [`BridgeMessage::Log`]). Returns a recoverable
/// [`ProtocolError::Malformed`] otherwise; callers drop the line and keep
/// the connection open.
#[track_caller]
pub fn parse(line: &str) -> Result<BridgeMessage, ProtocolError> {
    let primary = match serde_json::from_str::<BridgeMessage>(line) {
        Ok(message) => return Ok(message),
        Err(e) => e,
    };

    if let Some(kind) = unrecognized_kind(line) {
        return Ok(BridgeMessage::Log {
            message: format!("unrecognized message kind '{kind}' ignored"),
        });
    }

    Err(ProtocolError::Malformed {
        message: format!("line does not parse as a bridge message: {primary}"),
        location: ErrorLocation::here(),
    })
}

/// Serialize one message to its JSON line form (no terminator).
#[track_caller]
pub fn serialize(message: &BridgeMessage) -> Result<String, ProtocolError> {
    serde_json::to_string(message).map_err(|e| ProtocolError::Serialize {
        message: format!("failed to serialize '{}' message: {e}", message.kind()),
        location: ErrorLocation::here(),
    })
}

/// If `line` is a structurally valid object whose `type` is a string outside
/// the catalog, return that kind.
fn unrecognized_kind(line: &str) -> Option<String> {
    let value: Value = serde_json::from_str(line).ok()?;
    let kind = value.as_object()?.get("type")?.as_str()?;
    if KNOWN_KINDS.contains(&kind) {
        None
    } else {
        Some(kind.to_string())
    }
}
