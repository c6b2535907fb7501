// Unit tests for the message protocol layer (parse/serialize).

use crate::error::protocol::ProtocolError;
use crate::protocol::{parse, serialize};

use models::{BridgeMessage, ButtonState, DeviceSnapshot};

/// Every catalog kind survives a serialize/parse round trip.
#[test]
fn given_each_catalog_kind_when_round_tripped_then_preserved() {
    let messages = vec![
        BridgeMessage::Log {
            message: String::from("worker ready"),
        },
        BridgeMessage::DeviceState {
            index: 0,
            state: DeviceSnapshot {
                axes: vec![0.5, -0.5],
                buttons: vec![ButtonState::digital(true)],
                connected: true,
                timestamp: 1000,
                id: String::from("Pad"),
                mapping: String::from("standard"),
            },
        },
        BridgeMessage::KeyDown {
            code: String::from("Space"),
            raw_code: 57,
            timestamp: 2000,
        },
        BridgeMessage::PointerMove {
            x: 10.0,
            y: 20.0,
            timestamp: 3000,
        },
        BridgeMessage::PointerWheel {
            delta_x: 0.0,
            delta_y: 1.0,
            delta_z: 0.0,
            timestamp: 4000,
        },
        BridgeMessage::Heartbeat {
            device_count: 2,
            window_count: 0,
        },
        BridgeMessage::ShutdownRequest {
            originator_process_id: 1234,
        },
    ];

    for message in messages {
        let line = serialize(&message).unwrap();
        let parsed = parse(&line).unwrap();
        assert_eq!(parsed, message, "Round trip changed the message");
    }
}

/// **VALUE**: Verifies the forward-compatibility rule: a structurally valid
/// object with an unrecognized `type` parses as a `log` diagnostic, not an
/// error.
///
/// **WHY THIS MATTERS**: Host and worker are separate binaries that can be
/// built from different checkouts. A newer worker emitting a new message
/// kind must not kill an older host's connection.
///
/// **BUG THIS CATCHES**: Would catch a parser change that turns unknown
/// kinds into `ProtocolError::Malformed`, making every catalog addition a
/// breaking change.
#[test]
fn given_unknown_kind_when_parsed_then_downgraded_to_log() {
    // GIVEN: A well-formed object whose kind is outside the catalog
    let line = r#"{"type":"device-battery","index":0,"level":0.5}"#;

    // WHEN: Parsing it
    let parsed = parse(line).unwrap();

    // THEN: It becomes a log diagnostic naming the unknown kind
    match parsed {
        BridgeMessage::Log { message } => {
            assert!(
                message.contains("device-battery"),
                "Diagnostic should name the unknown kind: {message}"
            );
        }
        other => panic!("Expected a log downgrade, got {other:?}"),
    }
}

/// **VALUE**: Verifies malformed content is a recoverable per-line error.
///
/// **BUG THIS CATCHES**: Would catch a parser that panics on junk input, or
/// reports a known-kind-with-bad-fields line as an unknown kind (which would
/// silently swallow real field mismatches).
#[test]
fn given_malformed_lines_when_parsed_then_recoverable_error() {
    let cases = [
        "not json at all",
        "{\"type\":",
        // Known kind but missing required fields - a real mismatch, not
        // forward compatibility.
        r#"{"type":"key-down"}"#,
        // Structurally valid JSON but not an object.
        "[1,2,3]",
        // Object with a non-string type field.
        r#"{"type":42}"#,
    ];

    for line in cases {
        let result = parse(line);
        assert!(
            matches!(result, Err(ProtocolError::Malformed { .. })),
            "Expected Malformed for {line:?}, got {result:?}"
        );
    }
}

/// The error Display carries the capture location for log correlation.
#[test]
fn given_parse_error_then_message_includes_location() {
    let error = parse("garbage").unwrap_err();

    let rendered = format!("{error}");
    assert!(rendered.contains("protocol.rs"), "got: {rendered}");
}

/// Wire form spot check: one line, kebab-case tag, snake_case fields.
#[test]
fn given_pointer_down_when_serialized_then_wire_shape_is_stable() {
    let message = BridgeMessage::PointerDown {
        x: 3.0,
        y: 4.0,
        button: 2,
        timestamp: 99,
    };

    let line = serialize(&message).unwrap();

    assert!(!line.contains('\n'));
    assert!(line.contains(r#""type":"pointer-down""#));
    assert!(line.contains(r#""timestamp":99"#));
}
