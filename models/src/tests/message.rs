use crate::{BridgeMessage, ButtonState, DeviceSnapshot};

/// **VALUE**: Pins the wire discriminators to their kebab-case spellings.
///
/// **WHY THIS MATTERS**: The worker and host are separate processes that can
/// be built from different checkouts. If a refactor renames a variant and
/// serde silently derives a new tag, the two sides stop understanding each
/// other with no compile error anywhere.
///
/// **BUG THIS CATCHES**: Would catch removal of `rename_all = "kebab-case"`
/// or a variant rename changing the on-wire `type` value.
#[test]
fn given_each_variant_when_serialized_then_type_tag_is_kebab_case() {
    // GIVEN: One message of each kind
    let cases: Vec<(BridgeMessage, &str)> = vec![
        (
            BridgeMessage::Log {
                message: String::from("hi"),
            },
            "log",
        ),
        (
            BridgeMessage::DeviceState {
                index: 0,
                state: DeviceSnapshot::disconnected(1),
            },
            "device-state",
        ),
        (
            BridgeMessage::KeyDown {
                code: String::from("KeyA"),
                raw_code: 30,
                timestamp: 1,
            },
            "key-down",
        ),
        (
            BridgeMessage::KeyUp {
                code: String::from("KeyA"),
                raw_code: 30,
                timestamp: 2,
            },
            "key-up",
        ),
        (
            BridgeMessage::PointerMove {
                x: 1.0,
                y: 2.0,
                timestamp: 3,
            },
            "pointer-move",
        ),
        (
            BridgeMessage::PointerDown {
                x: 1.0,
                y: 2.0,
                button: 0,
                timestamp: 4,
            },
            "pointer-down",
        ),
        (
            BridgeMessage::PointerUp {
                x: 1.0,
                y: 2.0,
                button: 0,
                timestamp: 5,
            },
            "pointer-up",
        ),
        (
            BridgeMessage::PointerWheel {
                delta_x: 0.0,
                delta_y: -1.0,
                delta_z: 0.0,
                timestamp: 6,
            },
            "pointer-wheel",
        ),
        (
            BridgeMessage::Heartbeat {
                device_count: 1,
                window_count: 0,
            },
            "heartbeat",
        ),
        (
            BridgeMessage::ShutdownRequest {
                originator_process_id: 42,
            },
            "shutdown-request",
        ),
    ];

    for (message, expected_kind) in cases {
        // WHEN: Serializing to JSON
        let json = serde_json::to_value(&message).unwrap();

        // THEN: The type tag matches both the wire spelling and kind()
        assert_eq!(json["type"], expected_kind, "wrong tag for {message:?}");
        assert_eq!(message.kind(), expected_kind);
    }
}

/// **VALUE**: Verifies field names stay snake_case on the wire.
///
/// **BUG THIS CATCHES**: Would catch an accidental `rename_all` on a struct
/// variant turning `raw_code` into `rawCode`, which the other process would
/// deserialize as a missing field.
#[test]
fn given_key_event_when_serialized_then_fields_are_snake_case() {
    let message = BridgeMessage::KeyDown {
        code: String::from("Enter"),
        raw_code: 28,
        timestamp: 99,
    };

    let json = serde_json::to_value(&message).unwrap();

    assert_eq!(json["code"], "Enter");
    assert_eq!(json["raw_code"], 28);
    assert_eq!(json["timestamp"], 99);
}

/// **VALUE**: Round-trips a full device snapshot through JSON.
///
/// **BUG THIS CATCHES**: Would catch a field addition that serializes but
/// fails to deserialize (missing `#[serde(default)]`), breaking host-side
/// decoding of the highest-volume message kind.
#[test]
fn given_device_state_when_round_tripped_then_snapshot_is_preserved() {
    // GIVEN: A realistic snapshot
    let message = BridgeMessage::DeviceState {
        index: 1,
        state: DeviceSnapshot {
            axes: vec![0.0, -0.5, 1.0, 0.25],
            buttons: vec![ButtonState::digital(true), ButtonState::analog(0.4)],
            connected: true,
            timestamp: 123456,
            id: String::from("Test Pad"),
            mapping: String::from("standard"),
        },
    };

    // WHEN: Serializing and deserializing
    let json = serde_json::to_string(&message).unwrap();
    let back: BridgeMessage = serde_json::from_str(&json).unwrap();

    // THEN: Nothing is lost
    assert_eq!(back, message);
}

/// A disconnect snapshot carries no axes or buttons, per the protocol's
/// "connected:false is the removal signal" rule.
#[test]
fn given_disconnected_snapshot_then_axes_and_buttons_are_empty() {
    let snapshot = DeviceSnapshot::disconnected(7);

    assert!(!snapshot.connected);
    assert!(snapshot.axes.is_empty());
    assert!(snapshot.buttons.is_empty());
    assert_eq!(snapshot.timestamp, 7);
}

#[test]
fn given_button_helpers_then_pressed_tracks_value() {
    assert!(ButtonState::digital(true).pressed);
    assert_eq!(ButtonState::digital(false).value, 0.0);
    assert!(ButtonState::analog(0.5).pressed);
    assert!(!ButtonState::analog(0.05).pressed);
}
