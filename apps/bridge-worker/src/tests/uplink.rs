// Unit tests for backend-event to wire-message translation.

use crate::WORKER_LOG_PREFIX;
use crate::backend::BackendEvent;

use models::{BridgeMessage, ButtonState, DeviceSnapshot};

fn snapshot(timestamp: u64) -> DeviceSnapshot {
    DeviceSnapshot {
        axes: vec![0.0, 1.0, -1.0, 0.5],
        buttons: vec![ButtonState::digital(true)],
        connected: true,
        timestamp,
        id: String::from("evdev Gamepad (Test Pad)"),
        mapping: String::from("standard"),
    }
}

/// Device snapshots pass through with their index intact.
#[test]
fn given_device_event_then_device_state_message() {
    let event = BackendEvent::Device {
        index: 3,
        snapshot: snapshot(500),
    };

    let message = BridgeMessage::from(event);

    assert_eq!(
        message,
        BridgeMessage::DeviceState {
            index: 3,
            state: snapshot(500),
        }
    );
}

/// **VALUE**: Verifies the press/release split: one backend key event maps
/// to `key-down` or `key-up` by its `pressed` flag, carrying both codes.
///
/// **BUG THIS CATCHES**: Would catch a translation that collapses both
/// directions into one kind, which would leave overlay keys stuck down.
#[test]
fn given_key_events_then_direction_selects_message_kind() {
    let down = BackendEvent::Key {
        pressed: true,
        code: String::from("KeyW"),
        raw_code: 17,
        timestamp: 100,
    };
    let up = BackendEvent::Key {
        pressed: false,
        code: String::from("KeyW"),
        raw_code: 17,
        timestamp: 150,
    };

    assert_eq!(
        BridgeMessage::from(down),
        BridgeMessage::KeyDown {
            code: String::from("KeyW"),
            raw_code: 17,
            timestamp: 100,
        }
    );
    assert_eq!(
        BridgeMessage::from(up),
        BridgeMessage::KeyUp {
            code: String::from("KeyW"),
            raw_code: 17,
            timestamp: 150,
        }
    );
}

/// Pointer buttons split the same way, keeping position and button number.
#[test]
fn given_pointer_button_events_then_down_and_up_messages() {
    let down = BackendEvent::PointerButton {
        pressed: true,
        x: 10.0,
        y: 20.0,
        button: 2,
        timestamp: 300,
    };
    let up = BackendEvent::PointerButton {
        pressed: false,
        x: 10.0,
        y: 20.0,
        button: 2,
        timestamp: 400,
    };

    assert_eq!(
        BridgeMessage::from(down),
        BridgeMessage::PointerDown {
            x: 10.0,
            y: 20.0,
            button: 2,
            timestamp: 300,
        }
    );
    assert_eq!(
        BridgeMessage::from(up),
        BridgeMessage::PointerUp {
            x: 10.0,
            y: 20.0,
            button: 2,
            timestamp: 400,
        }
    );
}

/// Motion and wheel translate field-for-field.
#[test]
fn given_motion_and_wheel_events_then_pointer_messages() {
    let motion = BackendEvent::PointerMove {
        x: -4.0,
        y: 9.0,
        timestamp: 700,
    };
    let wheel = BackendEvent::PointerWheel {
        delta_x: 0.0,
        delta_y: -1.0,
        delta_z: 0.0,
        timestamp: 800,
    };

    assert_eq!(
        BridgeMessage::from(motion),
        BridgeMessage::PointerMove {
            x: -4.0,
            y: 9.0,
            timestamp: 700,
        }
    );
    assert_eq!(
        BridgeMessage::from(wheel),
        BridgeMessage::PointerWheel {
            delta_x: 0.0,
            delta_y: -1.0,
            delta_z: 0.0,
            timestamp: 800,
        }
    );
}

/// Milestones become `log` messages carrying the worker prefix, so the
/// host log shows which process spoke.
#[test]
fn given_milestone_then_prefixed_log_message() {
    let event = BackendEvent::Milestone(String::from("Found 2 input device(s)"));

    let message = BridgeMessage::from(event);

    match message {
        BridgeMessage::Log { message } => {
            assert!(message.starts_with(WORKER_LOG_PREFIX));
            assert!(message.contains("Found 2 input device(s)"));
        }
        other => panic!("Expected log message, got {other:?}"),
    }
}
