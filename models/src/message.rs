use serde::{Deserialize, Serialize};

/// One button of an input device, W3C-gamepad shaped: digital `pressed`
/// plus an analog `value` in 0.0..=1.0 (triggers report partial values).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ButtonState {
    pub pressed: bool,
    pub value: f64,
}

impl ButtonState {
    pub fn digital(pressed: bool) -> Self {
        Self {
            pressed,
            value: if pressed { 1.0 } else { 0.0 },
        }
    }

    pub fn analog(value: f64) -> Self {
        Self {
            pressed: value > 0.1,
            value,
        }
    }
}

/// Full snapshot of one device's axes/buttons/connection status at a point
/// in time.
///
/// `connected: false` is the only disconnect signal in the protocol; there
/// is no separate removal message. `timestamp` is milliseconds since the
/// Unix epoch and is non-decreasing per device index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    pub axes: Vec<f64>,
    pub buttons: Vec<ButtonState>,
    pub connected: bool,
    pub timestamp: u64,
    pub id: String,
    pub mapping: String,
}

impl DeviceSnapshot {
    /// The snapshot a device leaves behind when it disappears: empty axes
    /// and buttons, `connected: false`.
    pub fn disconnected(timestamp: u64) -> Self {
        Self {
            axes: Vec::new(),
            buttons: Vec::new(),
            connected: false,
            timestamp,
            id: String::new(),
            mapping: String::new(),
        }
    }
}

/// The closed message catalog exchanged between host and worker.
///
/// Wire form is one JSON object per newline-terminated line, discriminated
/// by a kebab-case `type` field (`"device-state"`, `"key-down"`, ...).
/// Field names are snake_case. JSON string escaping guarantees no string
/// field can inject a raw newline into the framing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum BridgeMessage {
    /// Worker-side diagnostic forwarded into the host log.
    Log { message: String },

    /// Snapshot of one gamepad/analog device.
    DeviceState { index: u32, state: DeviceSnapshot },

    KeyDown {
        code: String,
        raw_code: u32,
        timestamp: u64,
    },
    KeyUp {
        code: String,
        raw_code: u32,
        timestamp: u64,
    },

    PointerMove {
        x: f64,
        y: f64,
        timestamp: u64,
    },
    PointerDown {
        x: f64,
        y: f64,
        button: u8,
        timestamp: u64,
    },
    PointerUp {
        x: f64,
        y: f64,
        button: u8,
        timestamp: u64,
    },
    PointerWheel {
        delta_x: f64,
        delta_y: f64,
        delta_z: f64,
        timestamp: u64,
    },

    /// Periodic liveness beacon, sent whether or not any device activity
    /// occurred.
    Heartbeat {
        device_count: u32,
        window_count: u32,
    },

    /// Asks the receiving host to begin its own graceful shutdown. Sent by
    /// a newly starting host to a suspected orphan of a prior generation.
    ShutdownRequest { originator_process_id: u32 },
}

impl BridgeMessage {
    /// The wire discriminator for this message, as it appears in the
    /// `type` field.
    pub fn kind(&self) -> &'static str {
        match self {
            BridgeMessage::Log { .. } => "log",
            BridgeMessage::DeviceState { .. } => "device-state",
            BridgeMessage::KeyDown { .. } => "key-down",
            BridgeMessage::KeyUp { .. } => "key-up",
            BridgeMessage::PointerMove { .. } => "pointer-move",
            BridgeMessage::PointerDown { .. } => "pointer-down",
            BridgeMessage::PointerUp { .. } => "pointer-up",
            BridgeMessage::PointerWheel { .. } => "pointer-wheel",
            BridgeMessage::Heartbeat { .. } => "heartbeat",
            BridgeMessage::ShutdownRequest { .. } => "shutdown-request",
        }
    }
}
