//! Stand-in rendering surface.
//!
//! The real product draws these events onto an overlay canvas; that whole
//! editor sits outside this repository. This surface keeps just enough
//! state to narrate the stream: which device indices are present, and a
//! log line per event.

use bridge_core::server::DeviceEventSink;

use models::BridgeMessage;

use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
pub struct OverlaySurface {
    /// Connected flag per device index, for attach/detach transitions.
    devices: Mutex<HashMap<u32, bool>>,
}

impl OverlaySurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many device indices are currently connected.
    pub fn connected_device_count(&self) -> usize {
        self.lock().values().filter(|connected| **connected).count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<u32, bool>> {
        self.devices
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl DeviceEventSink for OverlaySurface {
    fn on_device_event(&self, message: &BridgeMessage) {
        match message {
            BridgeMessage::DeviceState { index, state } => {
                let was_connected = self.lock().insert(*index, state.connected);
                match (was_connected, state.connected) {
                    (None | Some(false), true) => {
                        log::info!("Device {index} attached: {}", state.id);
                    }
                    (Some(true), false) => {
                        log::info!("Device {index} detached");
                    }
                    _ => log::debug!(
                        "Device {index}: {} axes, {} buttons",
                        state.axes.len(),
                        state.buttons.len()
                    ),
                }
            }
            BridgeMessage::KeyDown { code, .. } => log::debug!("Key down: {code}"),
            BridgeMessage::KeyUp { code, .. } => log::debug!("Key up: {code}"),
            BridgeMessage::PointerMove { x, y, .. } => log::debug!("Pointer at ({x}, {y})"),
            BridgeMessage::PointerDown { button, .. } => log::debug!("Pointer button {button} down"),
            BridgeMessage::PointerUp { button, .. } => log::debug!("Pointer button {button} up"),
            BridgeMessage::PointerWheel {
                delta_x, delta_y, ..
            } => log::debug!("Wheel ({delta_x}, {delta_y})"),
            other => log::debug!("Unhandled message on surface: {}", other.kind()),
        }
    }
}
