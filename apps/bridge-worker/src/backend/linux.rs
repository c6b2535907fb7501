//! evdev backend: reads `/dev/input/event*` devices directly.
//!
//! Works on both X11 and Wayland since it sits below the display server.
//! The process must be able to read the event nodes (typically membership
//! in the `input` group); devices the process cannot open are skipped, so
//! enumerating zero devices just means idling until a rescan finds one.
//!
//! Gamepads are reported as full snapshots in the standard-gamepad shape:
//! four stick axes, seventeen buttons with the triggers analog at slots 6
//! and 7, dpad from the hat axes. Axis values are normalized to -1..1 via
//! the kernel-reported ranges. Keyboards and pointers are reported as
//! discrete events. A device node can serve several roles at once (combo
//! receivers); routing is per event kind, not per device class.

use crate::backend::{BackendEvent, BackendHandle, MonotonicTimestamp, unix_millis};
use crate::error::WorkerError;
use crate::keycodes::logical_key_code;

use models::{ButtonState, DeviceSnapshot};

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use evdev::{AbsoluteAxisType, Device, InputEventKind, Key, RelativeAxisType, Synchronization};
use log::{debug, warn};
use tokio::sync::mpsc;
use tokio::time::sleep as TokioSleep;

/// How often the device set is rescanned for hot-plugged hardware.
const RESCAN_INTERVAL: Duration = Duration::from_secs(2);

/// Standard-gamepad shape.
const STANDARD_AXIS_COUNT: usize = 4;
const STANDARD_BUTTON_COUNT: usize = 17;

/// Trigger slots in the standard-gamepad button order.
const LEFT_TRIGGER_SLOT: usize = 6;
const RIGHT_TRIGGER_SLOT: usize = 7;

/// Dpad slots, driven by the hat axes.
const DPAD_UP_SLOT: usize = 12;
const DPAD_DOWN_SLOT: usize = 13;
const DPAD_LEFT_SLOT: usize = 14;
const DPAD_RIGHT_SLOT: usize = 15;

/// Keyboard keys live below the button range in the raw code space.
const FIRST_BUTTON_CODE: u16 = 0x100;

pub fn start(events: mpsc::Sender<BackendEvent>) -> Result<BackendHandle, WorkerError> {
    let device_count = Arc::new(AtomicUsize::new(0));
    let registry = Arc::new(Registry {
        events,
        open: Mutex::new(HashSet::new()),
        device_count: Arc::clone(&device_count),
        next_gamepad_index: AtomicU32::new(0),
    });

    let scan_task = tokio::spawn(scan_loop(registry));
    Ok(BackendHandle::new(device_count, scan_task))
}

/// Shared bookkeeping between the scan loop and the per-device readers.
struct Registry {
    events: mpsc::Sender<BackendEvent>,
    /// Paths of currently-open device nodes, so a rescan never opens a
    /// device twice.
    open: Mutex<HashSet<PathBuf>>,
    device_count: Arc<AtomicUsize>,
    /// Gamepad indices are never reused; a re-plugged pad gets a fresh one
    /// and the old index stays at its `connected: false` snapshot.
    next_gamepad_index: AtomicU32,
}

impl Registry {
    async fn milestone(&self, text: String) {
        let _ = self.events.send(BackendEvent::Milestone(text)).await;
    }

    fn claim(&self, path: &PathBuf) -> bool {
        let mut open = self.lock_open();
        if open.insert(path.clone()) {
            self.device_count.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    fn release(&self, path: &PathBuf) {
        if self.lock_open().remove(path) {
            self.device_count.fetch_sub(1, Ordering::Relaxed);
        }
    }

    fn lock_open(&self) -> std::sync::MutexGuard<'_, HashSet<PathBuf>> {
        self.open
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Initial scan plus periodic hot-plug rescans; cold-plug and hot-plug share
/// this one path.
async fn scan_loop(registry: Arc<Registry>) {
    let mut first_scan = true;
    loop {
        let opened = scan_once(&registry).await;
        if first_scan {
            registry
                .milestone(format!("Found {opened} input device(s)"))
                .await;
            first_scan = false;
        } else if opened > 0 {
            debug!("Rescan opened {opened} hot-plugged device(s)");
        }

        TokioSleep(RESCAN_INTERVAL).await;
    }
}

async fn scan_once(registry: &Arc<Registry>) -> usize {
    let mut opened = 0;

    for (path, device) in evdev::enumerate() {
        let Some(class) = classify(&device) else {
            continue;
        };
        if !registry.claim(&path) {
            continue;
        }

        let name = device.name().unwrap_or("Unknown").to_string();
        registry
            .milestone(format!("Opened {class:?} device: {name}"))
            .await;

        opened += 1;
        tokio::spawn(read_device(Arc::clone(registry), path, device, class, name));
    }

    opened
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeviceClass {
    Gamepad,
    Keyboard,
    Pointer,
}

/// Decide whether a device node is worth opening, and as what.
///
/// Gamepad wins over the other classes; a combo device classified as
/// keyboard still delivers its pointer events, since routing is per kind.
fn classify(device: &Device) -> Option<DeviceClass> {
    let keys = device.supported_keys();

    let has_gamepad_buttons = keys.is_some_and(|k| k.contains(Key::BTN_SOUTH));
    let has_stick = device
        .supported_absolute_axes()
        .is_some_and(|a| a.contains(AbsoluteAxisType::ABS_X));
    if has_gamepad_buttons && has_stick {
        return Some(DeviceClass::Gamepad);
    }

    if keys.is_some_and(|k| k.contains(Key::KEY_A) && k.contains(Key::KEY_ENTER)) {
        return Some(DeviceClass::Keyboard);
    }

    let has_pointer_button = keys.is_some_and(|k| k.contains(Key::BTN_LEFT));
    let has_motion = device
        .supported_relative_axes()
        .is_some_and(|r| r.contains(RelativeAxisType::REL_X));
    if has_pointer_button || has_motion {
        return Some(DeviceClass::Pointer);
    }

    None
}

/// Read one device node to completion, translating its events.
async fn read_device(
    registry: Arc<Registry>,
    path: PathBuf,
    device: Device,
    class: DeviceClass,
    name: String,
) {
    let mut gamepad = (class == DeviceClass::Gamepad).then(|| {
        let index = registry.next_gamepad_index.fetch_add(1, Ordering::Relaxed);
        GamepadTracker::from_device(index, &name, &device)
    });
    let mut pointer = PointerTracker::default();

    let mut stream = match device.into_event_stream() {
        Ok(stream) => stream,
        Err(e) => {
            warn!("Failed to open event stream for {}: {e}", path.display());
            registry.release(&path);
            return;
        }
    };

    // Full snapshot immediately after open, before any activity.
    if let Some(tracker) = gamepad.as_mut() {
        let snapshot = tracker.snapshot(unix_millis(SystemTime::now()));
        if send_device(&registry, tracker.index, snapshot).await.is_err() {
            registry.release(&path);
            return;
        }
    }

    loop {
        let event = match stream.next_event().await {
            Ok(event) => event,
            Err(e) => {
                debug!("Device {} gone: {e}", path.display());
                break;
            }
        };

        let timestamp = unix_millis(event.timestamp());
        let delivered = match event.kind() {
            InputEventKind::Key(key) => {
                translate_key(&registry, gamepad.as_mut(), &pointer, key, event.value(), timestamp)
                    .await
            }
            InputEventKind::AbsAxis(axis) => {
                if let Some(tracker) = gamepad.as_mut() {
                    tracker.absolute(axis, event.value());
                }
                Ok(())
            }
            InputEventKind::RelAxis(axis) => {
                pointer.relative(axis, event.value());
                Ok(())
            }
            InputEventKind::Synchronization(Synchronization::SYN_REPORT) => {
                flush_frame(&registry, gamepad.as_mut(), &mut pointer, timestamp).await
            }
            _ => Ok(()),
        };

        if delivered.is_err() {
            // Uplink is gone; the worker is on its way out.
            break;
        }
    }

    if let Some(tracker) = gamepad.as_ref() {
        let timestamp = unix_millis(SystemTime::now());
        let _ = send_device(
            &registry,
            tracker.index,
            DeviceSnapshot::disconnected(timestamp),
        )
        .await;
    }
    registry.milestone(format!("Lost device: {name}")).await;
    registry.release(&path);
}

async fn send_device(
    registry: &Registry,
    index: u32,
    snapshot: DeviceSnapshot,
) -> Result<(), ()> {
    registry
        .events
        .send(BackendEvent::Device { index, snapshot })
        .await
        .map_err(|_| ())
}

/// Route one key-class event: gamepad button, pointer button, or keyboard
/// key, decided by the raw code.
async fn translate_key(
    registry: &Registry,
    gamepad: Option<&mut GamepadTracker>,
    pointer: &PointerTracker,
    key: Key,
    value: i32,
    timestamp: u64,
) -> Result<(), ()> {
    // value 2 is autorepeat; a held key is already down.
    if value == 2 {
        return Ok(());
    }
    let pressed = value != 0;

    if let Some(tracker) = gamepad
        && let Some(slot) = gamepad_button_slot(key)
    {
        tracker.button(slot, pressed);
        return Ok(());
    }

    if let Some(button) = pointer_button(key) {
        return registry
            .events
            .send(BackendEvent::PointerButton {
                pressed,
                x: pointer.x,
                y: pointer.y,
                button,
                timestamp,
            })
            .await
            .map_err(|_| ());
    }

    if key.code() < FIRST_BUTTON_CODE {
        let raw_code = u32::from(key.code());
        return registry
            .events
            .send(BackendEvent::Key {
                pressed,
                code: logical_key_code(key.code()),
                raw_code,
                timestamp,
            })
            .await
            .map_err(|_| ());
    }

    Ok(())
}

/// End of one kernel event frame: emit whatever the frame changed.
async fn flush_frame(
    registry: &Registry,
    gamepad: Option<&mut GamepadTracker>,
    pointer: &mut PointerTracker,
    timestamp: u64,
) -> Result<(), ()> {
    if let Some(tracker) = gamepad
        && tracker.take_dirty()
    {
        let index = tracker.index;
        let snapshot = tracker.snapshot(timestamp);
        send_device(registry, index, snapshot).await?;
    }

    if pointer.take_moved() {
        registry
            .events
            .send(BackendEvent::PointerMove {
                x: pointer.x,
                y: pointer.y,
                timestamp,
            })
            .await
            .map_err(|_| ())?;
    }

    if let Some((delta_x, delta_y)) = pointer.take_wheel() {
        registry
            .events
            .send(BackendEvent::PointerWheel {
                delta_x,
                delta_y,
                delta_z: 0.0,
                timestamp,
            })
            .await
            .map_err(|_| ())?;
    }

    Ok(())
}

/// Standard-gamepad button order, as the rendering surface expects it.
fn gamepad_button_slot(key: Key) -> Option<usize> {
    let slot = match key {
        Key::BTN_SOUTH => 0,
        Key::BTN_EAST => 1,
        Key::BTN_NORTH => 2,
        Key::BTN_WEST => 3,
        Key::BTN_TL => 4,
        Key::BTN_TR => 5,
        Key::BTN_TL2 => LEFT_TRIGGER_SLOT,
        Key::BTN_TR2 => RIGHT_TRIGGER_SLOT,
        Key::BTN_SELECT => 8,
        Key::BTN_START => 9,
        Key::BTN_THUMBL => 10,
        Key::BTN_THUMBR => 11,
        Key::BTN_DPAD_UP => DPAD_UP_SLOT,
        Key::BTN_DPAD_DOWN => DPAD_DOWN_SLOT,
        Key::BTN_DPAD_LEFT => DPAD_LEFT_SLOT,
        Key::BTN_DPAD_RIGHT => DPAD_RIGHT_SLOT,
        Key::BTN_MODE => 16,
        _ => return None,
    };
    Some(slot)
}

/// Pointer buttons in UI-event numbering: 0 left, 1 middle, 2 right.
fn pointer_button(key: Key) -> Option<u8> {
    let button = match key {
        Key::BTN_LEFT => 0,
        Key::BTN_MIDDLE => 1,
        Key::BTN_RIGHT => 2,
        Key::BTN_SIDE => 3,
        Key::BTN_EXTRA => 4,
        _ => return None,
    };
    Some(button)
}

/// Accumulated state of one gamepad between event frames.
struct GamepadTracker {
    index: u32,
    id: String,
    axes: [f64; STANDARD_AXIS_COUNT],
    buttons: [ButtonState; STANDARD_BUTTON_COUNT],
    /// Kernel-reported (minimum, maximum) per raw axis code.
    ranges: [Option<(i32, i32)>; 64],
    timestamps: MonotonicTimestamp,
    dirty: bool,
}

impl GamepadTracker {
    fn from_device(index: u32, name: &str, device: &Device) -> Self {
        let mut ranges = [None; 64];
        if let Ok(abs_state) = device.get_abs_state() {
            for (code, info) in abs_state.iter().enumerate() {
                if info.minimum != info.maximum {
                    ranges[code] = Some((info.minimum, info.maximum));
                }
            }
        }

        Self {
            index,
            id: format!("evdev Gamepad ({name})"),
            axes: [0.0; STANDARD_AXIS_COUNT],
            buttons: [ButtonState::digital(false); STANDARD_BUTTON_COUNT],
            ranges,
            timestamps: MonotonicTimestamp::default(),
            dirty: true,
        }
    }

    fn button(&mut self, slot: usize, pressed: bool) {
        self.buttons[slot] = ButtonState::digital(pressed);
        self.dirty = true;
    }

    fn absolute(&mut self, axis: AbsoluteAxisType, raw: i32) {
        match axis {
            AbsoluteAxisType::ABS_X => self.axes[0] = self.stick(axis, raw),
            AbsoluteAxisType::ABS_Y => self.axes[1] = self.stick(axis, raw),
            AbsoluteAxisType::ABS_RX => self.axes[2] = self.stick(axis, raw),
            AbsoluteAxisType::ABS_RY => self.axes[3] = self.stick(axis, raw),
            AbsoluteAxisType::ABS_Z | AbsoluteAxisType::ABS_BRAKE => {
                self.buttons[LEFT_TRIGGER_SLOT] = ButtonState::analog(self.trigger(axis, raw));
            }
            AbsoluteAxisType::ABS_RZ | AbsoluteAxisType::ABS_GAS => {
                self.buttons[RIGHT_TRIGGER_SLOT] = ButtonState::analog(self.trigger(axis, raw));
            }
            AbsoluteAxisType::ABS_HAT0X => {
                self.buttons[DPAD_LEFT_SLOT] = ButtonState::digital(raw < 0);
                self.buttons[DPAD_RIGHT_SLOT] = ButtonState::digital(raw > 0);
            }
            AbsoluteAxisType::ABS_HAT0Y => {
                self.buttons[DPAD_UP_SLOT] = ButtonState::digital(raw < 0);
                self.buttons[DPAD_DOWN_SLOT] = ButtonState::digital(raw > 0);
            }
            _ => return,
        }
        self.dirty = true;
    }

    /// Normalize a stick axis to -1..1 via the kernel-reported range.
    fn stick(&self, axis: AbsoluteAxisType, raw: i32) -> f64 {
        match self.ranges[axis.0 as usize] {
            Some((min, max)) => {
                let span = f64::from(max) - f64::from(min);
                -1.0 + 2.0 * (f64::from(raw) - f64::from(min)) / span
            }
            None => 0.0,
        }
    }

    /// Normalize a trigger axis to 0..1.
    fn trigger(&self, axis: AbsoluteAxisType, raw: i32) -> f64 {
        match self.ranges[axis.0 as usize] {
            Some((min, max)) => {
                let span = f64::from(max) - f64::from(min);
                (f64::from(raw) - f64::from(min)) / span
            }
            None => 0.0,
        }
    }

    fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    fn snapshot(&mut self, timestamp: u64) -> DeviceSnapshot {
        DeviceSnapshot {
            axes: self.axes.to_vec(),
            buttons: self.buttons.to_vec(),
            connected: true,
            timestamp: self.timestamps.stamp(timestamp),
            id: self.id.clone(),
            mapping: String::from("standard"),
        }
    }
}

/// Accumulated pointer state between event frames.
#[derive(Default)]
struct PointerTracker {
    x: f64,
    y: f64,
    moved: bool,
    wheel_x: f64,
    wheel_y: f64,
    wheeled: bool,
}

impl PointerTracker {
    fn relative(&mut self, axis: RelativeAxisType, value: i32) {
        match axis {
            RelativeAxisType::REL_X => {
                self.x += f64::from(value);
                self.moved = true;
            }
            RelativeAxisType::REL_Y => {
                self.y += f64::from(value);
                self.moved = true;
            }
            RelativeAxisType::REL_HWHEEL => {
                self.wheel_x += f64::from(value);
                self.wheeled = true;
            }
            RelativeAxisType::REL_WHEEL => {
                self.wheel_y += f64::from(value);
                self.wheeled = true;
            }
            _ => {}
        }
    }

    fn take_moved(&mut self) -> bool {
        std::mem::take(&mut self.moved)
    }

    fn take_wheel(&mut self) -> Option<(f64, f64)> {
        if !std::mem::take(&mut self.wheeled) {
            return None;
        }
        let deltas = (self.wheel_x, self.wheel_y);
        self.wheel_x = 0.0;
        self.wheel_y = 0.0;
        Some(deltas)
    }
}
