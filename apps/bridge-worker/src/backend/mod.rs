//! Input backend boundary.
//!
//! The native device-polling subsystem lives behind this module: it pushes
//! [`BackendEvent`] values into a channel and the uplink turns them into
//! wire messages. The rest of the worker never touches a device handle.
//!
//! Linux is the one supported backend (evdev). On other targets [`start`]
//! fails with the unrecoverable-init-error path: the worker logs it, mirrors
//! it to the host, and exits non-zero.

#[cfg(target_os = "linux")]
mod linux;

use crate::error::WorkerError;

use models::DeviceSnapshot;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Capacity of the backend-to-uplink event channel. Device-state bursts at
/// polling rate are the sizing concern here, not steady state.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// One translated occurrence from the native polling subsystem.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent {
    /// Full snapshot of one analog device, including the `connected: false`
    /// snapshot a device leaves behind when it disappears.
    Device { index: u32, snapshot: DeviceSnapshot },

    Key {
        pressed: bool,
        code: String,
        raw_code: u32,
        timestamp: u64,
    },

    PointerMove {
        x: f64,
        y: f64,
        timestamp: u64,
    },

    PointerButton {
        pressed: bool,
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

    /// A worker milestone (device opened, device lost, scan trouble) worth
    /// mirroring into the host's log.
    Milestone(String),
}

/// A running input backend.
///
/// Dropping the handle stops device scanning; per-device readers end when
/// their device disappears or the worker process exits.
pub struct BackendHandle {
    device_count: Arc<AtomicUsize>,
    scan_task: JoinHandle<()>,
}

impl BackendHandle {
    pub(crate) fn new(device_count: Arc<AtomicUsize>, scan_task: JoinHandle<()>) -> Self {
        Self {
            device_count,
            scan_task,
        }
    }

    /// Number of currently-open devices, as reported in heartbeats.
    pub fn open_device_count(&self) -> u32 {
        self.device_count.load(Ordering::Relaxed) as u32
    }
}

impl Drop for BackendHandle {
    fn drop(&mut self) {
        self.scan_task.abort();
    }
}

/// Open the native device-polling subsystem and start streaming events.
///
/// Enumerating zero devices is not an error (the common no-permission case);
/// the worker then idles with heartbeats until a rescan finds something.
///
/// # Errors
///
/// Returns [`WorkerError::Backend`] when the platform has no backend or the
/// subsystem cannot be opened at all.
#[cfg(target_os = "linux")]
pub fn start(events: mpsc::Sender<BackendEvent>) -> Result<BackendHandle, WorkerError> {
    linux::start(events)
}

#[cfg(not(target_os = "linux"))]
pub fn start(_events: mpsc::Sender<BackendEvent>) -> Result<BackendHandle, WorkerError> {
    Err(WorkerError::Backend {
        message: "No input backend is available on this platform".to_string(),
        location: common::ErrorLocation::here(),
    })
}

/// Per-device wall-clock stamps, clamped so they never go backwards.
///
/// Consumers rely on device-state timestamps being non-decreasing per
/// device; the system clock makes no such promise across adjustments.
#[derive(Debug, Default)]
pub struct MonotonicTimestamp {
    last: u64,
}

impl MonotonicTimestamp {
    /// Clamp `candidate` against everything stamped before it.
    pub fn stamp(&mut self, candidate: u64) -> u64 {
        self.last = self.last.max(candidate);
        self.last
    }
}

/// Milliseconds since the Unix epoch, saturating at zero for clocks set
/// before it.
pub fn unix_millis(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}
