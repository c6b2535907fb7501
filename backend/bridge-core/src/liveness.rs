//! Liveness monitor: tracks the worker's periodic heartbeat messages.
//!
//! Advisory only. A worker that stops heartbeating but keeps its socket open
//! gets a stall warning in the host log; connection close remains the sole
//! termination signal. The watchdog never kills anything.

use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;

use log::{debug, info, warn};
use tokio::task::JoinHandle;
use tokio::time::interval as TokioInterval;

/// Shared heartbeat record for one worker connection.
///
/// Cloning is cheap; all clones observe the same record. The channel server
/// records heartbeats as they arrive, the supervisor owns the watchdog task.
#[derive(Clone, Default)]
pub struct LivenessMonitor {
    inner: Arc<Mutex<LivenessRecord>>,
}

#[derive(Default)]
struct LivenessRecord {
    last_heartbeat: Option<Instant>,
    device_count: u32,
    window_count: u32,
    stalled: bool,
    /// Baseline for the "never heartbeated at all" case.
    watching_since: Option<Instant>,
}

impl LivenessMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one heartbeat. Called by the channel server's dispatch path.
    pub fn record(&self, device_count: u32, window_count: u32) {
        let mut record = self.lock();
        record.last_heartbeat = Some(Instant::now());
        record.device_count = device_count;
        record.window_count = window_count;
        if record.stalled {
            record.stalled = false;
            info!("Worker heartbeats resumed ({device_count} device(s) open)");
        } else {
            debug!("Heartbeat: {device_count} device(s), {window_count} window(s)");
        }
    }

    /// Forget the previous connection's heartbeats. Called when a new worker
    /// connects so its predecessor's silence is not held against it.
    pub fn reset(&self) {
        let mut record = self.lock();
        *record = LivenessRecord {
            watching_since: Some(Instant::now()),
            ..LivenessRecord::default()
        };
    }

    pub fn last_heartbeat(&self) -> Option<Instant> {
        self.lock().last_heartbeat
    }

    pub fn device_count(&self) -> u32 {
        self.lock().device_count
    }

    pub fn is_stalled(&self) -> bool {
        self.lock().stalled
    }

    /// Spawn the watchdog task.
    ///
    /// Warns once when `stall_multiplier` heartbeat intervals pass without a
    /// heartbeat, and logs recovery when one arrives again. The returned
    /// handle is owned by the supervisor, which aborts it on shutdown.
    pub fn spawn_watchdog(
        &self,
        heartbeat_interval: Duration,
        stall_multiplier: u32,
    ) -> JoinHandle<()> {
        let monitor = self.clone();
        let threshold = heartbeat_interval * stall_multiplier;

        tokio::spawn(async move {
            let mut ticker = TokioInterval(heartbeat_interval);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                monitor.check_stall(threshold);
            }
        })
    }

    fn check_stall(&self, threshold: Duration) {
        let mut record = self.lock();

        let since = match (record.last_heartbeat, record.watching_since) {
            (Some(beat), _) => beat.elapsed(),
            (None, Some(start)) => start.elapsed(),
            (None, None) => return,
        };

        if since > threshold && !record.stalled {
            record.stalled = true;
            warn!(
                "No heartbeat from worker for {since:?} (threshold {threshold:?}); \
                 connection is still open, treating the worker as stalled"
            );
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LivenessRecord> {
        // The mutex only guards plain field updates; a poisoned lock means a
        // panic mid-update, and the record is still usable.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
