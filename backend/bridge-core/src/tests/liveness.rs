// Unit tests for the liveness monitor and its advisory watchdog.

use crate::liveness::LivenessMonitor;

use std::time::Duration;

/// Recording a heartbeat updates the shared record all clones observe.
#[test]
fn given_heartbeat_when_recorded_then_visible_through_clones() {
    let monitor = LivenessMonitor::new();
    let observer = monitor.clone();

    monitor.record(3, 1);

    assert_eq!(observer.device_count(), 3);
    assert!(observer.last_heartbeat().is_some());
    assert!(!observer.is_stalled());
}

/// `reset` discards the previous connection's heartbeats so a fresh worker
/// is not blamed for its predecessor's silence.
#[test]
fn given_reset_then_previous_heartbeats_forgotten() {
    let monitor = LivenessMonitor::new();
    monitor.record(5, 0);

    monitor.reset();

    assert!(monitor.last_heartbeat().is_none());
    assert_eq!(monitor.device_count(), 0);
}

/// **VALUE**: Verifies the watchdog flags a worker whose heartbeats stop
/// while its socket stays open.
///
/// **WHY THIS MATTERS**: Connection close is the only termination signal in
/// the protocol; a hung worker keeps its socket open forever. The stall flag
/// (and its warning) is the only way the condition becomes visible.
///
/// **BUG THIS CATCHES**: Would catch a watchdog that measures from the wrong
/// baseline and never fires when zero heartbeats have arrived at all.
#[tokio::test]
async fn given_no_heartbeats_when_threshold_passes_then_stall_flagged() {
    // GIVEN: A watchdog with a 20ms interval and 3x threshold
    let monitor = LivenessMonitor::new();
    monitor.reset();
    let watchdog = monitor.spawn_watchdog(Duration::from_millis(20), 3);

    // WHEN: Well over 3 intervals pass without a heartbeat
    tokio::time::sleep(Duration::from_millis(200)).await;

    // THEN: The stall is flagged (advisory only - nothing is killed)
    assert!(monitor.is_stalled(), "Watchdog should have flagged the stall");

    watchdog.abort();
}

/// A heartbeat arriving after a stall clears the flag (recovery).
#[tokio::test]
async fn given_stalled_worker_when_heartbeat_arrives_then_recovers() {
    let monitor = LivenessMonitor::new();
    monitor.reset();
    let watchdog = monitor.spawn_watchdog(Duration::from_millis(20), 3);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(monitor.is_stalled());

    monitor.record(1, 0);

    assert!(!monitor.is_stalled(), "Heartbeat should clear the stall flag");
    watchdog.abort();
}

/// A worker beating on schedule is never flagged.
#[tokio::test]
async fn given_regular_heartbeats_then_never_flagged() {
    let monitor = LivenessMonitor::new();
    monitor.reset();
    let watchdog = monitor.spawn_watchdog(Duration::from_millis(20), 3);

    for _ in 0..8 {
        monitor.record(1, 0);
        tokio::time::sleep(Duration::from_millis(15)).await;
    }

    assert!(!monitor.is_stalled());
    watchdog.abort();
}
