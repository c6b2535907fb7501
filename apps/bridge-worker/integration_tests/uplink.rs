// Integration tests for the worker's uplink over a real loopback socket.
// The host side is emulated with a raw TcpListener plus the real codec, so
// these exercise the exact byte stream the channel server will see.

use bridge_worker::args::WorkerArgs;
use bridge_worker::backend::BackendEvent;
use bridge_worker::uplink::{UplinkEnd, connect, run_uplink};

use bridge_core::codec::LineDecoder;
use bridge_core::protocol;

use models::{BridgeMessage, ButtonState, DeviceSnapshot};

use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout as TokioTimeout;

const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Bind an ephemeral host-side listener and connect the worker to it.
async fn host_and_worker() -> (TcpStream, TcpStream, WorkerArgs) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test listener");
    let port = listener.local_addr().expect("No local address").port();

    let args = WorkerArgs {
        port,
        host_pid: 777,
    };
    let worker_stream = connect(&args).await.expect("Worker failed to connect");
    let (host_stream, _) = listener.accept().await.expect("Accept failed");

    (host_stream, worker_stream, args)
}

/// Read and parse messages from the host side until `count` have arrived.
async fn read_messages(stream: &mut TcpStream, count: usize) -> Vec<BridgeMessage> {
    let mut decoder = LineDecoder::new();
    let mut buffer = [0u8; 1024];
    let mut messages = Vec::new();

    while messages.len() < count {
        let n = stream.read(&mut buffer).await.expect("Host read failed");
        assert!(n > 0, "Worker closed the connection early");
        for line in decoder.feed(&buffer[..n]) {
            messages.push(protocol::parse(&line).expect("Worker sent a malformed line"));
        }
    }

    messages
}

fn sample_snapshot() -> DeviceSnapshot {
    DeviceSnapshot {
        axes: vec![0.5, -0.5, 0.0, 0.0],
        buttons: vec![ButtonState::digital(true)],
        connected: true,
        timestamp: 12_345,
        id: String::from("evdev Gamepad (Uplink Pad)"),
        mapping: String::from("standard"),
    }
}

/// **VALUE**: Verifies the full worker-to-host pipeline: ready milestone
/// first, then backend events, framed so the real codec parses them.
///
/// **WHY THIS MATTERS**: This is the exact byte stream the channel server
/// decodes in production. A framing or serialization mismatch between the
/// two processes shows up here, not in either side's unit tests.
#[tokio::test]
async fn given_backend_events_when_uplinked_then_host_parses_them_in_order() {
    let (mut host, worker, args) = host_and_worker().await;
    let (events_tx, events_rx) = mpsc::channel(16);

    let uplink = tokio::spawn(async move {
        // Heartbeat far in the future so it cannot interleave here.
        run_uplink(worker, &args, events_rx, || 1, Duration::from_secs(60)).await
    });

    events_tx
        .send(BackendEvent::Device {
            index: 0,
            snapshot: sample_snapshot(),
        })
        .await
        .unwrap();
    events_tx
        .send(BackendEvent::Key {
            pressed: true,
            code: String::from("Space"),
            raw_code: 57,
            timestamp: 12_400,
        })
        .await
        .unwrap();

    // Ready log, the immediate heartbeat tick, and the two events.
    let messages = TokioTimeout(TEST_TIMEOUT, read_messages(&mut host, 4))
        .await
        .expect("Timed out waiting for messages");

    // The heartbeat may land between our events, so pick the interesting
    // kinds out rather than asserting exact positions.
    match &messages[0] {
        BridgeMessage::Log { message } => {
            assert!(message.contains("Ready"), "First message should be the ready log");
            assert!(message.contains("777"), "Ready log should carry the host PID");
        }
        other => panic!("Expected ready log first, got {other:?}"),
    }

    let device = messages
        .iter()
        .find(|m| matches!(m, BridgeMessage::DeviceState { .. }))
        .expect("Device state should arrive");
    assert_eq!(
        device,
        &BridgeMessage::DeviceState {
            index: 0,
            state: sample_snapshot(),
        }
    );

    let key = messages
        .iter()
        .find(|m| matches!(m, BridgeMessage::KeyDown { .. }))
        .expect("Key event should arrive");
    assert_eq!(
        key,
        &BridgeMessage::KeyDown {
            code: String::from("Space"),
            raw_code: 57,
            timestamp: 12_400,
        }
    );

    drop(host);
    let end = TokioTimeout(TEST_TIMEOUT, uplink)
        .await
        .expect("Uplink did not end after host close")
        .unwrap();
    assert_eq!(end, UplinkEnd::HostClosed);
}

/// **VALUE**: Verifies heartbeats flow on their own, with the sampled
/// device count, independent of any device activity.
#[tokio::test]
async fn given_quiet_backend_when_interval_elapses_then_heartbeats_arrive() {
    let (mut host, worker, args) = host_and_worker().await;
    let (_events_tx, events_rx) = mpsc::channel::<BackendEvent>(16);

    let uplink = tokio::spawn(async move {
        run_uplink(worker, &args, events_rx, || 3, Duration::from_millis(50)).await
    });

    // Ready log plus at least two beats.
    let messages = TokioTimeout(TEST_TIMEOUT, read_messages(&mut host, 3))
        .await
        .expect("Timed out waiting for heartbeats");

    let beats: Vec<_> = messages
        .iter()
        .filter(|m| matches!(m, BridgeMessage::Heartbeat { .. }))
        .collect();
    assert!(beats.len() >= 2, "Expected repeated heartbeats, got {messages:?}");
    assert!(
        beats
            .iter()
            .all(|b| matches!(b, BridgeMessage::Heartbeat { device_count: 3, window_count: 0 })),
        "Heartbeats should carry the sampled device count"
    );

    drop(host);
    let _ = TokioTimeout(TEST_TIMEOUT, uplink).await;
}

/// **VALUE**: Verifies the worker treats a closed host connection as its
/// signal to exit cleanly - the self-termination contract the supervisor
/// depends on to avoid orphaned workers.
#[tokio::test]
async fn given_host_closes_connection_then_uplink_ends_host_closed() {
    let (host, worker, args) = host_and_worker().await;
    let (_events_tx, events_rx) = mpsc::channel::<BackendEvent>(16);

    drop(host);

    let end = TokioTimeout(
        TEST_TIMEOUT,
        run_uplink(worker, &args, events_rx, || 0, Duration::from_secs(60)),
    )
    .await
    .expect("Uplink did not notice the closed connection");

    assert_eq!(end, UplinkEnd::HostClosed);
}

/// The backend channel closing ends the uplink rather than leaving the
/// select loop spinning on a dead receiver.
#[tokio::test]
async fn given_backend_channel_closed_then_uplink_ends_backend_closed() {
    let (_host, worker, args) = host_and_worker().await;
    let (events_tx, events_rx) = mpsc::channel::<BackendEvent>(16);

    drop(events_tx);

    let end = TokioTimeout(
        TEST_TIMEOUT,
        run_uplink(worker, &args, events_rx, || 0, Duration::from_secs(60)),
    )
    .await
    .expect("Uplink did not notice the closed backend channel");

    assert_eq!(end, UplinkEnd::BackendClosed);
}
