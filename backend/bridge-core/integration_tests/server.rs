// Integration tests for the host channel server over real loopback sockets.
// The worker's side of the channel is emulated with raw TcpStreams speaking
// the real wire protocol (see helpers.rs).

use crate::helpers::{
    CollectingSink, connect_worker, sample_device_state, send_message, wait_for,
};

use bridge_core::liveness::LivenessMonitor;
use bridge_core::server::{DeviceEventSink, ServerEvent, start_channel_server};

use models::BridgeMessage;

use std::sync::Arc;
use std::time::Duration;

use serial_test::serial;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::time::timeout as TokioTimeout;

const EVENT_TIMEOUT: Duration = Duration::from_secs(3);

async fn recv_event(events: &mut mpsc::Receiver<ServerEvent>) -> ServerEvent {
    TokioTimeout(EVENT_TIMEOUT, events.recv())
        .await
        .expect("Timed out waiting for server event")
        .expect("Server event channel closed")
}

/// **VALUE**: Verifies the happy path end to end: accept, decode, forward
/// to the sink in arrival order, and report the connection's lifecycle with
/// a consistent generation.
#[tokio::test]
#[serial]
async fn given_worker_connection_when_messages_sent_then_forwarded_in_order() {
    let port = 42210;
    let sink = Arc::new(CollectingSink::default());
    let liveness = LivenessMonitor::new();
    let (events_tx, mut events) = mpsc::channel(16);

    let server = start_channel_server(port, Arc::clone(&sink) as Arc<dyn DeviceEventSink>, liveness, events_tx)
        .await
        .expect("Server should bind");

    let mut worker = connect_worker(port).await;
    let connected = recv_event(&mut events).await;
    let ServerEvent::WorkerConnected { generation } = connected else {
        panic!("Expected WorkerConnected, got {connected:?}");
    };

    send_message(&mut worker, &sample_device_state(0, 100)).await;
    send_message(&mut worker, &sample_device_state(0, 200)).await;
    send_message(&mut worker, &sample_device_state(1, 150)).await;

    assert!(
        wait_for(|| sink.count() == 3, EVENT_TIMEOUT).await,
        "All three device states should reach the sink"
    );
    let received = sink.received();
    assert_eq!(received[0], sample_device_state(0, 100));
    assert_eq!(received[1], sample_device_state(0, 200));
    assert_eq!(received[2], sample_device_state(1, 150));

    worker.shutdown().await.expect("Worker shutdown failed");
    drop(worker);
    assert_eq!(
        recv_event(&mut events).await,
        ServerEvent::WorkerDisconnected { generation },
        "Disconnect should carry the same generation as the connect"
    );

    server.close();
}

/// **VALUE**: Verifies the documented single-connection policy: a second
/// connection while one is active is rejected (its socket closed), the
/// active connection keeps flowing, and nothing is forwarded twice.
///
/// **BUG THIS CATCHES**: Would catch a server that silently accepts both
/// sockets, which would let a stray second worker double-feed the overlay.
#[tokio::test]
#[serial]
async fn given_active_connection_when_second_connects_then_rejected() {
    let port = 42211;
    let sink = Arc::new(CollectingSink::default());
    let (events_tx, mut events) = mpsc::channel(16);

    let server = start_channel_server(
        port,
        Arc::clone(&sink) as Arc<dyn DeviceEventSink>,
        LivenessMonitor::new(),
        events_tx,
    )
    .await
    .expect("Server should bind");

    let mut first = connect_worker(port).await;
    recv_event(&mut events).await;

    // The newcomer's socket is dropped by the server; reading it must
    // reach EOF (or a reset) without any WorkerConnected event.
    let mut second = connect_worker(port).await;
    let mut probe = [0u8; 8];
    let second_read = TokioTimeout(EVENT_TIMEOUT, second.read(&mut probe))
        .await
        .expect("Rejected socket was left open");
    assert!(
        matches!(second_read, Ok(0) | Err(_)),
        "Rejected connection should be closed, got {second_read:?}"
    );

    // The active connection is untouched.
    send_message(&mut first, &sample_device_state(0, 300)).await;
    assert!(
        wait_for(|| sink.count() == 1, EVENT_TIMEOUT).await,
        "First connection should keep forwarding"
    );

    server.close();
}

/// **VALUE**: Verifies protocol faults are recoverable per line: malformed
/// content and unknown kinds are dropped/logged and the same connection
/// keeps delivering later messages.
#[tokio::test]
#[serial]
async fn given_malformed_and_unknown_lines_then_connection_survives() {
    let port = 42212;
    let sink = Arc::new(CollectingSink::default());
    let (events_tx, mut events) = mpsc::channel(16);

    let server = start_channel_server(
        port,
        Arc::clone(&sink) as Arc<dyn DeviceEventSink>,
        LivenessMonitor::new(),
        events_tx,
    )
    .await
    .expect("Server should bind");

    let mut worker = connect_worker(port).await;
    recv_event(&mut events).await;

    worker
        .write_all(b"this is not a message\n")
        .await
        .expect("Write failed");
    worker
        .write_all(b"{\"type\":\"telemetry-v9\",\"payload\":42}\n")
        .await
        .expect("Write failed");
    worker.write_all(b"\n   \n").await.expect("Write failed");
    send_message(&mut worker, &sample_device_state(2, 400)).await;

    assert!(
        wait_for(|| sink.count() == 1, EVENT_TIMEOUT).await,
        "The valid message after the garbage should still arrive"
    );
    assert_eq!(sink.received()[0], sample_device_state(2, 400));

    server.close();
}

/// Heartbeats are routed to the liveness monitor, not the sink.
#[tokio::test]
#[serial]
async fn given_heartbeat_then_liveness_recorded_and_sink_untouched() {
    let port = 42213;
    let sink = Arc::new(CollectingSink::default());
    let liveness = LivenessMonitor::new();
    let (events_tx, mut events) = mpsc::channel(16);

    let server = start_channel_server(
        port,
        Arc::clone(&sink) as Arc<dyn DeviceEventSink>,
        liveness.clone(),
        events_tx,
    )
    .await
    .expect("Server should bind");

    let mut worker = connect_worker(port).await;
    recv_event(&mut events).await;

    send_message(
        &mut worker,
        &BridgeMessage::Heartbeat {
            device_count: 4,
            window_count: 1,
        },
    )
    .await;

    assert!(
        wait_for(|| liveness.last_heartbeat().is_some(), EVENT_TIMEOUT).await,
        "Heartbeat should be recorded"
    );
    assert_eq!(liveness.device_count(), 4);
    assert_eq!(sink.count(), 0, "Heartbeats must not reach the sink");

    server.close();
}

/// A `shutdown-request` over the channel surfaces as a supervisor event
/// carrying the requesting process's identifier.
#[tokio::test]
#[serial]
async fn given_shutdown_request_then_event_with_originator() {
    let port = 42214;
    let sink = Arc::new(CollectingSink::default());
    let (events_tx, mut events) = mpsc::channel(16);

    let server = start_channel_server(
        port,
        Arc::clone(&sink) as Arc<dyn DeviceEventSink>,
        LivenessMonitor::new(),
        events_tx,
    )
    .await
    .expect("Server should bind");

    let mut worker = connect_worker(port).await;
    let ServerEvent::WorkerConnected { generation } = recv_event(&mut events).await else {
        panic!("Expected WorkerConnected first");
    };

    send_message(
        &mut worker,
        &BridgeMessage::ShutdownRequest {
            originator_process_id: 9876,
        },
    )
    .await;

    assert_eq!(
        recv_event(&mut events).await,
        ServerEvent::ShutdownRequested {
            generation,
            originator_process_id: 9876,
        }
    );
    assert_eq!(sink.count(), 0, "Shutdown requests must not reach the sink");

    server.close();
}

/// **VALUE**: Verifies bind-or-fail is the port claim: a second server on
/// the same port fails fast instead of silently coexisting.
#[tokio::test]
#[serial]
async fn given_port_already_bound_when_binding_again_then_fails_fast() {
    let port = 42215;
    let (first_tx, _first_events) = mpsc::channel(16);
    let first = start_channel_server(
        port,
        Arc::new(CollectingSink::default()),
        LivenessMonitor::new(),
        first_tx,
    )
    .await
    .expect("First server should bind");

    let (second_tx, _second_events) = mpsc::channel(16);
    let second = start_channel_server(
        port,
        Arc::new(CollectingSink::default()),
        LivenessMonitor::new(),
        second_tx,
    )
    .await;

    assert!(second.is_err(), "Second bind on the same port must fail");

    first.close();
}
