// Integration tests for the lifecycle state machine against real child
// processes and real loopback sockets. Workers are stood in for by shell
// commands via the worker command override (see helpers.rs).

use crate::helpers::{
    CollectingSink, connect_worker, sample_device_state, send_message, shell_worker,
    sleeping_worker, test_config,
};

use bridge_core::codec::LineDecoder;
use bridge_core::error::supervisor::SupervisorError;
use bridge_core::protocol;
use bridge_core::server::DeviceEventSink;
use bridge_core::supervisor::{LifecycleState, Supervisor, SupervisorHandle};

use models::BridgeMessage;

use std::sync::Arc;
use std::time::{Duration, Instant};

use serial_test::serial;
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::time::{sleep as TokioSleep, timeout as TokioTimeout};

const RUN_TIMEOUT: Duration = Duration::from_secs(10);

fn new_supervisor(
    port: u16,
    worker: Option<Vec<String>>,
) -> (Supervisor, SupervisorHandle, Arc<CollectingSink>) {
    let sink = Arc::new(CollectingSink::default());
    let (supervisor, handle) = Supervisor::new(test_config(port, worker), Arc::clone(&sink) as Arc<dyn DeviceEventSink>);
    (supervisor, handle, sink)
}

/// **VALUE**: Verifies the orphan-free startup property: with the port
/// free, the machine goes straight from the probe to `Spawning` - no
/// shutdown-request detour, no poll wait.
#[tokio::test]
#[serial]
async fn given_free_port_when_starting_then_no_orphan_detour() {
    let (mut supervisor, _handle, _sink) = new_supervisor(42310, sleeping_worker());

    let started_at = Instant::now();
    supervisor.start().await.expect("Startup should succeed");

    assert_eq!(supervisor.state(), LifecycleState::AwaitingConnection);
    assert_eq!(
        supervisor.history(),
        &[
            LifecycleState::Idle,
            LifecycleState::CheckingForOrphan,
            LifecycleState::Spawning,
            LifecycleState::AwaitingConnection,
        ],
        "No orphan states should appear when the port is free"
    );
    assert!(
        started_at.elapsed() < Duration::from_millis(500),
        "Free-port startup must not sit out the poll timeout"
    );

    supervisor.shutdown().await;
}

/// **VALUE**: Verifies cross-generation orphan eviction end to end: the
/// new host probes the occupied port, sends a `shutdown-request` carrying
/// its own PID, and proceeds once the prior owner releases the port.
///
/// **WHY THIS MATTERS**: This is the crash-recovery path. After an
/// ungraceful exit, the next launch must reclaim the well-known port from
/// whatever generation still holds it.
#[tokio::test]
#[serial]
async fn given_cooperative_orphan_when_starting_then_evicted_and_startup_proceeds() {
    let port = 42311;

    // Stand-in orphan: owns the port, releases it when asked to shut down.
    let orphan = TcpListener::bind(format!("127.0.0.1:{port}"))
        .await
        .expect("Orphan should bind first");
    let (request_tx, request_rx) = oneshot::channel();
    tokio::spawn(async move {
        // First probe connection: accepted and dropped.
        let _ = orphan.accept().await;
        // Second connection carries the shutdown request.
        if let Ok((mut stream, _)) = orphan.accept().await {
            let mut decoder = LineDecoder::new();
            let mut buffer = [0u8; 256];
            loop {
                match stream.read(&mut buffer).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if let Some(line) = decoder.feed(&buffer[..n]).pop() {
                            let _ = request_tx.send(protocol::parse(&line));
                            break;
                        }
                    }
                }
            }
        }
        // Dropping the listener releases the port.
    });

    let (mut supervisor, _handle, _sink) = new_supervisor(port, sleeping_worker());
    supervisor.start().await.expect("Startup should succeed after eviction");

    let request = TokioTimeout(RUN_TIMEOUT, request_rx)
        .await
        .expect("Timed out waiting for the shutdown request")
        .expect("Orphan task dropped the sender")
        .expect("Shutdown request line should parse");
    assert_eq!(
        request,
        BridgeMessage::ShutdownRequest {
            originator_process_id: std::process::id(),
        },
        "The request should carry the new host's PID"
    );

    let history = supervisor.history();
    assert!(history.contains(&LifecycleState::RequestingOrphanShutdown));
    assert!(history.contains(&LifecycleState::WaitingForPortFree));
    assert_eq!(supervisor.state(), LifecycleState::AwaitingConnection);

    supervisor.shutdown().await;
}

/// **VALUE**: Verifies the orphan-timeout property: an occupant that
/// ignores the shutdown request does not hang startup forever. The machine
/// waits out the bounded poll, proceeds anyway, and the bind failure is
/// reported as the separate fatal condition.
#[tokio::test]
#[serial]
async fn given_stubborn_orphan_when_starting_then_times_out_and_bind_fails() {
    let port = 42312;

    // Occupant that accepts and ignores everything, and never leaves.
    let occupant = TcpListener::bind(format!("127.0.0.1:{port}"))
        .await
        .expect("Occupant should bind first");
    let occupant_task = tokio::spawn(async move {
        loop {
            let _ = occupant.accept().await;
        }
    });

    let (mut supervisor, _handle, _sink) = new_supervisor(port, sleeping_worker());
    let result = supervisor.start().await;

    assert!(
        matches!(result, Err(SupervisorError::Bind { .. })),
        "Bind failure after timeout should be the reported error, got {result:?}"
    );
    assert!(
        supervisor
            .history()
            .contains(&LifecycleState::WaitingForPortFree),
        "The bounded wait should have run"
    );
    assert!(
        supervisor.history().contains(&LifecycleState::Spawning),
        "Startup should still proceed to the spawn attempt after the timeout"
    );
    assert_eq!(supervisor.state(), LifecycleState::Terminated);

    occupant_task.abort();
}

/// **VALUE**: Verifies the fatal startup condition: a worker that dies
/// before connecting drives the machine to `Terminated` with a recorded
/// failure, never a silent retry.
#[tokio::test]
#[serial]
async fn given_worker_exits_before_connecting_then_terminated_with_failure() {
    let (mut supervisor, _handle, _sink) = new_supervisor(42313, shell_worker("exit 7"));

    supervisor.start().await.expect("Startup itself should succeed");

    TokioTimeout(RUN_TIMEOUT, supervisor.run())
        .await
        .expect("Supervisor should terminate once the worker exits");

    assert_eq!(supervisor.state(), LifecycleState::Terminated);
    assert!(
        supervisor
            .failure()
            .is_some_and(|condition| condition.contains("before connecting")),
        "The bridge-failed-to-start condition should be recorded"
    );
    assert_eq!(
        supervisor.exit_status().and_then(|status| status.code()),
        Some(7),
        "The worker's exit code should be recorded for diagnostics"
    );
}

/// **VALUE**: Verifies the full happy-path lifecycle: spawn, connect,
/// forward device state, then a graceful shutdown that the worker obeys
/// within the grace period - so no forced kill appears in the history.
#[tokio::test]
#[serial]
async fn given_connected_worker_when_quitting_then_graceful_shutdown_only() {
    let port = 42314;
    let (mut supervisor, handle, sink) = new_supervisor(port, sleeping_worker());

    supervisor.start().await.expect("Startup should succeed");

    // The spawned shell worker never connects; emulate the connection the
    // real worker would make.
    let mut worker = connect_worker(port).await;
    send_message(&mut worker, &sample_device_state(0, 100)).await;

    tokio::spawn(async move {
        // Give the control task time to process connect + device state.
        TokioSleep(Duration::from_millis(300)).await;
        handle.notify_application_quit().await;
    });

    TokioTimeout(RUN_TIMEOUT, supervisor.run())
        .await
        .expect("Supervisor should terminate after the quit event");

    let history = supervisor.history();
    assert!(history.contains(&LifecycleState::Connected));
    assert!(history.contains(&LifecycleState::ShuttingDownGraceful));
    assert!(
        !history.contains(&LifecycleState::ShuttingDownForced),
        "A cooperative worker must not be force-killed"
    );
    assert_eq!(supervisor.state(), LifecycleState::Terminated);
    assert_eq!(sink.received(), vec![sample_device_state(0, 100)]);
}

/// **VALUE**: Verifies forced-kill escalation: a worker that ignores the
/// polite termination signal is killed exactly once after the grace
/// period.
///
/// **BUG THIS CATCHES**: Would catch a shutdown that waits forever on a
/// hung worker, and one that issues duplicate kills.
#[tokio::test]
#[serial]
async fn given_worker_ignoring_term_when_shutting_down_then_forced_kill_once() {
    let (mut supervisor, _handle, _sink) =
        new_supervisor(42315, shell_worker("trap '' TERM INT; sleep 30"));

    supervisor.start().await.expect("Startup should succeed");

    // Give the shell a moment to install its trap, otherwise the TERM
    // lands before it and the worker exits politely.
    TokioSleep(Duration::from_millis(250)).await;

    supervisor.shutdown().await;

    let forced = supervisor
        .history()
        .iter()
        .filter(|state| **state == LifecycleState::ShuttingDownForced)
        .count();
    assert_eq!(forced, 1, "Exactly one forced-kill escalation");
    assert_eq!(supervisor.state(), LifecycleState::Terminated);
}

/// **VALUE**: Verifies idempotent shutdown: window close followed by
/// application quit runs the sequence twice without touching an
/// already-terminated process.
#[tokio::test]
#[serial]
async fn given_shutdown_already_done_when_shutdown_again_then_noop() {
    let (mut supervisor, _handle, _sink) = new_supervisor(42316, sleeping_worker());

    supervisor.start().await.expect("Startup should succeed");

    supervisor.shutdown().await;
    assert_eq!(supervisor.state(), LifecycleState::Terminated);
    let history_after_first = supervisor.history().len();

    // Second invocation: same terminal state, no new transitions, no panic.
    supervisor.shutdown().await;
    assert_eq!(supervisor.state(), LifecycleState::Terminated);
    assert_eq!(
        supervisor.history().len(),
        history_after_first,
        "A repeated shutdown must not add transitions"
    );
}
