//! Process supervisor: owns the worker's spawn, orphan cleanup, shutdown
//! handshake, and forced termination.
//!
//! One supervisor exists per host-process lifetime and every lifecycle
//! transition runs on its single control task, so [`LifecycleState`] and the
//! worker [`Child`](tokio::process::Child) need no locking. The channel
//! server and the host application reach the control task only through the
//! event channel; connection-scoped events carry a generation counter so a
//! delayed notification from a dead connection cannot disturb a newer one.
//!
//! No failure here is allowed to crash the host. Startup faults (bind,
//! spawn) surface as errors the host logs before continuing without
//! bridge-sourced input; everything later is downgraded to a logged
//! condition.

use crate::BRIDGE_HOSTNAME;
use crate::WORKER_BINARY;
use crate::codec;
use crate::config::BridgeConfig;
use crate::error::supervisor::SupervisorError;
use crate::liveness::LivenessMonitor;
use crate::server::{DeviceEventSink, ServerEvent, ServerHandle, start_channel_server};

use common::ErrorLocation;

use models::BridgeMessage;

use std::env::current_exe;
use std::fmt::{Display, Formatter, Result as FormatResult};
use std::io::{Error as IoError, ErrorKind};
use std::panic::Location;
use std::process::ExitStatus;
use std::sync::Arc;

use backoff::{ExponentialBackoff, backoff::Backoff};
use log::{debug, error, info, trace, warn};
use sysinfo::{Pid, ProcessesToUpdate, Signal, System};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::process::{Child as TokioChild, Command as TokioCommand};
use tokio::spawn as TokioSpawn;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep as TokioSleep, timeout as TokioTimeout};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// The lifecycle state machine. Initial state is `Idle`, terminal state is
/// `Terminated`; transitions are driven exclusively by the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Idle,
    CheckingForOrphan,
    RequestingOrphanShutdown,
    WaitingForPortFree,
    Spawning,
    AwaitingConnection,
    Connected,
    ShuttingDownGraceful,
    ShuttingDownForced,
    Terminated,
}

impl Display for LifecycleState {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> FormatResult {
        let name = match self {
            LifecycleState::Idle => "Idle",
            LifecycleState::CheckingForOrphan => "CheckingForOrphan",
            LifecycleState::RequestingOrphanShutdown => "RequestingOrphanShutdown",
            LifecycleState::WaitingForPortFree => "WaitingForPortFree",
            LifecycleState::Spawning => "Spawning",
            LifecycleState::AwaitingConnection => "AwaitingConnection",
            LifecycleState::Connected => "Connected",
            LifecycleState::ShuttingDownGraceful => "ShuttingDownGraceful",
            LifecycleState::ShuttingDownForced => "ShuttingDownForced",
            LifecycleState::Terminated => "Terminated",
        };
        write!(formatter, "{name}")
    }
}

/// Events processed on the supervisor's control task.
#[derive(Debug)]
pub enum SupervisorEvent {
    /// Connection-scoped notification from the channel server.
    Server(ServerEvent),
    /// The host's overlay window closed.
    WindowClosed,
    /// The host application is quitting.
    ApplicationQuit,
}

/// Cheap handle for delivering host lifecycle events to the control task.
#[derive(Clone)]
pub struct SupervisorHandle {
    events: mpsc::Sender<SupervisorEvent>,
}

impl SupervisorHandle {
    pub async fn notify_window_closed(&self) {
        if self.events.send(SupervisorEvent::WindowClosed).await.is_err() {
            debug!("Supervisor already gone, window-close event dropped");
        }
    }

    pub async fn notify_application_quit(&self) {
        if self
            .events
            .send(SupervisorEvent::ApplicationQuit)
            .await
            .is_err()
        {
            debug!("Supervisor already gone, quit event dropped");
        }
    }
}

enum Tick {
    WorkerExited(Option<ExitStatus>),
    Event(Option<SupervisorEvent>),
}

/// Owns the worker [`ProcessHandle`], the [`ServerHandle`], and the
/// [`LifecycleState`]. No other component may hold or kill the worker.
pub struct Supervisor {
    config: BridgeConfig,
    sink: Arc<dyn DeviceEventSink>,
    liveness: LivenessMonitor,
    state: LifecycleState,
    history: Vec<LifecycleState>,
    child: Option<TokioChild>,
    server: Option<ServerHandle>,
    watchdog: Option<JoinHandle<()>>,
    connected_generation: Option<u64>,
    exit_status: Option<ExitStatus>,
    failure: Option<String>,
    events_tx: mpsc::Sender<SupervisorEvent>,
    events_rx: mpsc::Receiver<SupervisorEvent>,
}

impl Supervisor {
    pub fn new(config: BridgeConfig, sink: Arc<dyn DeviceEventSink>) -> (Self, SupervisorHandle) {
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let handle = SupervisorHandle {
            events: events_tx.clone(),
        };

        let supervisor = Self {
            config,
            sink,
            liveness: LivenessMonitor::new(),
            state: LifecycleState::Idle,
            history: vec![LifecycleState::Idle],
            child: None,
            server: None,
            watchdog: None,
            connected_generation: None,
            exit_status: None,
            failure: None,
            events_tx,
            events_rx,
        };

        (supervisor, handle)
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Every state the machine has passed through, in order. Diagnostics
    /// and tests only.
    pub fn history(&self) -> &[LifecycleState] {
        &self.history
    }

    /// The worker's recorded exit status, once it has exited.
    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.exit_status
    }

    /// The fatal condition that ended this supervisor, if any.
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    pub fn liveness(&self) -> &LivenessMonitor {
        &self.liveness
    }

    /// Run the startup sequence: orphan check, port claim, worker spawn.
    ///
    /// On success the supervisor is in `AwaitingConnection` and [`run`]
    /// should be driven next. On failure the subsystem is done - the caller
    /// logs the error and the overlay continues without bridge input.
    ///
    /// # Errors
    ///
    /// * [`SupervisorError::Bind`] - the port could not be claimed after
    ///   orphan cleanup ran its course
    /// * [`SupervisorError::Spawn`] - the worker binary could not be started
    pub async fn start(&mut self) -> Result<(), SupervisorError> {
        let port = self.config.channel.port;

        self.transition(LifecycleState::CheckingForOrphan);
        if self.probe_port().await {
            info!("Port {port} is occupied by a previous generation, requesting shutdown");
            self.transition(LifecycleState::RequestingOrphanShutdown);
            self.request_orphan_shutdown().await;
            self.transition(LifecycleState::WaitingForPortFree);
            self.wait_for_port_free().await;
        } else {
            debug!("Port {port} is free");
        }

        self.transition(LifecycleState::Spawning);

        // Bind before spawning so the worker has something to connect to.
        let (server_tx, server_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let server = start_channel_server(
            port,
            Arc::clone(&self.sink),
            self.liveness.clone(),
            server_tx,
        )
        .await
        .map_err(|e| {
            self.transition(LifecycleState::Terminated);
            SupervisorError::Bind {
                message: format!("Channel server could not claim port {port}: {e}"),
                location: ErrorLocation::from(Location::caller()),
                source: Box::new(e),
            }
        })?;
        self.server = Some(server);
        self.spawn_event_forwarder(server_rx);

        let child = match self.spawn_worker() {
            Ok(child) => child,
            Err(e) => {
                self.close_server();
                self.transition(LifecycleState::Terminated);
                return Err(e);
            }
        };
        info!("Worker spawned (PID: {:?})", child.id());
        self.child = Some(child);

        self.transition(LifecycleState::AwaitingConnection);
        Ok(())
    }

    /// Drive the state machine until `Terminated`.
    ///
    /// Waits on supervisor events and the worker's exit notification
    /// concurrently; both are handled on this single task.
    pub async fn run(&mut self) {
        loop {
            if self.state == LifecycleState::Terminated {
                break;
            }

            let tick = match self.child.as_mut() {
                Some(child) => {
                    tokio::select! {
                        status = child.wait() => Tick::WorkerExited(status.ok()),
                        event = self.events_rx.recv() => Tick::Event(event),
                    }
                }
                None => Tick::Event(self.events_rx.recv().await),
            };

            match tick {
                Tick::WorkerExited(status) => self.on_worker_exit(status).await,
                Tick::Event(Some(event)) => self.handle_event(event).await,
                Tick::Event(None) => break,
            }
        }
    }

    /// Process one event. Stale connection events are ignored: a delayed
    /// disconnect from a previous generation must not disturb the current
    /// worker.
    pub async fn handle_event(&mut self, event: SupervisorEvent) {
        match event {
            SupervisorEvent::Server(ServerEvent::WorkerConnected { generation }) => {
                if self.state != LifecycleState::AwaitingConnection {
                    warn!(
                        "Ignoring worker connection (generation {generation}) in state {}",
                        self.state
                    );
                    return;
                }
                self.connected_generation = Some(generation);
                self.liveness.reset();
                self.watchdog = Some(self.liveness.spawn_watchdog(
                    self.config.liveness.heartbeat_interval(),
                    self.config.liveness.stall_multiplier,
                ));
                self.transition(LifecycleState::Connected);
            }
            SupervisorEvent::Server(ServerEvent::WorkerDisconnected { generation }) => {
                if self.connected_generation != Some(generation) {
                    debug!("Ignoring stale disconnect for generation {generation}");
                    return;
                }
                if self.state == LifecycleState::Connected {
                    warn!("Worker connection closed unexpectedly");
                    self.shutdown().await;
                }
            }
            SupervisorEvent::Server(ServerEvent::ShutdownRequested {
                generation: _,
                originator_process_id,
            }) => {
                info!("Shutting down at the request of process {originator_process_id}");
                self.shutdown().await;
            }
            SupervisorEvent::WindowClosed | SupervisorEvent::ApplicationQuit => {
                self.shutdown().await;
            }
        }
    }

    /// Graceful-then-forced worker termination.
    ///
    /// Idempotent: invoking it again while it is underway or after
    /// `Terminated` is a no-op, so window close followed by application quit
    /// never kills an already-gone process.
    pub async fn shutdown(&mut self) {
        match self.state {
            LifecycleState::ShuttingDownGraceful
            | LifecycleState::ShuttingDownForced
            | LifecycleState::Terminated => {
                debug!("Shutdown already underway (state {})", self.state);
                return;
            }
            _ => {}
        }

        self.transition(LifecycleState::ShuttingDownGraceful);
        self.close_server();
        if let Some(watchdog) = self.watchdog.take() {
            watchdog.abort();
        }
        self.connected_generation = None;

        let Some(mut child) = self.child.take() else {
            self.transition(LifecycleState::Terminated);
            return;
        };

        if let Some(pid) = child.id() {
            terminate_gracefully(pid);
        }

        // The timeout doubles as the grace timer; the worker exiting first
        // completes the wait and the timer never fires.
        let grace = self.config.shutdown.grace_period();
        match TokioTimeout(grace, child.wait()).await {
            Ok(Ok(status)) => {
                info!("Worker exited within the grace period: {status}");
                self.exit_status = Some(status);
            }
            Ok(Err(e)) => warn!("Failed to await worker exit: {e}"),
            Err(_) => {
                warn!("Worker did not exit within {grace:?}, escalating to forced kill");
                self.transition(LifecycleState::ShuttingDownForced);
                match child.kill().await {
                    Ok(()) => {
                        info!("Worker force-killed");
                        self.exit_status = child.try_wait().ok().flatten();
                    }
                    Err(e) => warn!("Forced kill failed: {e}"),
                }
            }
        }

        self.transition(LifecycleState::Terminated);
    }

    /// The worker process is gone. What that means depends on where the
    /// state machine currently is.
    async fn on_worker_exit(&mut self, status: Option<ExitStatus>) {
        self.child = None;
        self.exit_status = status;
        match status {
            Some(status) => info!("Worker exited: {status}"),
            None => warn!("Worker exit status unavailable"),
        }

        match self.state {
            LifecycleState::AwaitingConnection => {
                let condition = match status {
                    Some(status) => format!("worker exited before connecting: {status}"),
                    None => "worker exited before connecting".to_string(),
                };
                error!("Bridge failed to start: {condition}");
                self.failure = Some(condition);
                self.close_server();
                self.transition(LifecycleState::Terminated);
            }
            LifecycleState::Connected => {
                warn!("Worker exited unexpectedly, closing the channel");
                self.shutdown().await;
            }
            _ => {
                self.close_server();
                self.transition(LifecycleState::Terminated);
            }
        }
    }

    fn transition(&mut self, next: LifecycleState) {
        if self.state == next {
            return;
        }
        info!("Lifecycle transition: {} -> {next}", self.state);
        self.state = next;
        self.history.push(next);
    }

    fn close_server(&mut self) {
        if let Some(server) = self.server.take() {
            server.close();
        }
    }

    /// Connect-probe the well-known port. Success means something is bound;
    /// a prior generation's claim is only observable externally this way.
    async fn probe_port(&self) -> bool {
        let address = format!("{BRIDGE_HOSTNAME}:{}", self.config.channel.port);
        matches!(
            TokioTimeout(
                self.config.orphan.probe_timeout(),
                TcpStream::connect(&address)
            )
            .await,
            Ok(Ok(_))
        )
    }

    /// Best-effort: connect to whatever owns the port and ask it to shut
    /// down, carrying our own PID so the orphan's log says who evicted it.
    async fn request_orphan_shutdown(&self) {
        let address = format!("{BRIDGE_HOSTNAME}:{}", self.config.channel.port);
        let request = BridgeMessage::ShutdownRequest {
            originator_process_id: std::process::id(),
        };

        let mut stream = match TokioTimeout(
            self.config.orphan.probe_timeout(),
            TcpStream::connect(&address),
        )
        .await
        {
            Ok(Ok(stream)) => stream,
            _ => {
                debug!("Orphan disappeared before the shutdown request could be sent");
                return;
            }
        };

        let line = match codec::encode_line(&request) {
            Ok(line) => line,
            Err(e) => {
                warn!("Failed to encode shutdown request: {e}");
                return;
            }
        };

        if let Err(e) = stream.write_all(&line).await {
            debug!("Failed to send shutdown request to orphan: {e}");
        }
        let _ = stream.shutdown().await;
    }

    /// Poll the port until the previous owner releases it. Timeout is
    /// non-fatal: the bind attempt that follows reports its own failure.
    async fn wait_for_port_free(&self) {
        let port = self.config.channel.port;
        let wait_timeout = self.config.orphan.wait_timeout();

        let mut backoff = ExponentialBackoff {
            initial_interval: self.config.orphan.poll_interval(),
            max_elapsed_time: Some(wait_timeout),
            ..ExponentialBackoff::default()
        };

        loop {
            if !self.probe_port().await {
                info!("Port {port} released by previous owner");
                return;
            }

            match backoff.next_backoff() {
                Some(duration) => {
                    trace!("Port {port} still occupied, retrying after {duration:?}");
                    TokioSleep(duration).await;
                }
                None => {
                    warn!(
                        "Port {port} still occupied after {wait_timeout:?}, \
                         attempting to bind anyway"
                    );
                    return;
                }
            }
        }
    }

    /// Forward connection events from the channel server into the control
    /// task's event stream.
    fn spawn_event_forwarder(&self, mut server_rx: mpsc::Receiver<ServerEvent>) {
        let events_tx = self.events_tx.clone();
        TokioSpawn(async move {
            while let Some(event) = server_rx.recv().await {
                if events_tx
                    .send(SupervisorEvent::Server(event))
                    .await
                    .is_err()
                {
                    break;
                }
            }
        });
    }

    /// Start the worker process, passing the port and this host's PID as
    /// positional arguments. Tries the configured command override, then the
    /// sibling of the current executable, then PATH.
    fn spawn_worker(&self) -> Result<TokioChild, SupervisorError> {
        let port = self.config.channel.port;
        let host_pid = std::process::id();

        if let Some(command) = &self.config.worker.command {
            return spawn_override(command, port, host_pid);
        }

        match spawn_sibling(port, host_pid) {
            Ok(child) => return Ok(child),
            Err(e) => debug!("No worker binary next to the host executable: {e}"),
        }

        debug!("Attempting to spawn {WORKER_BINARY} from PATH");
        build_worker_command(WORKER_BINARY, port, host_pid)
            .spawn()
            .map_err(|e| SupervisorError::Spawn {
                message: format!("Failed to spawn {WORKER_BINARY}: {e}"),
                location: ErrorLocation::from(Location::caller()),
                source: Box::new(e),
            })
    }
}

fn build_worker_command(program: &str, port: u16, host_pid: u32) -> TokioCommand {
    let mut cmd = TokioCommand::new(program);
    cmd.arg(port.to_string()).arg(host_pid.to_string());
    cmd
}

#[track_caller]
fn spawn_override(
    command: &[String],
    port: u16,
    host_pid: u32,
) -> Result<TokioChild, SupervisorError> {
    let (program, leading_args) = command.split_first().ok_or_else(|| SupervisorError::Spawn {
        message: "Worker command override is empty".to_string(),
        location: ErrorLocation::from(Location::caller()),
        source: Box::new(IoError::new(ErrorKind::InvalidInput, "empty command")),
    })?;

    debug!("Spawning worker via configured override: {program}");

    let mut cmd = TokioCommand::new(program);
    cmd.args(leading_args)
        .arg(port.to_string())
        .arg(host_pid.to_string());

    cmd.spawn().map_err(|e| SupervisorError::Spawn {
        message: format!("Failed to spawn worker override '{program}': {e}"),
        location: ErrorLocation::from(Location::caller()),
        source: Box::new(e),
    })
}

#[track_caller]
fn spawn_sibling(port: u16, host_pid: u32) -> Result<TokioChild, SupervisorError> {
    let exe = current_exe().map_err(|e| SupervisorError::Spawn {
        message: format!("Failed to get current executable path: {e}"),
        location: ErrorLocation::from(Location::caller()),
        source: Box::new(e),
    })?;

    let dir = exe.parent().ok_or_else(|| SupervisorError::Spawn {
        message: format!("Executable has no parent directory: {}", exe.display()),
        location: ErrorLocation::from(Location::caller()),
        source: Box::new(IoError::new(ErrorKind::NotFound, "no parent dir")),
    })?;

    let sibling = dir.join(WORKER_BINARY);
    debug!("Attempting to spawn worker from {}", sibling.display());

    build_worker_command(&sibling.to_string_lossy(), port, host_pid)
        .spawn()
        .map_err(|e| SupervisorError::Spawn {
            message: format!("Failed to spawn worker from {}: {e}", sibling.display()),
            location: ErrorLocation::from(Location::caller()),
            source: Box::new(e),
        })
}

/// Send the polite termination signal. Falls back to a hard kill on
/// platforms without a Term signal.
fn terminate_gracefully(pid: u32) {
    let mut sys = System::new();
    sys.refresh_processes(ProcessesToUpdate::Some(&[Pid::from_u32(pid)]), true);

    match sys.process(Pid::from_u32(pid)) {
        Some(process) => {
            if let Some(sent) = process.kill_with(Signal::Term) {
                debug!("Sent termination signal to worker (PID {pid}): success={sent}");
            } else {
                let killed = process.kill();
                debug!("Platform has no Term signal, hard-killed worker (PID {pid}): success={killed}");
            }
        }
        None => debug!("Worker process {pid} already gone"),
    }
}
