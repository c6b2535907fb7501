//! Host channel server: accepts the worker's loopback connection and decodes
//! its message stream.
//!
//! Exactly one connection is active at a time. A second connection attempt
//! while one is active is **rejected**: the newcomer's socket is logged and
//! dropped, the active connection is untouched. (The alternative - replacing
//! the active connection - would let a misbehaving second worker silently
//! steal the channel.)
//!
//! Inbound bytes flow through the [`LineDecoder`](crate::codec::LineDecoder)
//! and [`protocol::parse`], then fan out: device/key/pointer messages to the
//! injected [`DeviceEventSink`], `log` to the host log, `heartbeat` to the
//! [`LivenessMonitor`], `shutdown-request` to the supervisor. Malformed lines
//! are dropped without closing the connection.

use crate::BRIDGE_HOSTNAME;
use crate::codec::LineDecoder;
use crate::error::server::ServerError;
use crate::liveness::LivenessMonitor;
use crate::protocol;

use common::ErrorLocation;

use models::BridgeMessage;

use std::panic::Location;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use log::{debug, info, warn};
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::spawn as TokioSpawn;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const READ_BUFFER_SIZE: usize = 4096;

/// The rendering-surface boundary. The server forwards device-state, key,
/// and pointer messages here and knows nothing about what happens to them.
pub trait DeviceEventSink: Send + Sync {
    fn on_device_event(&self, message: &BridgeMessage);
}

/// Connection-scoped notifications for the supervisor.
///
/// Every event carries the generation of the connection it belongs to, so a
/// delayed notification from a dead connection can be recognized as stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    WorkerConnected {
        generation: u64,
    },
    WorkerDisconnected {
        generation: u64,
    },
    /// A `shutdown-request` arrived over the channel - a newer host
    /// generation is claiming the port.
    ShutdownRequested {
        generation: u64,
        originator_process_id: u32,
    },
}

/// A running channel server. Dropping the handle (or calling
/// [`close`](ServerHandle::close)) releases the port.
pub struct ServerHandle {
    port: u16,
    accept_task: JoinHandle<()>,
}

impl ServerHandle {
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Stop accepting connections and release the port. The active worker
    /// connection, if any, is not touched here; it ends when the worker's
    /// socket closes.
    pub fn close(&self) {
        self.accept_task.abort();
        info!("Channel server on port {} closed", self.port);
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

/// Bind the channel server on the well-known loopback port.
///
/// Binding is the port claim: if another host generation still owns the
/// port this fails fast instead of silently coexisting.
///
/// # Errors
///
/// Returns [`ServerError::Bind`] if the port cannot be claimed. After orphan
/// cleanup this is the one user-visible failure of the subsystem.
pub async fn start_channel_server(
    port: u16,
    sink: Arc<dyn DeviceEventSink>,
    liveness: LivenessMonitor,
    events: mpsc::Sender<ServerEvent>,
) -> Result<ServerHandle, ServerError> {
    let address = format!("{BRIDGE_HOSTNAME}:{port}");

    let listener = TcpListener::bind(&address)
        .await
        .map_err(|e| ServerError::Bind {
            message: format!("Failed to bind channel server on {address}: {e}"),
            location: ErrorLocation::from(Location::caller()),
            source: Box::new(e),
        })?;

    info!("Channel server listening on {address}");

    let accept_task = TokioSpawn(accept_loop(listener, sink, liveness, events));

    Ok(ServerHandle { port, accept_task })
}

async fn accept_loop(
    listener: TcpListener,
    sink: Arc<dyn DeviceEventSink>,
    liveness: LivenessMonitor,
    events: mpsc::Sender<ServerEvent>,
) {
    let active = Arc::new(AtomicBool::new(false));
    let generations = AtomicU64::new(0);

    loop {
        let (stream, addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("Failed to accept connection: {e}");
                continue;
            }
        };

        // SECURITY: Reject non-loopback connections
        if !addr.ip().is_loopback() {
            warn!("Rejected non-loopback connection from {addr}");
            continue;
        }

        // Single active connection policy: reject while one is active.
        if active.swap(true, Ordering::SeqCst) {
            warn!("Rejecting connection from {addr}: a worker connection is already active");
            continue;
        }

        let generation = generations.fetch_add(1, Ordering::SeqCst) + 1;
        info!("Worker connected from {addr} (generation {generation})");

        if events
            .send(ServerEvent::WorkerConnected { generation })
            .await
            .is_err()
        {
            debug!("Supervisor gone, closing channel server");
            return;
        }

        TokioSpawn(handle_connection(
            stream,
            generation,
            Arc::clone(&sink),
            liveness.clone(),
            events.clone(),
            Arc::clone(&active),
        ));
    }
}

/// Read one worker connection to completion.
async fn handle_connection(
    mut stream: TcpStream,
    generation: u64,
    sink: Arc<dyn DeviceEventSink>,
    liveness: LivenessMonitor,
    events: mpsc::Sender<ServerEvent>,
    active: Arc<AtomicBool>,
) {
    let mut decoder = LineDecoder::new();
    let mut buffer = [0u8; READ_BUFFER_SIZE];

    loop {
        match stream.read(&mut buffer).await {
            Ok(0) => {
                debug!("Worker connection closed (generation {generation})");
                break;
            }
            Ok(n) => {
                for line in decoder.feed(&buffer[..n]) {
                    dispatch_line(&line, generation, &sink, &liveness, &events).await;
                }
            }
            Err(e) => {
                warn!("Read error on worker connection (generation {generation}): {e}");
                break;
            }
        }
    }

    if decoder.has_partial() {
        debug!("Worker connection ended mid-line (generation {generation})");
    }

    active.store(false, Ordering::SeqCst);
    let _ = events
        .send(ServerEvent::WorkerDisconnected { generation })
        .await;
}

/// Parse one line and route the message. Protocol faults are recoverable:
/// the line is dropped, the connection continues.
async fn dispatch_line(
    line: &str,
    generation: u64,
    sink: &Arc<dyn DeviceEventSink>,
    liveness: &LivenessMonitor,
    events: &mpsc::Sender<ServerEvent>,
) {
    let message = match protocol::parse(line) {
        Ok(message) => message,
        Err(e) => {
            warn!("Dropping malformed line from worker: {e}");
            return;
        }
    };

    match message {
        BridgeMessage::Log { message } => info!("{message}"),
        BridgeMessage::Heartbeat {
            device_count,
            window_count,
        } => liveness.record(device_count, window_count),
        BridgeMessage::ShutdownRequest {
            originator_process_id,
        } => {
            info!("Shutdown requested over the channel by process {originator_process_id}");
            let _ = events
                .send(ServerEvent::ShutdownRequested {
                    generation,
                    originator_process_id,
                })
                .await;
        }
        other => sink.on_device_event(&other),
    }
}
