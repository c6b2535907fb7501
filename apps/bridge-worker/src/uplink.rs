//! Worker side of the channel: connects back to the host and streams
//! translated input events as wire messages.
//!
//! The worker initiates the connection (the host only listens), then runs a
//! single loop multiplexing four things: backend events, the heartbeat
//! timer, the read side of the socket (the host never speaks on this
//! channel today, so reads only matter for detecting close), and OS
//! termination signals. Whichever fires first decides how the worker ends.

use crate::WORKER_LOG_PREFIX;
use crate::args::WorkerArgs;
use crate::backend::BackendEvent;
use crate::error::WorkerError;

use bridge_core::BRIDGE_HOSTNAME;
use bridge_core::codec::encode_line;

use common::ErrorLocation;

use models::BridgeMessage;

use std::time::Duration;

use log::{debug, info, warn};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::interval as TokioInterval;

/// Why the uplink loop ended. Every variant is a clean exit for the worker;
/// only backend *initialization* failures exit non-zero, and those happen
/// before this loop starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UplinkEnd {
    /// The host closed the connection (or the write path broke).
    HostClosed,
    /// SIGTERM/SIGINT from the supervising OS.
    SignalReceived,
    /// The backend event channel closed.
    BackendClosed,
}

impl From<BackendEvent> for BridgeMessage {
    fn from(event: BackendEvent) -> Self {
        match event {
            BackendEvent::Device { index, snapshot } => BridgeMessage::DeviceState {
                index,
                state: snapshot,
            },
            BackendEvent::Key {
                pressed,
                code,
                raw_code,
                timestamp,
            } => {
                if pressed {
                    BridgeMessage::KeyDown {
                        code,
                        raw_code,
                        timestamp,
                    }
                } else {
                    BridgeMessage::KeyUp {
                        code,
                        raw_code,
                        timestamp,
                    }
                }
            }
            BackendEvent::PointerMove { x, y, timestamp } => {
                BridgeMessage::PointerMove { x, y, timestamp }
            }
            BackendEvent::PointerButton {
                pressed,
                x,
                y,
                button,
                timestamp,
            } => {
                if pressed {
                    BridgeMessage::PointerDown {
                        x,
                        y,
                        button,
                        timestamp,
                    }
                } else {
                    BridgeMessage::PointerUp {
                        x,
                        y,
                        button,
                        timestamp,
                    }
                }
            }
            BackendEvent::PointerWheel {
                delta_x,
                delta_y,
                delta_z,
                timestamp,
            } => BridgeMessage::PointerWheel {
                delta_x,
                delta_y,
                delta_z,
                timestamp,
            },
            BackendEvent::Milestone(text) => BridgeMessage::Log {
                message: format!("{WORKER_LOG_PREFIX} {text}"),
            },
        }
    }
}

/// Connect back to the host's channel server.
///
/// # Errors
///
/// Returns [`WorkerError::Connect`] when nothing is listening; the worker
/// logs it and exits, and the supervisor records the early exit.
#[track_caller]
pub async fn connect(args: &WorkerArgs) -> Result<TcpStream, WorkerError> {
    let address = format!("{BRIDGE_HOSTNAME}:{}", args.port);
    TcpStream::connect(&address)
        .await
        .map_err(|e| WorkerError::Connect {
            message: format!("Failed to connect to host channel server at {address}: {e}"),
            location: ErrorLocation::here(),
            source: Box::new(e),
        })
}

/// Frame and write one message. Encode failures are logged and swallowed
/// (one bad message must not end the stream); transport failures are the
/// caller's signal that the host is gone.
pub async fn write_message<W>(writer: &mut W, message: &BridgeMessage) -> Result<(), ()>
where
    W: AsyncWrite + Unpin,
{
    let line = match encode_line(message) {
        Ok(line) => line,
        Err(e) => {
            warn!("Dropping unencodable '{}' message: {e}", message.kind());
            return Ok(());
        }
    };

    writer.write_all(&line).await.map_err(|e| {
        debug!("Write to host failed: {e}");
    })
}

/// Stream backend events and heartbeats to the host until something ends
/// the session.
///
/// `device_count` is sampled at each heartbeat so the count reflects
/// hot-plug changes without coupling the uplink to the backend's internals.
pub async fn run_uplink<F>(
    stream: TcpStream,
    args: &WorkerArgs,
    mut backend_events: mpsc::Receiver<BackendEvent>,
    device_count: F,
    heartbeat_interval: Duration,
) -> UplinkEnd
where
    F: Fn() -> u32,
{
    let (mut reader, mut writer) = stream.into_split();
    let mut heartbeats = TokioInterval(heartbeat_interval);
    let mut inbound = [0u8; 256];

    let ready = BridgeMessage::Log {
        message: format!(
            "{WORKER_LOG_PREFIX} Ready, streaming input (host PID {})",
            args.host_pid
        ),
    };
    if write_message(&mut writer, &ready).await.is_err() {
        return UplinkEnd::HostClosed;
    }

    let signal = termination_signal();
    tokio::pin!(signal);

    let end = loop {
        tokio::select! {
            event = backend_events.recv() => match event {
                Some(event) => {
                    let message = BridgeMessage::from(event);
                    if write_message(&mut writer, &message).await.is_err() {
                        break UplinkEnd::HostClosed;
                    }
                }
                None => break UplinkEnd::BackendClosed,
            },
            _ = heartbeats.tick() => {
                let beat = BridgeMessage::Heartbeat {
                    device_count: device_count(),
                    window_count: 0,
                };
                if write_message(&mut writer, &beat).await.is_err() {
                    break UplinkEnd::HostClosed;
                }
            }
            read = read_some(&mut reader, &mut inbound) => {
                if read == 0 {
                    break UplinkEnd::HostClosed;
                }
                // The host does not speak on this channel; drained and ignored.
            }
            _ = &mut signal => break UplinkEnd::SignalReceived,
        }
    };

    info!("Uplink ended: {end:?}");
    let _ = writer.shutdown().await;
    end
}

/// One read, with errors folded into "connection over".
async fn read_some<R>(reader: &mut R, buffer: &mut [u8]) -> usize
where
    R: AsyncRead + Unpin,
{
    reader.read(buffer).await.unwrap_or(0)
}

/// Resolves when the supervising OS asks the worker to terminate.
async fn termination_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let term = signal(SignalKind::terminate());
        let int = signal(SignalKind::interrupt());
        match (term, int) {
            (Ok(mut term), Ok(mut int)) => {
                tokio::select! {
                    _ = term.recv() => {}
                    _ = int.recv() => {}
                }
            }
            _ => {
                warn!("Failed to install signal handlers");
                std::future::pending::<()>().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if tokio::signal::ctrl_c().await.is_err() {
            warn!("Failed to install signal handlers");
            std::future::pending::<()>().await;
        }
    }
}
