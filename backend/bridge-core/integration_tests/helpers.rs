// Shared plumbing for the channel-server and supervisor integration tests.
//
// Workers are stood in for by plain shell commands via the worker command
// override; the worker's side of the channel is emulated with a raw
// TcpStream speaking the real wire protocol.

use bridge_core::codec::encode_line;
use bridge_core::config::BridgeConfig;
use bridge_core::server::DeviceEventSink;

use models::{BridgeMessage, ButtonState, DeviceSnapshot};

use std::sync::Mutex;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

/// Sink that records every forwarded message for assertions.
#[derive(Default)]
pub struct CollectingSink {
    messages: Mutex<Vec<BridgeMessage>>,
}

impl CollectingSink {
    pub fn received(&self) -> Vec<BridgeMessage> {
        self.messages.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.messages.lock().unwrap().len()
    }
}

impl DeviceEventSink for CollectingSink {
    fn on_device_event(&self, message: &BridgeMessage) {
        self.messages.lock().unwrap().push(message.clone());
    }
}

/// A config with test-sized timings so orphan and grace timeouts resolve in
/// milliseconds instead of seconds.
pub fn test_config(port: u16, worker_command: Option<Vec<String>>) -> BridgeConfig {
    let mut config = BridgeConfig::default();
    config.channel.port = port;
    config.orphan.probe_timeout_ms = 100;
    config.orphan.poll_interval_ms = 25;
    config.orphan.wait_timeout_ms = 600;
    config.shutdown.grace_period_ms = 400;
    config.worker.command = worker_command;
    config
}

/// A worker stand-in that just stays alive until told to stop.
pub fn sleeping_worker() -> Option<Vec<String>> {
    shell_worker("sleep 30")
}

pub fn shell_worker(script: &str) -> Option<Vec<String>> {
    Some(vec![
        String::from("sh"),
        String::from("-c"),
        String::from(script),
    ])
}

pub async fn connect_worker(port: u16) -> TcpStream {
    TcpStream::connect(format!("127.0.0.1:{port}"))
        .await
        .expect("Failed to connect to channel server")
}

pub async fn send_message(stream: &mut TcpStream, message: &BridgeMessage) {
    let line = encode_line(message).expect("Failed to encode message");
    stream
        .write_all(&line)
        .await
        .expect("Failed to write message");
}

pub fn sample_device_state(index: u32, timestamp: u64) -> BridgeMessage {
    BridgeMessage::DeviceState {
        index,
        state: DeviceSnapshot {
            axes: vec![0.0, 0.25],
            buttons: vec![ButtonState::digital(false)],
            connected: true,
            timestamp,
            id: String::from("Integration Pad"),
            mapping: String::from("standard"),
        },
    }
}

/// Poll `condition` every 10ms until it holds or `timeout` expires.
pub async fn wait_for<F>(condition: F, timeout: Duration) -> bool
where
    F: Fn() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
