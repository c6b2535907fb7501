pub mod codec;
pub mod config;
pub mod error;
pub mod liveness;
pub mod logging;
pub mod protocol;
pub mod server;
pub mod supervisor;

#[cfg(test)]
mod tests;

/// The bridge only ever speaks over loopback.
pub const BRIDGE_HOSTNAME: &str = "127.0.0.1";

/// Well-known port the host claims and the worker connects back to.
pub const DEFAULT_BRIDGE_PORT: u16 = 54321;

/// Name of the worker executable the supervisor spawns.
pub const WORKER_BINARY: &str = "bridge-worker";
