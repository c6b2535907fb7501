// Library exports for testing
// The binary (main.rs) imports these as well

pub mod args;
pub mod backend;
pub mod error;
pub mod keycodes;
pub mod uplink;

#[cfg(test)]
mod tests;

/// Prefix stamped onto every worker milestone mirrored into the host log.
pub const WORKER_LOG_PREFIX: &str = "[bridge-worker]";
