//! Shared plumbing for the input-overlay bridge workspace.
//!
//! This crate holds the pieces every other crate leans on but that belong to
//! no single layer. Today that is error-location capture.
//!
//! ## Architecture
//!
//! - **common** (this crate): shared plumbing
//! - **models**: pure wire-message data structures
//! - **bridge-core**: codec, protocol, server, and supervisor logic
//! - **bridge-worker / overlay-host**: the two processes wiring it together

pub mod error;

pub use error::error_location::ErrorLocation;

#[cfg(test)]
mod tests;
