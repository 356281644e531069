//! HTTP surface served by the game server.
//!
//! Versioned modules (currently `v1`) keep the route contract stable while the
//! engine underneath changes.

pub mod v1;
