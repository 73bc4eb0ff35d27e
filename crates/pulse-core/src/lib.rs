//! pulse-core: wire packet types and configuration.
//! All other Pulse crates depend on this one.

pub mod config;
pub mod wire;

pub use wire::{DecodeError, Heartbeat, HeartbeatPacket, Metrics, Timestamp};
