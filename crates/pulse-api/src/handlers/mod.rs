//! HTTP API handlers: exposes registry state as JSON.

pub mod fleet;
pub mod status;

use pulse_services::ConnectionManager;

#[derive(Clone)]
pub struct ApiState {
    pub manager: ConnectionManager,
    /// Name of the active registry transport; `None` when listener setup
    /// failed and the daemon is running degraded.
    pub transport: Option<&'static str>,
}

pub use fleet::{handle_fleet, handle_fleet_group};
pub use status::{handle_connections, handle_status, handle_sweep};
