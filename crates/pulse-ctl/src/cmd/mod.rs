//! CLI command modules.

pub mod fleet;
pub mod http;
pub mod status;
