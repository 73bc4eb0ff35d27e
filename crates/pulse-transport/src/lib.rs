//! pulse-transport: listeners that feed heartbeat bytes into the registry.
//!
//! One accept loop ([`RegistryServer`]) is generic over a [`Transport`],
//! which turns an accepted TCP stream into a byte stream: unchanged for
//! [`PlainTransport`], after a mutually-authenticated handshake for
//! [`MutualTlsTransport`]. Everything past that point is shared.

pub mod framing;
pub mod server;
pub mod setup;
pub mod transport;

pub use framing::{Frame, FrameDecoder};
pub use server::{RegistryServer, ServerOptions};
pub use setup::{SetupError, SetupPolicy};
pub use transport::{MutualTlsTransport, PlainTransport, TlsMaterial, Transport};
