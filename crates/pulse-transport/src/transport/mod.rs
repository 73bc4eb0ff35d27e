//! Transport variants: how an accepted TCP connection becomes the byte
//! stream the registry reads heartbeats from.

mod mutual_tls;
mod plain;

pub use mutual_tls::{MutualTlsTransport, TlsMaterial};
pub use plain::PlainTransport;

use std::future::Future;
use std::io;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

/// A listener capability: turn an accepted TCP stream into a usable
/// bidirectional byte stream.
///
/// Implementations only decide confidentiality and authentication of the
/// channel. What is read from the stream is handled identically for all of
/// them.
pub trait Transport: Send + Sync + 'static {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Short label for logs and the operator API.
    fn name(&self) -> &'static str;

    /// Per-connection setup (e.g. a TLS handshake). An error here concerns
    /// this connection only.
    fn establish(&self, tcp: TcpStream) -> impl Future<Output = io::Result<Self::Stream>> + Send;
}
