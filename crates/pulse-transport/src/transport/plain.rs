use std::io;

use tokio::net::TcpStream;

use super::Transport;

/// Unauthenticated TCP. The accepted stream is used as is.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTransport;

impl Transport for PlainTransport {
    type Stream = TcpStream;

    fn name(&self) -> &'static str {
        "plain"
    }

    async fn establish(&self, tcp: TcpStream) -> io::Result<TcpStream> {
        Ok(tcp)
    }
}
