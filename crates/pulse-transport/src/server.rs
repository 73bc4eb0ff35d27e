//! Registry accept loop and per-connection driver.
//!
//! Every accepted connection runs in its own task: transport setup, then
//! framed packets into [`ConnectionManager::on_packet`] until the stream
//! ends, then exactly one [`ConnectionManager::on_end`]. A connection whose
//! setup fails never opens, so it does not count and does not sweep.

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;

use pulse_core::config::RegistryConfig;
use pulse_services::{ConnectionId, ConnectionManager};

use crate::framing::{Frame, FrameDecoder};
use crate::setup::SetupError;
use crate::transport::Transport;

const LISTEN_BACKLOG: i32 = 1024;

#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub bind_addr: SocketAddr,
    pub max_frame_bytes: usize,
}

impl ServerOptions {
    pub fn from_config(config: &RegistryConfig) -> Result<Self, SetupError> {
        let ip: IpAddr = config
            .bind_addr
            .trim()
            .parse()
            .map_err(|_| SetupError::Address(config.bind_addr.clone()))?;
        Ok(Self {
            bind_addr: SocketAddr::new(ip, config.port),
            max_frame_bytes: config.max_frame_bytes,
        })
    }
}

pub struct RegistryServer<T: Transport> {
    transport: Arc<T>,
    listener: TcpListener,
    manager: ConnectionManager,
    max_frame_bytes: usize,
}

impl<T: Transport> RegistryServer<T> {
    /// Bind the listening socket. The server accepts nothing until [`run`].
    ///
    /// [`run`]: RegistryServer::run
    pub async fn bind(
        transport: T,
        manager: ConnectionManager,
        options: &ServerOptions,
    ) -> Result<Self, SetupError> {
        let addr = options.bind_addr;
        let listener = make_listener_socket(addr)
            .and_then(TcpListener::from_std)
            .map_err(|source| SetupError::Bind { addr, source })?;

        Ok(Self {
            transport: Arc::new(transport),
            listener,
            manager,
            max_frame_bytes: options.max_frame_bytes,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn transport_name(&self) -> &'static str {
        self.transport.name()
    }

    /// Accept connections until `shutdown` fires. Connections already in
    /// flight keep running on their own tasks.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        match self.listener.local_addr() {
            Ok(addr) => {
                tracing::info!(%addr, transport = self.transport.name(), "registry listening")
            }
            Err(e) => tracing::warn!(error = %e, "registry listening on unknown address"),
        }

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("registry listener shutting down");
                    return;
                }

                result = self.listener.accept() => {
                    let (tcp, peer) = match result {
                        Ok(r) => r,
                        Err(e) => {
                            tracing::warn!(error = %e, "accept failed");
                            continue;
                        }
                    };
                    tokio::spawn(serve_connection(
                        self.transport.clone(),
                        self.manager.clone(),
                        tcp,
                        peer,
                        self.max_frame_bytes,
                    ));
                }
            }
        }
    }
}

async fn serve_connection<T: Transport>(
    transport: Arc<T>,
    manager: ConnectionManager,
    tcp: TcpStream,
    peer: SocketAddr,
    max_frame_bytes: usize,
) {
    if let Err(e) = tcp.set_nodelay(true) {
        tracing::trace!(%peer, error = %e, "TCP_NODELAY");
    }

    let mut stream = match transport.establish(tcp).await {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(
                %peer,
                transport = transport.name(),
                error = %e,
                "connection setup failed"
            );
            return;
        }
    };

    let id = manager.open(peer, transport.name());
    let mut decoder = FrameDecoder::new(max_frame_bytes);

    let clean_eof = loop {
        match stream.read_buf(decoder.read_buffer()).await {
            Ok(0) => break true,
            Ok(_) => {
                while let Some(frame) = decoder.next_frame() {
                    dispatch(&manager, id, frame);
                }
            }
            // TLS peers that hang up without close_notify.
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break true,
            Err(e) => {
                tracing::debug!(connection = %id, error = %e, "connection read failed");
                break false;
            }
        }
    };

    if clean_eof {
        if let Some(frame) = decoder.finish() {
            dispatch(&manager, id, frame);
        }
    }

    manager.on_end(id);
}

fn dispatch(manager: &ConnectionManager, id: ConnectionId, frame: Frame) {
    match frame {
        Frame::Packet(packet) => {
            // Failures are logged and counted by the manager.
            let _ = manager.on_packet(id, &packet);
        }
        Frame::Oversized { len } => {
            manager.on_rejected(id, &format!("packet of {len} bytes exceeds frame limit"));
        }
    }
}

fn make_listener_socket(addr: SocketAddr) -> io::Result<std::net::TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;

    Ok(socket.into())
}
