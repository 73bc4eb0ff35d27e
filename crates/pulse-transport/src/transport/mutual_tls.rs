use std::io;
use std::path::Path;
use std::sync::Arc;

use tokio::net::TcpStream;
use tokio_rustls::rustls::crypto::{ring, CryptoProvider};
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::rustls::server::WebPkiClientVerifier;
use tokio_rustls::rustls::{RootCertStore, ServerConfig};
use tokio_rustls::server::TlsStream;
use tokio_rustls::TlsAcceptor;

use super::Transport;
use crate::setup::SetupError;

/// PEM-encoded certificate material for the TLS listener.
#[derive(Clone)]
pub struct TlsMaterial {
    /// Server certificate chain, leaf first.
    pub cert_chain_pem: Vec<u8>,
    /// Private key for the leaf certificate (PKCS#8, PKCS#1 or SEC1).
    pub key_pem: Vec<u8>,
    /// CAs a client certificate must chain to.
    pub ca_pem: Vec<u8>,
}

impl TlsMaterial {
    pub fn from_files(
        cert_file: &Path,
        key_file: &Path,
        ca_file: &Path,
    ) -> Result<Self, SetupError> {
        Ok(Self {
            cert_chain_pem: read(cert_file)?,
            key_pem: read(key_file)?,
            ca_pem: read(ca_file)?,
        })
    }
}

fn read(path: &Path) -> Result<Vec<u8>, SetupError> {
    std::fs::read(path).map_err(|source| SetupError::ReadMaterial {
        path: path.to_path_buf(),
        source,
    })
}

/// TLS that demands a client certificate signed by one of the configured
/// CAs. Connections without one fail the handshake and never reach the
/// registry.
#[derive(Clone)]
pub struct MutualTlsTransport {
    acceptor: TlsAcceptor,
}

impl MutualTlsTransport {
    pub fn new(material: &TlsMaterial) -> Result<Self, SetupError> {
        let chain = parse_certs(&material.cert_chain_pem, "certificate chain")?;
        let key = parse_key(&material.key_pem)?;

        let mut roots = RootCertStore::empty();
        for ca in parse_certs(&material.ca_pem, "CA bundle")? {
            roots.add(ca)?;
        }

        // Pin the provider rather than rely on a process-wide default.
        let provider: Arc<CryptoProvider> = Arc::new(ring::default_provider());
        let verifier =
            WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider.clone()).build()?;
        let config = ServerConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()?
            .with_client_cert_verifier(verifier)
            .with_single_cert(chain, key)?;

        Ok(Self {
            acceptor: TlsAcceptor::from(Arc::new(config)),
        })
    }
}

impl Transport for MutualTlsTransport {
    type Stream = TlsStream<TcpStream>;

    fn name(&self) -> &'static str {
        "mutual-tls"
    }

    async fn establish(&self, tcp: TcpStream) -> io::Result<Self::Stream> {
        self.acceptor.accept(tcp).await
    }
}

fn parse_certs(pem: &[u8], what: &'static str) -> Result<Vec<CertificateDer<'static>>, SetupError> {
    let certs = rustls_pemfile::certs(&mut &pem[..])
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| SetupError::Pem { what, source })?;
    if certs.is_empty() {
        return Err(SetupError::NoCertificates(what));
    }
    Ok(certs)
}

fn parse_key(pem: &[u8]) -> Result<PrivateKeyDer<'static>, SetupError> {
    rustls_pemfile::private_key(&mut &pem[..])
        .map_err(|source| SetupError::Pem {
            what: "private key",
            source,
        })?
        .ok_or(SetupError::NoPrivateKey)
}
