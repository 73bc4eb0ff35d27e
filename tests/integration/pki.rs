//! Throwaway certificate authority for TLS tests.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DnType, ExtendedKeyUsagePurpose, IsCa,
    KeyPair, KeyUsagePurpose,
};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::crypto::ring;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;

use pulse_transport::TlsMaterial;

/// A certificate and its private key, PEM encoded.
#[derive(Clone)]
pub struct Identity {
    pub cert_pem: String,
    pub key_pem: String,
}

pub struct Authority {
    cert: Certificate,
    key: KeyPair,
}

impl Authority {
    pub fn new(name: &str) -> Result<Self> {
        let key = KeyPair::generate()?;
        let mut params = CertificateParams::new(Vec::<String>::new())?;
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.distinguished_name.push(DnType::CommonName, name);
        params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];
        let cert = params.self_signed(&key)?;
        Ok(Self { cert, key })
    }

    pub fn pem(&self) -> String {
        self.cert.pem()
    }

    pub fn issue(&self, name: &str, purpose: ExtendedKeyUsagePurpose) -> Result<Identity> {
        let key = KeyPair::generate()?;
        let mut params = CertificateParams::new(vec![name.to_string()])?;
        params.distinguished_name.push(DnType::CommonName, name);
        params.extended_key_usages = vec![purpose];
        let cert = params.signed_by(&key, &self.cert, &self.key)?;
        Ok(Identity {
            cert_pem: cert.pem(),
            key_pem: key.serialize_pem(),
        })
    }
}

/// CA, a server identity for `localhost`, a client it signed, and a client
/// signed by an unrelated CA.
pub struct Pki {
    pub ca: Authority,
    pub server: Identity,
    pub client: Identity,
    pub stranger: Identity,
}

impl Pki {
    pub fn generate() -> Result<Self> {
        let ca = Authority::new("pulse test ca")?;
        let server = ca.issue("localhost", ExtendedKeyUsagePurpose::ServerAuth)?;
        let client = ca.issue("agent-1", ExtendedKeyUsagePurpose::ClientAuth)?;
        let stranger = Authority::new("someone else")?
            .issue("agent-x", ExtendedKeyUsagePurpose::ClientAuth)?;
        Ok(Self {
            ca,
            server,
            client,
            stranger,
        })
    }

    pub fn server_material(&self) -> TlsMaterial {
        TlsMaterial {
            cert_chain_pem: self.server.cert_pem.clone().into_bytes(),
            key_pem: self.server.key_pem.clone().into_bytes(),
            ca_pem: self.ca.pem().into_bytes(),
        }
    }

    /// Client config trusting this CA, presenting `identity` if given.
    pub fn client_config(&self, identity: Option<&Identity>) -> Result<Arc<ClientConfig>> {
        let mut roots = RootCertStore::empty();
        for cert in certs(&self.ca.pem())? {
            roots.add(cert)?;
        }

        let builder = ClientConfig::builder_with_provider(Arc::new(ring::default_provider()))
            .with_safe_default_protocol_versions()?
            .with_root_certificates(roots);
        let config = match identity {
            Some(id) => builder.with_client_auth_cert(certs(&id.cert_pem)?, key(&id.key_pem)?)?,
            None => builder.with_no_client_auth(),
        };
        Ok(Arc::new(config))
    }
}

fn certs(pem: &str) -> Result<Vec<CertificateDer<'static>>> {
    Ok(rustls_pemfile::certs(&mut pem.as_bytes()).collect::<Result<Vec<_>, _>>()?)
}

fn key(pem: &str) -> Result<PrivateKeyDer<'static>> {
    rustls_pemfile::private_key(&mut pem.as_bytes())?.context("no private key in PEM")
}

pub async fn connect_tls(
    addr: SocketAddr,
    config: Arc<ClientConfig>,
) -> Result<TlsStream<TcpStream>> {
    let tcp = TcpStream::connect(addr).await?;
    let name = ServerName::try_from("localhost")?;
    Ok(TlsConnector::from(config).connect(name, tcp).await?)
}

/// Open a mutually authenticated connection, write `bytes`, close.
pub async fn send_tls(addr: SocketAddr, config: Arc<ClientConfig>, bytes: &[u8]) -> Result<()> {
    let mut stream = connect_tls(addr, config).await?;
    stream.write_all(bytes).await?;
    stream.shutdown().await?;
    Ok(())
}
