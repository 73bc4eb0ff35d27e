//! Listener setup errors and what to do about them.
//!
//! Setup failures (unreadable certificate material, a TLS config rustls
//! rejects, a port that can't be bound) are a different channel from
//! per-connection errors. The operator picks the reaction with
//! `make_server_throw`: halt, or log and keep the daemon up without a
//! registry listener.

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;

use tokio_rustls::rustls;
use tokio_rustls::rustls::server::VerifierBuilderError;

#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("failed to read {path}: {source}")]
    ReadMaterial {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid PEM in {what}: {source}")]
    Pem {
        what: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("no certificates found in {0}")]
    NoCertificates(&'static str),
    #[error("no private key found in key material")]
    NoPrivateKey,
    #[error("tls configuration rejected: {0}")]
    Tls(#[from] rustls::Error),
    #[error("cannot build client certificate verifier: {0}")]
    ClientVerifier(#[from] VerifierBuilderError),
    #[error("invalid bind address {0:?}")]
    Address(String),
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
}

/// Reaction to a [`SetupError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupPolicy {
    /// Surface the error; the daemon stops.
    Fatal,
    /// Log it and carry on with no registry listener.
    Degrade,
}

impl SetupPolicy {
    pub fn from_make_server_throw(make_server_throw: bool) -> Self {
        if make_server_throw {
            SetupPolicy::Fatal
        } else {
            SetupPolicy::Degrade
        }
    }

    /// Apply the policy to the result of a setup step.
    ///
    /// `Ok(Some(v))` on success, `Ok(None)` when a failure was degraded,
    /// `Err` when it is fatal.
    pub fn resolve<T>(self, result: Result<T, SetupError>) -> Result<Option<T>, SetupError> {
        match (result, self) {
            (Ok(value), _) => Ok(Some(value)),
            (Err(e), SetupPolicy::Fatal) => {
                tracing::error!(error = %e, "registry listener setup failed");
                Err(e)
            }
            (Err(e), SetupPolicy::Degrade) => {
                tracing::warn!(error = %e, "registry listener setup failed");
                tracing::warn!(
                    "make_server_throw is off: continuing, but no heartbeats will be accepted"
                );
                Ok(None)
            }
        }
    }
}
