//! Opening the transport: plain TCP or rustls over TCP.

use std::sync::{Arc, OnceLock};

use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tracing::debug;

use super::config::{Config, Security};
use crate::{Error, Result};

/// Anything a session can run over.
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Transport for T {}

/// A connected transport, plain or TLS.
pub type ImapStream = Box<dyn Transport>;

/// Shared TLS connector trusting the webpki root store.
pub fn tls_connector() -> TlsConnector {
    static CONNECTOR: OnceLock<TlsConnector> = OnceLock::new();
    CONNECTOR
        .get_or_init(|| {
            let roots = rustls::RootCertStore {
                roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
            };
            let config = rustls::ClientConfig::builder()
                .with_root_certificates(roots)
                .with_no_client_auth();
            TlsConnector::from(Arc::new(config))
        })
        .clone()
}

/// Connects to the configured server.
///
/// The TCP connect and, for [`Security::Implicit`], the TLS handshake must
/// finish within `connect_timeout`.
///
/// # Errors
///
/// Returns [`Error::Timeout`], an invalid host name, or the I/O error.
pub async fn connect(config: &Config) -> Result<ImapStream> {
    timeout(config.connect_timeout, open(config))
        .await
        .map_err(|_| Error::Timeout(config.connect_timeout))?
}

async fn open(config: &Config) -> Result<ImapStream> {
    let tcp = TcpStream::connect((config.host.as_str(), config.port)).await?;
    debug!(host = %config.host, port = config.port, security = %config.security, "Connected");

    if config.security == Security::None {
        return Ok(Box::new(tcp));
    }
    let server_name = ServerName::try_from(config.host.clone())?;
    let tls = tls_connector().connect(server_name, tcp).await?;
    debug!(host = %config.host, "TLS established");
    Ok(Box::new(tls))
}
