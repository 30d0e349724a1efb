use std::sync::Arc;

use rustls::pki_types::ServerName;
use rustls::ClientConfig;
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

use crate::error::{Error, Result};

/// The remote TLS endpoint every forwarded connection dials.
#[derive(Debug, Clone)]
pub struct Remote {
    pub addr: String,
    /// Host portion of `addr`, used as the SNI name.
    pub host: String,
}

impl Remote {
    pub fn new(addr: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            host: host.into(),
        }
    }
}

/// Open a TCP connection to the remote and complete the TLS handshake.
pub async fn dial(remote: &Remote, tls_config: Arc<ClientConfig>) -> Result<TlsStream<TcpStream>> {
    let stream = TcpStream::connect(&remote.addr).await?;
    let _ = stream.set_nodelay(true);

    let server_name = ServerName::try_from(remote.host.clone())
        .map_err(|e| Error::Tls(format!("invalid TLS server name '{}': {e}", remote.host)))?;

    let connector = TlsConnector::from(tls_config);
    Ok(connector.connect(server_name, stream).await?)
}
