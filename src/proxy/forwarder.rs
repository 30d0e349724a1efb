//! Per-connection forwarder: dials the remote, then relays bytes in both
//! directions until each side has closed.
//!
//! `copy_bidirectional` is deliberately not used here: it gives up on the
//! first error in either direction, while each relay direction must outlive
//! the other and report its own outcome.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use rustls::ClientConfig;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::events::{Direction, EventReporter, ProxyEvent};
use crate::proxy::dialer::{self, Remote};

pub const BUFFER_SIZE: usize = 8192;

/// Forward one accepted local connection to the remote TLS endpoint.
///
/// Owns both sockets for the lifetime of the pair; they are closed on every
/// exit path, including the dial-failure path where the local stream is
/// dropped without a relay ever starting.
pub async fn forward(
    id: u64,
    local: TcpStream,
    remote: &Remote,
    tls_config: Arc<ClientConfig>,
    idle_timeout: Option<Duration>,
    reporter: &dyn EventReporter,
) {
    let remote_stream = match dialer::dial(remote, tls_config).await {
        Ok(stream) => stream,
        Err(e) => {
            reporter.report(ProxyEvent::DialFailed {
                id,
                remote_addr: remote.addr.clone(),
                error: e.to_string(),
            });
            return;
        }
    };

    reporter.report(ProxyEvent::ConnectionStarted { id });

    let (mut local_read, mut local_write) = local.into_split();
    let (mut remote_read, mut remote_write) = tokio::io::split(remote_stream);

    let upstream = async {
        let result = relay(&mut local_read, &mut remote_write, idle_timeout).await;
        reporter.report(ProxyEvent::RelayEnded {
            id,
            direction: Direction::LocalToRemote,
            error: result.err().map(|e| e.to_string()),
        });
    };

    let downstream = async {
        let result = relay(&mut remote_read, &mut local_write, idle_timeout).await;
        reporter.report(ProxyEvent::RelayEnded {
            id,
            direction: Direction::RemoteToLocal,
            error: result.err().map(|e| e.to_string()),
        });
    };

    // Completion of one direction must not cancel the other; a connection
    // that only ever sends must still relay until its peer closes.
    tokio::join!(upstream, downstream);

    reporter.report(ProxyEvent::ConnectionEnded { id });
}

/// Copy bytes from `src` to `dst` until EOF or an error.
///
/// A clean EOF shuts down the destination's write side so the half-close
/// reaches the peer.
async fn relay<R, W>(src: &mut R, dst: &mut W, idle_timeout: Option<Duration>) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = [0u8; BUFFER_SIZE];
    loop {
        let n = match idle_timeout {
            Some(limit) => timeout(limit, src.read(&mut buf))
                .await
                .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "relay idle timeout"))??,
            None => src.read(&mut buf).await?,
        };
        if n == 0 {
            break;
        }
        dst.write_all(&buf[..n]).await?;
    }

    let _ = dst.shutdown().await;
    Ok(())
}
