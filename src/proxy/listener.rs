use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rustls::ClientConfig;
use tokio::net::TcpListener;
use tracing::debug;

use crate::config::Config;
use crate::error::Result;
use crate::events::{EventReporter, ProxyEvent};
use crate::proxy::dialer::Remote;
use crate::proxy::forwarder;

/// Bind the plaintext listener and dispatch every accepted connection to its
/// own forwarder task.
///
/// Binding failure is fatal. Accept failures are reported and the loop keeps
/// going, so one faulty accept can never take down the whole proxy.
pub async fn run(
    config: &Config,
    tls_config: Arc<ClientConfig>,
    reporter: Arc<dyn EventReporter>,
) -> Result<()> {
    let listener = match TcpListener::bind(config.bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            reporter.report(ProxyEvent::ListenFailed {
                addr: config.bind_addr,
                error: e.to_string(),
            });
            return Err(e.into());
        }
    };

    reporter.report(ProxyEvent::Listening {
        addr: config.bind_addr,
    });

    let remote = Remote::new(config.remote_addr.clone(), config.remote_host.clone());
    let idle_timeout = config.idle_timeout;
    let next_id = AtomicU64::new(1);

    loop {
        let (stream, peer_addr) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                reporter.report(ProxyEvent::AcceptFailed {
                    error: e.to_string(),
                });
                continue;
            }
        };

        let id = next_id.fetch_add(1, Ordering::Relaxed);
        debug!(id, peer = %peer_addr, "accepted connection");

        let remote = remote.clone();
        let tls_config = Arc::clone(&tls_config);
        let reporter = Arc::clone(&reporter);
        tokio::spawn(async move {
            forwarder::forward(id, stream, &remote, tls_config, idle_timeout, reporter.as_ref())
                .await;
        });
    }
}
