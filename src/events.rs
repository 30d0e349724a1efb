//! Lifecycle events emitted by the forwarding core.
//!
//! The core never talks to the log sink directly; it hands typed events to an
//! injected [`EventReporter`]. [`TracingReporter`] is the production sink and
//! owns the severity mapping.

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;

use tracing::{debug, error, info, warn};

/// One relay direction within a forwarded connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    LocalToRemote,
    RemoteToLocal,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LocalToRemote => write!(f, "local->remote"),
            Self::RemoteToLocal => write!(f, "remote->local"),
        }
    }
}

/// Lifecycle and error events produced by the forwarding core.
///
/// Errors are carried as formatted strings so events stay cheap to clone and
/// free of sink policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyEvent {
    Listening {
        addr: SocketAddr,
    },
    ListenFailed {
        addr: SocketAddr,
        error: String,
    },
    AcceptFailed {
        error: String,
    },
    DialFailed {
        id: u64,
        remote_addr: String,
        error: String,
    },
    ConnectionStarted {
        id: u64,
    },
    ConnectionEnded {
        id: u64,
    },
    /// One relay direction finished; `error` is `None` on a clean close.
    RelayEnded {
        id: u64,
        direction: Direction,
        error: Option<String>,
    },
    /// A supplied CA certificate could not be used; server verification falls
    /// back to the default trust store.
    CaCertWarning {
        path: PathBuf,
        error: String,
    },
}

pub trait EventReporter: Send + Sync {
    fn report(&self, event: ProxyEvent);
}

/// Routes events to the `tracing` subscriber.
pub struct TracingReporter;

impl EventReporter for TracingReporter {
    fn report(&self, event: ProxyEvent) {
        match event {
            ProxyEvent::Listening { addr } => {
                info!(addr = %addr, "listening for plaintext connections");
            }
            ProxyEvent::ListenFailed { addr, error } => {
                error!(addr = %addr, error = %error, "failed to listen");
            }
            ProxyEvent::AcceptFailed { error } => {
                error!(error = %error, "failed to accept connection");
            }
            ProxyEvent::DialFailed { id, remote_addr, error } => {
                error!(id, remote = %remote_addr, error = %error, "failed to dial remote");
            }
            ProxyEvent::ConnectionStarted { id } => {
                info!(id, "connection started");
            }
            ProxyEvent::ConnectionEnded { id } => {
                info!(id, "connection ended");
            }
            ProxyEvent::RelayEnded { id, direction, error } => match error {
                // Loss of a relay direction is routine TCP teardown, so a
                // genuine error is still only informational.
                Some(error) => info!(id, direction = %direction, error = %error, "relay failed"),
                None => debug!(id, direction = %direction, "relay closed"),
            },
            ProxyEvent::CaCertWarning { path, error } => {
                warn!(
                    path = %path.display(),
                    error = %error,
                    "CA certificate not loaded, falling back to default trust store"
                );
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_display() {
        assert_eq!(Direction::LocalToRemote.to_string(), "local->remote");
        assert_eq!(Direction::RemoteToLocal.to_string(), "remote->local");
    }

    #[test]
    fn recording_reporter_captures_in_order() {
        use super::test_support::RecordingReporter;

        let reporter = RecordingReporter::new();
        reporter.report(ProxyEvent::ConnectionStarted { id: 1 });
        reporter.report(ProxyEvent::ConnectionEnded { id: 1 });

        assert_eq!(
            reporter.events(),
            vec![
                ProxyEvent::ConnectionStarted { id: 1 },
                ProxyEvent::ConnectionEnded { id: 1 },
            ]
        );
    }
}
