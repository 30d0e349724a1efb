use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::error::{Error, Result};

/// Command-line surface of the forwarder.
#[derive(Parser, Debug)]
#[command(name = "tlsf", version)]
#[command(about = "Forward plaintext TCP connections to a TLS-protected remote endpoint")]
pub struct Args {
    /// Skip verifying the remote server certificate
    #[arg(long)]
    pub no_verify: bool,

    /// CA certificate PEM file used to verify the remote server
    #[arg(long, value_name = "PATH")]
    pub ca_cert: Option<PathBuf>,

    /// Client certificate PEM file presented to the remote server
    #[arg(long, value_name = "PATH")]
    pub cert: Option<PathBuf>,

    /// Client private key PEM file
    #[arg(long, value_name = "PATH")]
    pub key: Option<PathBuf>,

    /// Close connections with no traffic in either direction after this many seconds
    #[arg(long, value_name = "SECS")]
    pub idle_timeout: Option<u64>,

    /// Remote TLS endpoint as host:port
    pub remote_addr: String,

    /// Local plaintext bind address as address:port
    pub bind_addr: SocketAddr,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub remote_addr: String,
    /// Host portion of `remote_addr`, used as the SNI name for the handshake.
    pub remote_host: String,
    pub bind_addr: SocketAddr,
    pub no_verify: bool,
    pub ca_cert: Option<PathBuf>,
    pub client_cert: Option<PathBuf>,
    pub client_key: Option<PathBuf>,
    pub idle_timeout: Option<Duration>,
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl Config {
    pub fn from_args(args: Args) -> Result<Self> {
        let remote_host = remote_host(&args.remote_addr)?;

        let log_format = match env::var("LOG_FORMAT")
            .unwrap_or_else(|_| "pretty".into())
            .to_lowercase()
            .as_str()
        {
            "json" => LogFormat::Json,
            "pretty" => LogFormat::Pretty,
            other => {
                return Err(Error::Config(format!(
                    "invalid LOG_FORMAT '{other}': must be 'json' or 'pretty'"
                )))
            }
        };

        Ok(Config {
            remote_addr: args.remote_addr,
            remote_host,
            bind_addr: args.bind_addr,
            no_verify: args.no_verify,
            ca_cert: args.ca_cert,
            client_cert: args.cert,
            client_key: args.key,
            idle_timeout: args.idle_timeout.map(Duration::from_secs),
            log_format,
        })
    }
}

/// Extract the host portion of a `host:port` address.
///
/// Bracketed IPv6 literals (`[::1]:8443`) have their brackets stripped so the
/// result is usable as a TLS server name.
fn remote_host(remote_addr: &str) -> Result<String> {
    let (host, port) = remote_addr
        .rsplit_once(':')
        .ok_or_else(|| Error::Config(format!("remote address '{remote_addr}' must be host:port")))?;

    if host.is_empty() || port.is_empty() || port.parse::<u16>().is_err() {
        return Err(Error::Config(format!(
            "remote address '{remote_addr}' must be host:port"
        )));
    }

    Ok(host
        .trim_start_matches('[')
        .trim_end_matches(']')
        .to_string())
}
