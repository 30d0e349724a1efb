mod config;
mod error;
mod events;
mod proxy;
mod tls;

use std::process;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::{Args, Config, LogFormat};
use crate::events::{EventReporter, TracingReporter};

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let config = match Config::from_args(args) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("fatal: {e}");
            process::exit(1);
        }
    };

    init_logging(&config.log_format);
    info!(
        remote = %config.remote_addr,
        bind = %config.bind_addr,
        no_verify = config.no_verify,
        client_cert = config.client_cert.is_some(),
        "tlsf starting"
    );

    let reporter: Arc<dyn EventReporter> = Arc::new(TracingReporter);

    let tls_config = match tls::build_client_config(&config, reporter.as_ref()) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "invalid TLS configuration");
            process::exit(1);
        }
    };

    if let Err(e) = proxy::listener::run(&config, tls_config, reporter).await {
        error!(error = %e, "forwarder exited with error");
        process::exit(1);
    }
}

fn init_logging(format: &LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    match format {
        LogFormat::Json => subscriber.json().init(),
        LogFormat::Pretty => subscriber.init(),
    }
}
