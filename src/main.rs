//! `filewire` server binary.
//!
//! Parses CLI arguments, prepares the storage tree and serves until Ctrl+C.

mod cli;

use std::{error::Error, net::SocketAddr, time::Duration};

use clap::Parser;
use filewire::{
    config::{LivenessConfig, ServerConfig},
    server::FileServer,
    store::FileStore,
};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Applications embedding the library should install their own subscriber.
    tracing_subscriber::fmt::init();

    let cli = cli::Cli::parse();
    install_metrics(cli.metrics_addr)?;

    let store = FileStore::bootstrap(&cli.root).await?;
    let config = ServerConfig {
        max_clients: cli.max_clients,
        max_upload: cli.max_upload,
        liveness: LivenessConfig::from_keepalive(Duration::from_millis(cli.keepalive_ms)),
        ..ServerConfig::default()
    };
    let server = FileServer::new(store)
        .with_config(config)?
        .bind(cli.listen_addr())?;
    info!(addr = ?server.local_addr(), root = %cli.root.display(), "filewire listening");
    server.run().await?;
    info!("filewire stopped");
    Ok(())
}

#[cfg(feature = "metrics")]
fn install_metrics(addr: Option<SocketAddr>) -> Result<(), Box<dyn Error>> {
    if let Some(addr) = addr {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()?;
        info!(%addr, "serving metrics");
    }
    Ok(())
}

#[cfg(not(feature = "metrics"))]
#[allow(clippy::unnecessary_wraps, reason = "mirrors the metrics-enabled signature")]
fn install_metrics(addr: Option<SocketAddr>) -> Result<(), Box<dyn Error>> {
    if addr.is_some() {
        tracing::warn!("built without the metrics feature; ignoring --metrics-addr");
    }
    Ok(())
}
