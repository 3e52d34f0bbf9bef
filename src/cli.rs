//! Command line interface for the `filewire` server binary.
//!
//! Kept free of crate-internal imports so the build script can include it to
//! render the manual page.

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::PathBuf,
};

use clap::Parser;

/// Command line arguments for the `filewire` binary.
#[derive(Debug, Parser)]
#[command(name = "filewire", version, about = "Binary-protocol TCP file server")]
pub struct Cli {
    /// Address to listen on.
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub host: IpAddr,
    /// Port to listen on.
    #[arg(short, long, default_value_t = 2018)]
    pub port: u16,
    /// Base directory holding the `dlc` and `user` trees; created when missing.
    #[arg(short, long, default_value = "data")]
    pub root: PathBuf,
    /// Maximum number of concurrent clients.
    #[arg(long, default_value_t = 64)]
    pub max_clients: usize,
    /// Keepalive interval in milliseconds; the liveness window is 400 times
    /// longer.
    #[arg(long, default_value_t = 1000)]
    pub keepalive_ms: u64,
    /// Largest accepted upload in bytes.
    #[arg(long, default_value_t = 256 * 1024 * 1024)]
    pub max_upload: usize,
    /// Serve Prometheus metrics on this address.
    #[arg(long)]
    pub metrics_addr: Option<SocketAddr>,
}

impl Cli {
    /// Socket address the server binds.
    #[must_use]
    pub fn listen_addr(&self) -> SocketAddr { SocketAddr::new(self.host, self.port) }
}
