//! Errors raised by [`FileServer`](super::FileServer) operations.

use std::io;

use thiserror::Error;

use crate::config::ConfigError;

/// Errors that may occur while building or binding the server.
///
/// Accept failures are retried with exponential back-off and never surface
/// here.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Binding or configuring the listener failed.
    #[error("bind error: {0}")]
    Bind(#[source] io::Error),
    /// The server configuration was rejected.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}
