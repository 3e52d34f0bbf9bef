//! Tokio-based TCP server for the file protocol.
//!
//! `FileServer` accepts connections into a fixed pool of
//! [`ConnectionSlot`](crate::connection::ConnectionSlot)s: a slot is acquired
//! before each accept, so a full pool stops the server from accepting until a
//! client disconnects. Each accepted connection is served on its own task and
//! its slot is recycled once the connection has been torn down completely.

use std::sync::Arc;

use tokio::{net::TcpListener, sync::oneshot};

use crate::{config::ServerConfig, store::FileStore};

/// TCP server sharing one [`FileStore`] between its connections.
///
/// The server carries a typestate `S` indicating whether it is [`Unbound`]
/// (not yet bound to a TCP listener) or [`Bound`]. New servers start
/// `Unbound` and must call [`FileServer::bind`] or
/// [`FileServer::bind_existing_listener`] before running.
pub struct FileServer<S = Unbound>
where
    S: ServerState,
{
    pub(crate) store: Arc<FileStore>,
    pub(crate) config: ServerConfig,
    pub(crate) backoff_config: BackoffConfig,
    /// Channel used to notify when the server is ready.
    ///
    /// A `oneshot::Sender` can transmit only one readiness notification, so a
    /// new sender must be provided each time the server is started.
    pub(crate) ready_tx: Option<oneshot::Sender<()>>,
    /// Typestate tracking whether the server has been bound to a listener.
    pub(crate) state: S,
}

/// Marker indicating the server has not yet bound a listener.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unbound;

/// Marker indicating the server is bound to a TCP listener.
#[derive(Debug, Clone)]
pub struct Bound {
    pub(crate) listener: Arc<TcpListener>,
}

/// Trait implemented by [`Unbound`] and [`Bound`] to model binding typestate.
pub trait ServerState: sealed::Sealed {}

mod sealed {
    //! Prevent external implementations of [`ServerState`].

    pub trait Sealed {}
    impl Sealed for super::Unbound {}
    impl Sealed for super::Bound {}
}

impl ServerState for Unbound {}
impl ServerState for Bound {}

mod config;
mod connection;
pub mod error;
mod runtime;

pub use error::ServerError;
/// Re-exported configuration types for server backoff behaviour.
pub use runtime::BackoffConfig;

#[cfg(test)]
pub(crate) mod test_util;
