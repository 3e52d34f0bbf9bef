//! Configuration utilities for [`FileServer`].

use std::sync::Arc;

use tokio::sync::oneshot;

use super::{BackoffConfig, FileServer, ServerError, ServerState, Unbound};
use crate::{config::ServerConfig, store::FileStore};

mod binding;


impl FileServer<Unbound> {
    /// Create a server serving files from `store` with the default
    /// [`ServerConfig`].
    ///
    /// The TCP listener is unset; call [`bind`](Self::bind) before running
    /// the server.
    ///
    /// # Examples
    ///
    /// ```
    /// use filewire::{server::FileServer, store::FileStore};
    ///
    /// let server = FileServer::new(FileStore::new("/srv/dlc", "/srv/user"));
    /// assert_eq!(server.config().max_clients, 64);
    /// ```
    #[must_use]
    pub fn new(store: FileStore) -> Self { Self::with_store(Arc::new(store)) }

    /// Create a server sharing an existing store handle.
    #[must_use]
    pub fn with_store(store: Arc<FileStore>) -> Self {
        Self {
            store,
            config: ServerConfig::default(),
            backoff_config: BackoffConfig::default(),
            ready_tx: None,
            state: Unbound,
        }
    }
}

impl<S> FileServer<S>
where
    S: ServerState,
{
    /// Replace the connection and resource limits.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Config`] if `config` fails validation.
    ///
    /// # Examples
    ///
    /// ```
    /// use filewire::{config::ServerConfig, server::FileServer, store::FileStore};
    ///
    /// let config = ServerConfig {
    ///     max_clients: 0,
    ///     ..ServerConfig::default()
    /// };
    /// let server = FileServer::new(FileStore::new("dlc", "user"));
    /// assert!(server.with_config(config).is_err());
    /// ```
    pub fn with_config(mut self, config: ServerConfig) -> Result<Self, ServerError> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    /// Configure the accept-loop back-off.
    ///
    /// Values are normalised so the initial delay is at least one
    /// millisecond and never exceeds the maximum.
    #[must_use]
    pub fn accept_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff_config = backoff.normalized();
        self
    }

    /// Configure a channel used to signal when the server is ready to accept
    /// connections.
    #[must_use]
    pub fn ready_signal(mut self, tx: oneshot::Sender<()>) -> Self {
        self.ready_tx = Some(tx);
        self
    }

    /// Connection and resource limits in effect.
    #[inline]
    #[must_use]
    pub const fn config(&self) -> &ServerConfig { &self.config }

    /// Back-off applied after failed accepts.
    #[inline]
    #[must_use]
    pub const fn backoff_config(&self) -> BackoffConfig { self.backoff_config }

    /// Store shared by every connection.
    #[must_use]
    pub fn store(&self) -> &FileStore { &self.store }
}
