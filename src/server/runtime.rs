//! Runtime control for [`FileServer`].

mod accept;
mod backoff;

pub(super) use accept::{AcceptLoopOptions, accept_loop};
pub use backoff::BackoffConfig;
use futures::Future;
use log::{info, warn};
use tokio::{select, signal};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use super::{Bound, FileServer, ServerError};
use crate::{connection::ConnectionSlot, pool::ResourcePool};

impl FileServer<Bound> {
    /// Run the server until a shutdown signal is received.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use filewire::{server::FileServer, store::FileStore};
    ///
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), filewire::server::ServerError> {
    /// let server = FileServer::new(FileStore::new("data/dlc", "data/user"))
    ///     .bind(([127, 0, 0, 1], 2018).into())?;
    /// server.run().await?;
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// Attempting to run a server without binding fails to compile:
    ///
    /// ```compile_fail
    /// use filewire::{server::FileServer, store::FileStore};
    ///
    /// async fn try_run() {
    ///     FileServer::new(FileStore::new("dlc", "user"))
    ///         .run()
    ///         .await
    ///         .expect("unbound servers do not expose run()");
    /// }
    /// ```
    ///
    /// # Errors
    ///
    /// Accept failures are retried with exponential back-off and do not
    /// surface as errors.
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_with_shutdown(async {
            let _ = signal::ctrl_c().await;
        })
        .await
    }

    /// Run the server until the `shutdown` future resolves.
    ///
    /// On shutdown the accept loop stops, every open connection is
    /// suspended with `ManualShutdown` and the call returns once all
    /// connection tasks have finished.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use filewire::{server::FileServer, store::FileStore};
    /// use tokio::sync::oneshot;
    ///
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), filewire::server::ServerError> {
    /// let server = FileServer::new(FileStore::new("data/dlc", "data/user"))
    ///     .bind(([127, 0, 0, 1], 0).into())?;
    ///
    /// let (tx, rx) = oneshot::channel::<()>();
    /// let handle = tokio::spawn(async move {
    ///     server
    ///         .run_with_shutdown(async {
    ///             let _ = rx.await;
    ///         })
    ///         .await
    /// });
    ///
    /// let _ = tx.send(());
    /// handle
    ///     .await
    ///     .expect("join server task")
    ///     .expect("server run failed");
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    ///
    /// Accept failures are retried with exponential back-off and do not
    /// surface as errors.
    #[expect(
        clippy::integer_division_remainder_used,
        reason = "tokio::select! expands to modulus internally"
    )]
    pub async fn run_with_shutdown<S>(self, shutdown: S) -> Result<(), ServerError>
    where
        S: Future<Output = ()> + Send,
    {
        let FileServer {
            store,
            config,
            backoff_config,
            ready_tx,
            state: Bound { listener },
        } = self;
        config.validate()?;
        let shutdown_token = CancellationToken::new();
        let tracker = TaskTracker::new();
        let pool = ResourcePool::new(config.max_clients, move || ConnectionSlot::new(&config));

        tracker.spawn(accept_loop(
            listener,
            AcceptLoopOptions {
                pool: pool.clone(),
                store,
                config,
                shutdown: shutdown_token.clone(),
                tracker: tracker.clone(),
                backoff: backoff_config,
            },
        ));

        // Signal readiness once the accept loop has been spawned.
        if let Some(tx) = ready_tx
            && tx.send(()).is_err()
        {
            warn!("Failed to send readiness signal: receiver dropped");
        }

        select! {
            () = shutdown => shutdown_token.cancel(),
            () = tracker.wait() => {},
        }

        info!("shutting down: connections={}", pool.in_use());
        pool.close();
        tracker.close();
        tracker.wait().await;
        Ok(())
    }
}
