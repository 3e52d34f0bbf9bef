//! Accept-loop utilities for server runtime.

use std::{io, net::SocketAddr, sync::Arc};

use async_trait::async_trait;
use log::warn;
use tokio::{
    net::{TcpListener, TcpStream},
    select,
    time::sleep,
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use super::backoff::BackoffConfig;
use crate::{
    config::ServerConfig,
    connection::ConnectionSlot,
    pool::ResourcePool,
    server::connection::spawn_connection_task,
    session::ConnectionId,
    store::FileStore,
};

/// Abstraction for sources of incoming connections consumed by the accept loop.
///
/// Implementations must be cancellation-safe: dropping a pending `accept()`
/// future must not leak resources.
#[async_trait]
pub(in crate::server) trait AcceptListener: Send + Sync {
    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)>;
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

#[async_trait]
impl AcceptListener for TcpListener {
    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)> {
        TcpListener::accept(self).await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> { TcpListener::local_addr(self) }
}

/// Everything the accept loop shares with the connections it spawns.
#[derive(Debug, Clone)]
pub(in crate::server) struct AcceptLoopOptions {
    pub pool: ResourcePool<ConnectionSlot>,
    pub store: Arc<FileStore>,
    pub config: ServerConfig,
    pub shutdown: CancellationToken,
    pub tracker: TaskTracker,
    pub backoff: BackoffConfig,
}

/// Accepts incoming connections and spawns a task for each one.
///
/// A slot is taken from the pool before every accept, so no connection is
/// accepted while every slot is in use. Failures to accept trigger an
/// exponential back-off governed by `options.backoff`. The loop terminates
/// when `options.shutdown` is cancelled or the pool is closed; spawned tasks
/// are tracked by `options.tracker` for graceful shutdown.
#[expect(
    clippy::integer_division_remainder_used,
    reason = "tokio::select! expands to modulus internally"
)]
pub(in crate::server) async fn accept_loop<L>(listener: Arc<L>, options: AcceptLoopOptions)
where
    L: AcceptListener + 'static,
{
    let backoff = options.backoff.normalized();
    debug_assert!(
        backoff.initial_delay <= backoff.max_delay,
        "BackoffConfig invariant violated: initial_delay > max_delay"
    );
    let shutdown = &options.shutdown;
    let mut delay = backoff.initial_delay;
    let mut accepted: u64 = 0;
    loop {
        let slot = select! {
            biased;

            () = shutdown.cancelled() => return,
            slot = options.pool.acquire() => match slot {
                Ok(slot) => slot,
                Err(e) => {
                    warn!("accept loop stopping: error={e}");
                    return;
                }
            },
        };
        let res = select! {
            biased;

            () = shutdown.cancelled() => return,
            res = listener.accept() => res,
        };
        match res {
            Ok((stream, peer_addr)) => {
                accepted += 1;
                spawn_connection_task(slot, stream, peer_addr, ConnectionId::new(accepted), &options);
                delay = backoff.initial_delay;
            }
            Err(e) => {
                drop(slot);
                let local_addr = listener.local_addr().ok();
                warn!("accept error: error={e:?}, local_addr={local_addr:?}");
                select! {
                    biased;

                    () = shutdown.cancelled() => return,
                    () = sleep(delay) => {}
                }
                delay = backoff.next_delay(delay);
            }
        }
    }
}
