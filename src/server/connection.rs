//! Connection task spawning for [`FileServer`](super::FileServer).

use std::{net::SocketAddr, sync::Arc};

use futures::FutureExt;
use log::{error, info, warn};
use tokio::net::TcpStream;

use super::runtime::AcceptLoopOptions;
use crate::{
    connection::{ActiveConnection, ConnectionSlot, active_connection_count, serve_connection},
    metrics,
    panic::PanicMessage,
    pool::PoolEntry,
    session::ConnectionId,
};

/// Spawn a task serving one TCP connection, logging and discarding any panics.
///
/// The slot is released only after the connection future has returned or
/// unwound, so it is never handed to another client while in use.
pub(super) fn spawn_connection_task(
    mut slot: PoolEntry<ConnectionSlot>,
    stream: TcpStream,
    peer_addr: SocketAddr,
    id: ConnectionId,
    options: &AcceptLoopOptions,
) {
    if let Err(e) = stream.set_nodelay(true) {
        warn!("failed to disable Nagle's algorithm: error={e}, peer_addr={peer_addr}");
    }
    slot.session_mut().attach(id, Some(peer_addr));
    let store = Arc::clone(&options.store);
    let config = options.config;
    let shutdown = options.shutdown.clone();
    options.tracker.spawn(async move {
        let active = ActiveConnection::new();
        info!(
            "connection accepted: id={id}, peer_addr={peer_addr}, active={}",
            active_connection_count()
        );
        let fut = std::panic::AssertUnwindSafe(serve_connection(
            &mut slot, stream, store, &config, &shutdown,
        ))
        .catch_unwind();

        match fut.await {
            Ok(code) => info!("connection closed: id={id}, peer_addr={peer_addr}, code={code}"),
            Err(panic) => {
                metrics::inc_panics();
                let panic_msg = PanicMessage::new(panic.as_ref());
                // Emit via both `log` and `tracing` for tests that capture either.
                error!("connection task panicked: panic={panic_msg}, id={id}, peer_addr={peer_addr}");
                tracing::error!(panic = %panic_msg, %id, %peer_addr, "connection task panicked");
            }
        }
        drop(active);
        slot.release();
    });
}
