//! A [`FileServer`] running on an ephemeral localhost port.

use std::{
    net::{Ipv4Addr, SocketAddr, TcpListener as StdTcpListener},
    time::Duration,
};

use filewire::{ServerConfig, server::FileServer};
use tokio::{sync::oneshot, task::JoinHandle};

use crate::{client::TestClient, store::TestStore};

/// Bind a std listener on a free localhost port.
///
/// Holding the listener until the server takes it over keeps the port from
/// being claimed in between.
///
/// # Panics
///
/// Panics if no port can be bound.
#[must_use]
pub fn unused_listener() -> StdTcpListener {
    StdTcpListener::bind(SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 0))
        .expect("bind free port listener")
}

/// Handle to a running server task.
#[derive(Debug)]
pub struct TestServer {
    addr: SocketAddr,
    stop: Option<oneshot::Sender<()>>,
    handle: JoinHandle<Result<(), filewire::ServerError>>,
}

impl TestServer {
    /// Start a server with the default configuration over `store`.
    ///
    /// # Panics
    ///
    /// Panics if the server cannot be bound or does not become ready.
    pub async fn start(store: &TestStore) -> Self {
        Self::start_with(store, ServerConfig::default()).await
    }

    /// Start a server with `config` over `store`.
    ///
    /// Returns once the accept loop is running.
    ///
    /// # Panics
    ///
    /// Panics if `config` is invalid, the server cannot be bound, or it does
    /// not become ready within five seconds.
    pub async fn start_with(store: &TestStore, config: ServerConfig) -> Self {
        let (ready_tx, ready_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let server = FileServer::with_store(store.store())
            .with_config(config)
            .expect("valid server config")
            .ready_signal(ready_tx)
            .bind_existing_listener(unused_listener())
            .expect("bind test server");
        let addr = server.local_addr().expect("bound address");
        let handle = tokio::spawn(server.run_with_shutdown(async {
            let _ = stop_rx.await;
        }));
        tokio::time::timeout(Duration::from_secs(5), ready_rx)
            .await
            .expect("server ready in time")
            .expect("ready sender kept");
        Self {
            addr,
            stop: Some(stop_tx),
            handle,
        }
    }

    /// Address the server accepts on.
    #[must_use]
    pub fn addr(&self) -> SocketAddr { self.addr }

    /// Open a framed client connection.
    ///
    /// # Panics
    ///
    /// Panics if the connection is refused.
    pub async fn connect(&self) -> TestClient { TestClient::connect(self.addr).await }

    /// Signal shutdown and wait for every connection task to finish.
    ///
    /// # Panics
    ///
    /// Panics if the server does not stop within five seconds or its task
    /// failed.
    pub async fn shutdown(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        tokio::time::timeout(Duration::from_secs(5), &mut self.handle)
            .await
            .expect("server stopped in time")
            .expect("join server task")
            .expect("server run failed");
    }
}
