//! Utilities for exercising a `filewire` server in tests.
//!
//! The helpers start a [`FileServer`](filewire::server::FileServer) on an
//! ephemeral localhost port over a temporary storage tree and talk to it
//! through a framed [`TestClient`].
//!
//! ```rust,no_run
//! use filewire_testing::{TestServer, TestStore};
//!
//! # async fn example() {
//! let store = TestStore::new();
//! store.write_user_file(7, "a.txt", b"hello");
//! let server = TestServer::start(&store).await;
//! let mut client = server.connect().await;
//! let (_, body) = client.download(7, "a.txt", 1).await;
//! assert_eq!(body, b"hello");
//! server.shutdown().await;
//! # }
//! ```

pub mod client;
pub mod macros;
pub mod packets;
pub mod server;
pub mod store;

pub use client::TestClient;
pub use packets::{file_chunks, file_info, file_request, id_request};
pub use server::{TestServer, unused_listener};
pub use store::{TestStore, test_store};
