#![doc(html_root_url = "https://docs.rs/filewire/latest")]
//! Public API for the `filewire` library.
//!
//! `filewire` is a TCP file server speaking a small framed binary protocol.
//! Clients download files, upload files and obtain user ids; every logical
//! operation is tagged with an operation id so several can be in flight on
//! one connection.
//!
//! The crate is layered leaves first: [`packet`] and [`codec`] describe the
//! wire format, [`pool`], [`session`] and [`queue`] hold per-connection
//! state, [`dispatch`] and [`handler`] implement the protocol, and
//! [`connection`] and [`server`] drive sockets.

pub mod byte_order;
pub mod codec;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod handler;
pub mod metrics;
pub mod packet;
pub mod panic;
pub mod pool;
pub mod queue;
pub mod server;
pub mod session;
pub mod store;

pub use codec::{FrameAssembler, FrameError, FrameSender, PacketCodec};
pub use config::{ConfigError, LivenessConfig, ServerConfig};
pub use metrics::{CONNECTIONS_ACTIVE, Direction, ERRORS_TOTAL, FRAMES_PROCESSED};
pub use packet::{ErrorCode, FileKind, Packet, PacketHeader, RequestType};
pub use server::{BackoffConfig, FileServer, ServerError};
pub use session::{ConnectionId, Session};
pub use store::{FileStore, StoreError};
