//! Per-connection driver.
//!
//! [`serve_connection`] runs the receive loop, the send loop, the dispatcher,
//! the liveness supervisor and the keepalive as concurrently polled futures
//! over one [`ConnectionSlot`]. It returns once all of them have stopped and
//! every handler task has finished, so the slot can be recycled safely.

use std::sync::Arc;

use bytes::BytesMut;
use tokio::{
    io::{AsyncRead, AsyncWrite, AsyncWriteExt},
    sync::Notify,
    time::timeout,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::{
    codec::{FrameAssembler, FrameSender},
    config::ServerConfig,
    dispatch::{Dispatcher, liveness},
    handler::HandlerLimits,
    packet::ErrorCode,
    pool::Recycle,
    session::Session,
    store::FileStore,
};

mod counter;
mod transport;

pub use counter::{ActiveConnection, active_connection_count};

/// Reusable state of one connection: the pool entry type.
#[derive(Debug)]
pub struct ConnectionSlot {
    session: Session,
    assembler: FrameAssembler,
    read_buf: BytesMut,
    sender: FrameSender,
}

impl ConnectionSlot {
    /// Allocate a slot sized by `config`.
    #[must_use]
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            session: Session::new(),
            assembler: FrameAssembler::new(config.max_payload),
            read_buf: BytesMut::with_capacity(config.read_buffer),
            sender: FrameSender::new(config.send_chunk),
        }
    }

    /// Session record of the connection using this slot.
    #[must_use]
    pub const fn session(&self) -> &Session { &self.session }

    /// Mutable access to the session, used to attach a new connection.
    pub fn session_mut(&mut self) -> &mut Session { &mut self.session }

    /// Report whether the slot holds no state from a previous connection.
    #[must_use]
    pub fn is_pristine(&self) -> bool {
        self.session.is_live()
            && self.session.user_id() == 0
            && self.assembler.is_idle()
            && self.read_buf.is_empty()
            && self.sender.is_idle()
    }
}

impl Recycle for ConnectionSlot {
    fn recycle(&mut self) {
        self.session.reset();
        self.assembler.reset();
        self.read_buf.clear();
        self.sender.reset();
    }
}

/// Serve one client over `stream` until the session is suspended.
///
/// Returns the code the session was suspended with. The stream is shut down
/// before returning.
pub async fn serve_connection<S>(
    slot: &mut ConnectionSlot,
    stream: S,
    store: Arc<FileStore>,
    config: &ServerConfig,
    shutdown: &CancellationToken,
) -> ErrorCode
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let ConnectionSlot {
        session,
        assembler,
        read_buf,
        sender,
    } = slot;
    let (Some(inbox), Some(mut outbound)) = (session.take_inbound(), session.take_outbound())
    else {
        error!(connection = %session.id(), "connection slot was not recycled");
        return ErrorCode::Unknown;
    };
    let session: &Session = session;
    let limits = HandlerLimits {
        download_chunk: config.download_chunk,
        max_upload: config.max_upload,
    };
    let dispatcher = Dispatcher::new(session, store, limits);
    let activity = Notify::new();
    let (mut reader, mut writer) = tokio::io::split(stream);

    debug!(connection = %session.id(), peer = ?session.peer_addr(), "serving connection");
    let ((), (), code, (), ()) = tokio::join!(
        transport::receive_loop(&mut reader, assembler, read_buf, session, &activity),
        transport::send_loop(&mut writer, sender, &mut outbound, session, config.linger),
        dispatcher.run(inbox, shutdown.clone()),
        liveness::supervise(session, &activity, config.liveness),
        liveness::keepalive(session, config.liveness.keepalive),
    );

    let mut stream = reader.unsplit(writer);
    if let Ok(Err(e)) = timeout(config.linger, stream.shutdown()).await {
        debug!(connection = %session.id(), error = %e, "socket shutdown failed");
    }
    debug!(connection = %session.id(), %code, "connection closed");
    code
}

#[cfg(test)]
mod tests;
