//! Socket loops: bytes to packets on the way in, packets to bytes on the way
//! out.

use std::{io, time::Duration};

use bytes::BytesMut;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    select,
    sync::Notify,
    time::timeout,
};
use tracing::{debug, warn};

use crate::{
    codec::{FrameAssembler, FrameSender},
    metrics::{self, Direction},
    packet::{ErrorCode, Packet},
    queue::PacketReceiver,
    session::Session,
};

/// Read from `reader` until the connection ends, pushing every assembled
/// packet into the session inbound queue.
///
/// `activity` is notified once per packet. When the stream ends or breaks a
/// `Suspend` is injected so the dispatcher tears the session down; framing
/// errors additionally request a farewell frame for the peer.
#[expect(
    clippy::integer_division_remainder_used,
    reason = "tokio::select! expands to modulus internally"
)]
pub(super) async fn receive_loop<R>(
    reader: &mut R,
    assembler: &mut FrameAssembler,
    buf: &mut BytesMut,
    session: &Session,
    activity: &Notify,
) where
    R: AsyncRead + Unpin,
{
    let mut ready = Vec::new();
    let code = loop {
        buf.clear();
        let read = select! {
            biased;

            () = session.liveness().cancelled() => return,
            read = reader.read_buf(buf) => read,
        };
        match read {
            Ok(0) => {
                if let Err(e) = assembler.finish() {
                    debug!(connection = %session.id(), error = %e, "stream ended mid-frame");
                }
                break ErrorCode::SocketClosed;
            }
            Ok(_) => {
                let outcome = assembler.feed(&buf[..], &mut ready);
                for packet in ready.drain(..) {
                    metrics::inc_frames(Direction::Inbound);
                    activity.notify_one();
                    let _ = session.inbound().send(packet);
                }
                if let Err(e) = outcome {
                    warn!(connection = %session.id(), peer = ?session.peer_addr(), error = %e, "malformed frame");
                    metrics::inc_errors("frame");
                    let code = e.suspend_code();
                    session.request_farewell(code);
                    break code;
                }
            }
            Err(e) => {
                debug!(connection = %session.id(), error = %e, "read failed");
                break ErrorCode::SocketClosed;
            }
        }
    };
    let _ = session.inbound().send(Packet::suspend(code));
}

/// Write queued packets to `writer` until the session dies.
///
/// Packets are written one at a time in slices of the sender's chunk size.
/// Once the session is torn down the packet in flight is completed and the
/// requested farewell, if any, is written, both bounded by `linger`.
pub(super) async fn send_loop<W>(
    writer: &mut W,
    sender: &mut FrameSender,
    outbound: &mut PacketReceiver,
    session: &Session,
    linger: Duration,
) where
    W: AsyncWrite + Unpin,
{
    if let Err(e) = transmit(writer, sender, outbound, session).await {
        debug!(connection = %session.id(), error = %e, "write failed");
        metrics::inc_errors("socket");
        let _ = session.inbound().send(Packet::suspend(ErrorCode::SocketClosed));
        return;
    }
    let farewell = session.farewell();
    let finished = timeout(linger, async {
        sender.flush_staged(writer).await?;
        if let Some(code) = farewell {
            sender.send(&Packet::suspend(code), writer).await?;
            metrics::inc_frames(Direction::Outbound);
        }
        Ok::<_, io::Error>(())
    })
    .await;
    match finished {
        Ok(Ok(())) => {
            if let Some(code) = farewell {
                debug!(connection = %session.id(), %code, "farewell sent");
            }
        }
        Ok(Err(e)) => debug!(connection = %session.id(), error = %e, "farewell not delivered"),
        Err(_) => debug!(connection = %session.id(), ?linger, "farewell timed out"),
    }
}

#[expect(
    clippy::integer_division_remainder_used,
    reason = "tokio::select! expands to modulus internally"
)]
async fn transmit<W>(
    writer: &mut W,
    sender: &mut FrameSender,
    outbound: &mut PacketReceiver,
    session: &Session,
) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    loop {
        let packet = select! {
            biased;

            () = session.liveness().cancelled() => return Ok(()),
            packet = outbound.recv() => match packet {
                Some(packet) => packet,
                None => return Ok(()),
            },
        };
        if let Err(e) = sender.stage(&packet) {
            warn!(connection = %session.id(), error = %e, request = %packet.request_type(), "dropping unencodable packet");
            continue;
        }
        while !sender.is_idle() {
            select! {
                biased;

                () = session.liveness().cancelled() => return Ok(()),
                written = sender.write_chunk(writer) => { written?; }
            }
        }
        writer.flush().await?;
        metrics::inc_frames(Direction::Outbound);
    }
}
