//! Streams a stored file back to the client.

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

use super::{HandlerContext, RequestError, next_packet};
use crate::{
    packet::{FileDescriptor, FileKind, FileRequest, Packet, RequestType},
    queue::PacketReceiver,
};

/// Answer a `FileRequest` with a `FileInfo` followed by the file's chunks.
pub(super) async fn serve(
    ctx: &HandlerContext,
    inbox: &mut PacketReceiver,
) -> Result<(), RequestError> {
    let request_packet = next_packet(inbox).await?;
    if request_packet.request_type() != RequestType::FileRequest {
        return Err(RequestError::InvalidPacket(format!(
            "download opened by {}",
            request_packet.request_type()
        )));
    }
    let kind = request_packet.file_kind();
    let FileRequest { user_id, name } = FileRequest::parse(request_packet.payload())?;
    if !matches!(kind, FileKind::Dlc | FileKind::User) {
        return Err(RequestError::Argument(format!("file kind {kind:?}")));
    }
    if user_id == 0 {
        return Err(RequestError::Argument("user id 0".into()));
    }

    let (file, size) = ctx.store.open_file(kind, user_id, &name).await?;
    if size == 0 {
        return Err(RequestError::EmptyFile);
    }
    let descriptor = FileDescriptor {
        size,
        user_id,
        name,
    };
    stream_file(ctx, inbox, file, &descriptor, kind).await
}

/// Send `descriptor` as a `FileInfo` followed by `descriptor.size` bytes of
/// `reader` in `File` packets.
///
/// The first chunk is read before anything is queued, so a file that cannot
/// be read yields only the error reply. A read failing later, for instance
/// because the file shrank after it was measured, ends the transfer with an
/// `Error` packet after the chunks already sent.
async fn stream_file<R>(
    ctx: &HandlerContext,
    inbox: &mut PacketReceiver,
    mut reader: R,
    descriptor: &FileDescriptor,
    kind: FileKind,
) -> Result<(), RequestError>
where
    R: AsyncRead + Unpin,
{
    let chunk_size = ctx.limits.download_chunk;
    let mut remaining = usize::try_from(descriptor.size).unwrap_or(usize::MAX);
    let mut chunk = read_chunk(&mut reader, remaining.min(chunk_size)).await?;
    ctx.send(
        Packet::new(RequestType::FileInfo, descriptor.encode()?)
            .with_file_kind(kind)
            .with_continuation(true),
    )?;

    let mut sequence: u16 = 0;
    loop {
        if !ctx.is_live() || suspended(inbox) {
            debug!(operation_id = ctx.operation_id(), remaining, "download interrupted");
            return Err(RequestError::Suspended);
        }
        remaining -= chunk.len();
        sequence = sequence.wrapping_add(1);
        ctx.send(
            Packet::new(RequestType::File, chunk)
                .with_sequence(sequence)
                .with_file_kind(kind)
                .with_continuation(remaining > 0),
        )?;
        if remaining == 0 {
            break;
        }
        chunk = read_chunk(&mut reader, remaining.min(chunk_size)).await?;
    }
    debug!(
        operation_id = ctx.operation_id(),
        name = %descriptor.name,
        size = descriptor.size,
        chunks = sequence,
        "download queued"
    );
    Ok(())
}

async fn read_chunk<R>(reader: &mut R, len: usize) -> Result<Bytes, RequestError>
where
    R: AsyncRead + Unpin,
{
    let mut chunk = BytesMut::zeroed(len);
    reader.read_exact(&mut chunk).await?;
    Ok(chunk.freeze())
}

/// Check, without waiting, whether a suspend reached this handler.
fn suspended(inbox: &mut PacketReceiver) -> bool {
    std::iter::from_fn(|| inbox.try_recv())
        .any(|packet| matches!(packet.request_type(), RequestType::Suspend | RequestType::Error))
}
