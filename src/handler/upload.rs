//! Receives a file from the client and stores it.

use bytes::BytesMut;
use tracing::debug;

use super::{HandlerContext, HandlerLimits, RequestError, next_packet};
use crate::{
    packet::{ErrorCode, FileDescriptor, FileKind, Packet, RequestType},
    queue::PacketReceiver,
};

/// Accumulate the chunks following a `FileInfo` and save them on the last.
pub(super) async fn receive(
    ctx: &HandlerContext,
    inbox: &mut PacketReceiver,
) -> Result<(), RequestError> {
    let info = next_packet(inbox).await?;
    if info.request_type() != RequestType::FileInfo {
        return Err(RequestError::InvalidPacket(format!(
            "upload opened by {}",
            info.request_type()
        )));
    }
    if !info.continuation() {
        return Err(RequestError::InvalidPacket(
            "file info is marked as the last frame".into(),
        ));
    }
    let kind = info.file_kind();
    let FileDescriptor {
        size,
        user_id,
        name,
    } = FileDescriptor::parse(info.payload())?;
    if user_id == 0 {
        return Err(RequestError::Argument("user id 0".into()));
    }
    if !matches!(kind, FileKind::Dlc | FileKind::User) {
        return Err(RequestError::FileNotFound);
    }
    let limit = ctx.limits.max_upload;
    let declared = usize::try_from(size).unwrap_or(usize::MAX);
    if declared > limit {
        return Err(too_large(declared, limit));
    }

    let mut data = BytesMut::with_capacity(initial_capacity(declared, ctx.limits));
    loop {
        let packet = next_packet(inbox).await?;
        match packet.request_type() {
            RequestType::File => {}
            RequestType::FileInfo => {
                return Err(RequestError::InvalidPacket("repeated file info".into()));
            }
            other => {
                return Err(RequestError::InvalidPacket(format!(
                    "unexpected {other} during upload"
                )));
            }
        }
        let total = data.len() + packet.payload().len();
        if total > limit {
            return Err(too_large(total, limit));
        }
        data.extend_from_slice(packet.payload());
        if !packet.continuation() {
            break;
        }
    }

    if data.len() != declared {
        debug!(
            operation_id = ctx.operation_id(),
            declared,
            received = data.len(),
            "upload size differs from file info"
        );
    }
    ctx.store.save(kind, user_id, &name, &data).await?;
    ctx.send(Packet::new(
        RequestType::FileSaveDone,
        vec![ErrorCode::Success.as_byte()],
    ))?;
    debug!(operation_id = ctx.operation_id(), %name, len = data.len(), "upload stored");
    Ok(())
}

/// Buffer size reserved before any chunk arrives.
///
/// The declared size is only a claim, so at most one chunk's worth is
/// reserved up front and the buffer grows with the data actually received.
const fn initial_capacity(declared: usize, limits: HandlerLimits) -> usize {
    if declared < limits.download_chunk {
        declared
    } else {
        limits.download_chunk
    }
}

fn too_large(len: usize, limit: usize) -> RequestError {
    RequestError::Argument(format!("upload of {len} bytes exceeds limit of {limit}"))
}
