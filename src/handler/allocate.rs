//! Mints a new user id.

use super::{HandlerContext, RequestError, next_packet};
use crate::{
    packet::{Packet, RequestType, payload::encode_user_id},
    queue::PacketReceiver,
};

/// Answer an `IdRequest` with an `Id` packet and bind the id to the session.
///
/// Any allocation failure is reported as `NoMoreId`.
pub(super) async fn allocate(
    ctx: &HandlerContext,
    inbox: &mut PacketReceiver,
) -> Result<(), RequestError> {
    let request = next_packet(inbox).await?;
    if request.request_type() != RequestType::IdRequest {
        return Err(RequestError::InvalidPacket(format!(
            "allocation opened by {}",
            request.request_type()
        )));
    }
    let user_id = ctx
        .store
        .allocate_user_id()
        .await
        .map_err(|_| RequestError::NoMoreIds)?;
    ctx.user.set(user_id);
    ctx.send(Packet::new(RequestType::Id, encode_user_id(user_id)))
}
