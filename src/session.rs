//! Per-connection session record.
//!
//! A [`Session`] owns the two queues that decouple the socket loops from the
//! dispatcher and handlers, the liveness token every loop watches, and the
//! identity of the peer. It lives inside a pooled connection slot and is
//! reset, not reallocated, between connections.

use std::{
    fmt,
    net::SocketAddr,
    sync::{
        Arc,
        OnceLock,
        atomic::{AtomicU32, Ordering},
    },
};

use tokio_util::sync::CancellationToken;

use crate::{
    packet::ErrorCode,
    queue::{PacketReceiver, PacketSender, packet_queue},
};

/// Identifier assigned to an accepted connection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl From<u64> for ConnectionId {
    fn from(value: u64) -> Self { Self(value) }
}

impl ConnectionId {
    /// Create a new [`ConnectionId`] with the provided value.
    #[must_use]
    pub const fn new(id: u64) -> Self { Self(id) }

    /// Return the inner `u64` representation.
    #[must_use]
    pub const fn as_u64(&self) -> u64 { self.0 }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "conn-{}", self.0) }
}

/// Shared handle to the user id bound to a session.
///
/// `0` means no user has been identified yet. Handlers hold a clone so the id
/// allocator can bind the freshly allocated id to the connection.
#[derive(Clone, Debug, Default)]
pub struct UserIdentity(Arc<AtomicU32>);

impl UserIdentity {
    /// Current user id, `0` when anonymous.
    #[must_use]
    pub fn get(&self) -> u32 { self.0.load(Ordering::Acquire) }

    /// Bind `user_id` to the session.
    pub fn set(&self, user_id: u32) { self.0.store(user_id, Ordering::Release); }
}

/// Mutable per-connection state.
///
/// The receivers are handed out once per connection with
/// [`take_inbound`](Self::take_inbound) and
/// [`take_outbound`](Self::take_outbound); [`reset`](Self::reset) installs a
/// fresh pair of queues for the next connection.
#[derive(Debug)]
pub struct Session {
    id: ConnectionId,
    peer_addr: Option<SocketAddr>,
    user: UserIdentity,
    inbound: PacketSender,
    inbound_rx: Option<PacketReceiver>,
    outbound: PacketSender,
    outbound_rx: Option<PacketReceiver>,
    liveness: CancellationToken,
    farewell: OnceLock<ErrorCode>,
}

impl Default for Session {
    fn default() -> Self { Self::new() }
}

impl Session {
    /// Create a session with empty queues and a live token.
    #[must_use]
    pub fn new() -> Self {
        let (inbound, inbound_rx) = packet_queue();
        let (outbound, outbound_rx) = packet_queue();
        Self {
            id: ConnectionId::default(),
            peer_addr: None,
            user: UserIdentity::default(),
            inbound,
            inbound_rx: Some(inbound_rx),
            outbound,
            outbound_rx: Some(outbound_rx),
            liveness: CancellationToken::new(),
            farewell: OnceLock::new(),
        }
    }

    /// Record the identity of a freshly accepted connection.
    pub fn attach(&mut self, id: ConnectionId, peer_addr: Option<SocketAddr>) {
        self.id = id;
        self.peer_addr = peer_addr;
    }

    /// Identifier of the connection using this session.
    #[must_use]
    pub const fn id(&self) -> ConnectionId { self.id }

    /// Remote address, if the socket reported one.
    #[must_use]
    pub const fn peer_addr(&self) -> Option<SocketAddr> { self.peer_addr }

    /// User id bound to the connection; `0` when anonymous.
    #[must_use]
    pub fn user_id(&self) -> u32 { self.user.get() }

    /// Shared handle to the session's user id.
    #[must_use]
    pub fn user(&self) -> &UserIdentity { &self.user }

    /// Producer side of the inbound queue (socket → dispatcher).
    #[must_use]
    pub const fn inbound(&self) -> &PacketSender { &self.inbound }

    /// Producer side of the outbound queue (handlers → socket).
    #[must_use]
    pub const fn outbound(&self) -> &PacketSender { &self.outbound }

    /// Take the inbound receiver. Returns `None` if already taken.
    pub fn take_inbound(&mut self) -> Option<PacketReceiver> { self.inbound_rx.take() }

    /// Take the outbound receiver. Returns `None` if already taken.
    pub fn take_outbound(&mut self) -> Option<PacketReceiver> { self.outbound_rx.take() }

    /// Token cancelled when the connection is torn down.
    #[must_use]
    pub const fn liveness(&self) -> &CancellationToken { &self.liveness }

    /// Report whether the connection is still considered alive.
    #[must_use]
    pub fn is_live(&self) -> bool { !self.liveness.is_cancelled() }

    /// Mark the connection dead, waking every loop that watches the token.
    pub fn kill(&self) { self.liveness.cancel(); }

    /// Ask the send loop to write a `Suspend` carrying `code` before the
    /// socket closes. The first request wins; later ones are ignored.
    ///
    /// Only locally initiated teardowns request a farewell.
    pub fn request_farewell(&self, code: ErrorCode) { let _ = self.farewell.set(code); }

    /// Code of the farewell frame, if one was requested.
    #[must_use]
    pub fn farewell(&self) -> Option<ErrorCode> { self.farewell.get().copied() }

    /// Return the session to its pristine state.
    ///
    /// Queues are replaced so packets left over from the previous connection
    /// can never reach the next one, and a fresh token is installed because a
    /// cancelled token cannot be revived.
    pub fn reset(&mut self) { *self = Self::new(); }
}
