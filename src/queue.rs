//! Unbounded packet queues with an observable length.
//!
//! Tokio's unbounded channel does not report how many messages are waiting,
//! and the keepalive needs exactly that for the outbound queue. Both ends
//! share a counter that is incremented before a send and decremented after
//! each receive.

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use thiserror::Error;
use tokio::sync::mpsc;

use crate::packet::Packet;

/// Returned when the receiving end of a queue has been dropped.
#[derive(Debug, Error)]
#[error("packet queue closed")]
pub struct QueueClosed(pub Packet);

/// Create a connected sender/receiver pair.
///
/// # Examples
///
/// ```
/// use filewire::{packet::Packet, queue::packet_queue};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let (tx, mut rx) = packet_queue();
/// tx.send(Packet::connection_check()).expect("receiver alive");
/// assert_eq!(tx.len(), 1);
/// assert!(rx.recv().await.is_some());
/// assert!(tx.is_empty());
/// # }
/// ```
#[must_use]
pub fn packet_queue() -> (PacketSender, PacketReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    let len = Arc::new(AtomicUsize::new(0));
    (
        PacketSender {
            tx,
            len: Arc::clone(&len),
        },
        PacketReceiver { rx, len },
    )
}

/// Cloneable producer half of a packet queue.
#[derive(Clone, Debug)]
pub struct PacketSender {
    tx: mpsc::UnboundedSender<Packet>,
    len: Arc<AtomicUsize>,
}

impl PacketSender {
    /// Enqueue `packet`. Never blocks.
    ///
    /// # Errors
    ///
    /// Returns [`QueueClosed`] carrying the packet when the receiver is gone.
    pub fn send(&self, packet: Packet) -> Result<(), QueueClosed> {
        self.len.fetch_add(1, Ordering::AcqRel);
        self.tx.send(packet).map_err(|e| {
            self.len.fetch_sub(1, Ordering::AcqRel);
            QueueClosed(e.0)
        })
    }

    /// Number of packets enqueued but not yet received.
    #[must_use]
    pub fn len(&self) -> usize { self.len.load(Ordering::Acquire) }

    /// Report whether the queue currently holds no packets.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Report whether the receiver has been dropped or closed.
    #[must_use]
    pub fn is_closed(&self) -> bool { self.tx.is_closed() }
}

/// Consumer half of a packet queue.
#[derive(Debug)]
pub struct PacketReceiver {
    rx: mpsc::UnboundedReceiver<Packet>,
    len: Arc<AtomicUsize>,
}

impl PacketReceiver {
    /// Wait for the next packet. Returns `None` once every sender is gone
    /// and the queue is drained.
    ///
    /// Cancel safe: no packet is lost if the future is dropped.
    pub async fn recv(&mut self) -> Option<Packet> {
        let packet = self.rx.recv().await?;
        self.len.fetch_sub(1, Ordering::AcqRel);
        Some(packet)
    }

    /// Take the next packet without waiting.
    pub fn try_recv(&mut self) -> Option<Packet> {
        let packet = self.rx.try_recv().ok()?;
        self.len.fetch_sub(1, Ordering::AcqRel);
        Some(packet)
    }

    /// Number of packets waiting.
    #[must_use]
    pub fn len(&self) -> usize { self.len.load(Ordering::Acquire) }

    /// Report whether no packets are waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Refuse further sends; packets already queued can still be received.
    pub fn close(&mut self) { self.rx.close(); }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{ErrorCode, RequestType};

    #[tokio::test]
    async fn length_tracks_sends_and_receives() {
        let (tx, mut rx) = packet_queue();
        let other = tx.clone();
        tx.send(Packet::connection_check()).expect("send");
        other
            .send(Packet::suspend(ErrorCode::SocketClosed))
            .expect("send");
        assert_eq!(tx.len(), 2);
        assert_eq!(rx.len(), 2);

        let first = rx.recv().await.expect("first packet");
        assert_eq!(first.request_type(), RequestType::ConnectionCheck);
        assert_eq!(other.len(), 1);
        assert!(rx.try_recv().is_some());
        assert!(tx.is_empty());
        assert!(rx.try_recv().is_none());
    }

    #[test]
    fn closed_queue_returns_the_packet() {
        let (tx, rx) = packet_queue();
        drop(rx);
        let err = tx
            .send(Packet::connection_check())
            .expect_err("receiver dropped");
        assert_eq!(err.0, Packet::connection_check());
        assert!(tx.is_empty());
        assert!(tx.is_closed());
    }

    #[tokio::test]
    async fn recv_ends_when_senders_are_gone() {
        let (tx, mut rx) = packet_queue();
        tx.send(Packet::connection_check()).expect("send");
        drop(tx);
        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_none());
    }
}
