//! Sorted table of active handlers keyed by operation id.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;

use crate::{packet::Packet, queue::PacketSender};

/// Returned when a second handler claims an operation id still in use.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("operation {0} is already active")]
pub struct AlreadyActive(pub u8);

#[derive(Debug)]
struct Entry {
    operation_id: u8,
    inbox: PacketSender,
}

type Table = Arc<Mutex<Vec<Entry>>>;

fn lock(table: &Table) -> MutexGuard<'_, Vec<Entry>> {
    table.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Active handlers of one session, kept sorted by operation id.
///
/// Lookups binary-search the table. Entries are removed by dropping the
/// [`Registration`] returned when the handler was added.
#[derive(Clone, Debug, Default)]
pub struct Registry {
    table: Table,
}

impl Registry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Add the handler owning `operation_id`, fed through `inbox`.
    ///
    /// # Errors
    ///
    /// Returns [`AlreadyActive`] when a handler with the same id is still
    /// registered.
    pub fn register(&self, operation_id: u8, inbox: PacketSender) -> Result<Registration, AlreadyActive> {
        let mut table = lock(&self.table);
        match table.binary_search_by_key(&operation_id, |e| e.operation_id) {
            Ok(_) => Err(AlreadyActive(operation_id)),
            Err(at) => {
                table.insert(at, Entry { operation_id, inbox });
                Ok(Registration {
                    table: Arc::clone(&self.table),
                    operation_id,
                })
            }
        }
    }

    /// Inbox of the handler owning `operation_id`, if any.
    #[must_use]
    pub fn route(&self, operation_id: u8) -> Option<PacketSender> {
        let table = lock(&self.table);
        table
            .binary_search_by_key(&operation_id, |e| e.operation_id)
            .ok()
            .map(|at| table[at].inbox.clone())
    }

    /// Send a copy of `packet` to every active handler. Returns how many
    /// handlers received it.
    pub fn broadcast(&self, packet: &Packet) -> usize {
        lock(&self.table)
            .iter()
            .filter(|e| e.inbox.send(packet.clone()).is_ok())
            .count()
    }

    /// Operation ids currently active, in ascending order.
    #[must_use]
    pub fn active_ids(&self) -> Vec<u8> {
        lock(&self.table).iter().map(|e| e.operation_id).collect()
    }

    /// Number of active handlers.
    #[must_use]
    pub fn len(&self) -> usize { lock(&self.table).len() }

    /// Report whether no handler is active.
    #[must_use]
    pub fn is_empty(&self) -> bool { lock(&self.table).is_empty() }
}

/// Keeps a handler registered for as long as it is alive.
#[derive(Debug)]
#[must_use = "dropping the registration removes the handler immediately"]
pub struct Registration {
    table: Table,
    operation_id: u8,
}

impl Registration {
    /// Operation id this registration holds.
    #[must_use]
    pub const fn operation_id(&self) -> u8 { self.operation_id }
}

impl Drop for Registration {
    fn drop(&mut self) {
        let mut table = lock(&self.table);
        if let Ok(at) = table.binary_search_by_key(&self.operation_id, |e| e.operation_id) {
            table.remove(at);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        packet::{ErrorCode, RequestType},
        queue::packet_queue,
    };

    #[test]
    fn keeps_ids_sorted_and_unique() {
        let registry = Registry::new();
        let guards: Vec<_> = [9u8, 2, 200, 5]
            .into_iter()
            .map(|id| registry.register(id, packet_queue().0).expect("free id"))
            .collect();
        assert_eq!(registry.active_ids(), vec![2, 5, 9, 200]);
        assert_eq!(
            registry.register(5, packet_queue().0).err(),
            Some(AlreadyActive(5))
        );
        drop(guards);
        assert!(registry.is_empty());
    }

    #[test]
    fn routes_by_operation_id() {
        let registry = Registry::new();
        let (tx, mut rx) = packet_queue();
        let _guard = registry.register(3, tx).expect("free id");
        registry
            .route(3)
            .expect("registered")
            .send(Packet::new(RequestType::File, vec![1]))
            .expect("inbox open");
        assert_eq!(rx.try_recv().map(|p| p.payload().to_vec()), Some(vec![1]));
        assert!(registry.route(4).is_none());
    }

    #[test]
    fn dropping_the_guard_frees_the_id() {
        let registry = Registry::new();
        let guard = registry.register(1, packet_queue().0).expect("free id");
        assert_eq!(guard.operation_id(), 1);
        drop(guard);
        assert!(registry.route(1).is_none());
        let _again = registry.register(1, packet_queue().0).expect("id reusable");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn broadcast_reaches_every_live_handler() {
        let registry = Registry::new();
        let (tx_a, mut rx_a) = packet_queue();
        let (tx_b, rx_b) = packet_queue();
        let _a = registry.register(1, tx_a).expect("free id");
        let _b = registry.register(2, tx_b).expect("free id");
        drop(rx_b);

        let delivered = registry.broadcast(&Packet::suspend(ErrorCode::SocketClosed));
        assert_eq!(delivered, 1);
        assert_eq!(
            rx_a.try_recv().and_then(|p| p.suspend_code()),
            Some(ErrorCode::SocketClosed)
        );
    }
}
