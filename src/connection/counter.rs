//! Active connection counting and RAII guard.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::metrics;

/// Process-wide count of connections being served.
static ACTIVE_CONNECTIONS: AtomicU64 = AtomicU64::new(0);

/// RAII guard counting a connection for as long as it is served.
///
/// Dropping the guard releases the count even if the connection task
/// panicked.
#[derive(Debug)]
#[must_use = "the connection is only counted while the guard lives"]
pub struct ActiveConnection(());

impl ActiveConnection {
    /// Count a newly accepted connection.
    pub fn new() -> Self {
        ACTIVE_CONNECTIONS.fetch_add(1, Ordering::Relaxed);
        metrics::inc_connections();
        Self(())
    }
}

impl Default for ActiveConnection {
    fn default() -> Self { Self::new() }
}

impl Drop for ActiveConnection {
    fn drop(&mut self) {
        ACTIVE_CONNECTIONS.fetch_sub(1, Ordering::Relaxed);
        metrics::dec_connections();
    }
}

/// Number of connections currently being served.
#[must_use]
pub fn active_connection_count() -> u64 { ACTIVE_CONNECTIONS.load(Ordering::Relaxed) }
