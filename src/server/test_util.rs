//! Test helpers shared across server modules.

use std::net::{Ipv4Addr, SocketAddr, TcpListener as StdTcpListener};

use rstest::fixture;
use tempfile::TempDir;

use super::{Bound, FileServer};
use crate::store::FileStore;

/// A bootstrapped store in a temporary directory.
pub struct TestStore {
    pub dir: TempDir,
    pub store: FileStore,
}

#[fixture]
pub fn test_store() -> TestStore {
    let dir = TempDir::new().expect("create temp dir");
    let dlc = dir.path().join("dlc");
    let user = dir.path().join("user");
    std::fs::create_dir_all(&dlc).expect("create dlc root");
    std::fs::create_dir_all(user.join("0")).expect("create user root");
    TestStore {
        store: FileStore::new(dlc, user),
        dir,
    }
}

#[fixture]
/// Returns a bound [`StdTcpListener`] on a free port for use in tests.
///
/// Keeping the listener bound prevents race conditions where another
/// process could claim the port between discovery and use.
pub fn free_listener() -> StdTcpListener {
    let addr = SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 0);
    StdTcpListener::bind(addr).expect("Failed to bind free port listener")
}

/// Extract the bound address from a listener.
#[must_use]
pub fn listener_addr(listener: &StdTcpListener) -> SocketAddr {
    listener
        .local_addr()
        .expect("failed to get listener address")
}

pub fn bind_server(store: FileStore, listener: StdTcpListener) -> FileServer<Bound> {
    FileServer::new(store)
        .bind_existing_listener(listener)
        .expect("Failed to bind")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listener_addr_matches_local_addr() {
        let listener = free_listener();
        let addr = listener_addr(&listener);
        assert_eq!(addr.ip(), std::net::IpAddr::from(Ipv4Addr::LOCALHOST));
        assert_eq!(addr, listener.local_addr().expect("failed to get address"));
    }

    #[test]
    fn test_store_has_both_roots() {
        let fixture = test_store();
        assert!(fixture.store.dlc_root().is_dir());
        assert!(fixture.store.user_root().join("0").is_dir());
        assert!(fixture.store.dlc_root().starts_with(fixture.dir.path()));
    }
}
