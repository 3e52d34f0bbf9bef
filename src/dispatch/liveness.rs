//! Liveness supervision and keepalive probes.

use std::time::Duration;

use tokio::{
    select,
    sync::Notify,
    time::{self, MissedTickBehavior},
};
use tracing::{debug, warn};

use crate::{
    config::LivenessConfig,
    metrics,
    packet::{ErrorCode, Packet},
    session::Session,
};

/// Tear the session down when the peer falls silent.
///
/// `activity` is notified for every inbound packet. Until the first one the
/// handshake window applies; afterwards each packet restarts the liveness
/// window. On expiry a `Suspend(ConnectionCheckFailed)` is injected into the
/// inbound queue so the dispatcher fans it out like any other suspend.
#[expect(
    clippy::integer_division_remainder_used,
    reason = "tokio::select! expands to modulus internally"
)]
pub async fn supervise(session: &Session, activity: &Notify, config: LivenessConfig) {
    let mut window = config.handshake;
    loop {
        select! {
            biased;

            () = session.liveness().cancelled() => return,
            () = activity.notified() => window = config.window,
            () = time::sleep(window) => {
                warn!(
                    connection = %session.id(),
                    peer = ?session.peer_addr(),
                    ?window,
                    "liveness window expired"
                );
                metrics::inc_errors("connection_check_failed");
                session.request_farewell(ErrorCode::ConnectionCheckFailed);
                let _ = session
                    .inbound()
                    .send(Packet::suspend(ErrorCode::ConnectionCheckFailed));
                return;
            }
        }
    }
}

/// Probe the peer every `interval` while the outbound queue is idle.
///
/// A probe is only enqueued when nothing else is waiting to be sent, so
/// keepalives never delay real traffic.
#[expect(
    clippy::integer_division_remainder_used,
    reason = "tokio::select! expands to modulus internally"
)]
pub async fn keepalive(session: &Session, interval: Duration) {
    let mut ticker = time::interval_at(time::Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        select! {
            biased;

            () = session.liveness().cancelled() => return,
            _ = ticker.tick() => {
                if session.outbound().is_empty() {
                    debug!(connection = %session.id(), "sending keepalive");
                    let _ = session.outbound().send(Packet::connection_check());
                }
            }
        }
    }
}
