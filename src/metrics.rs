//! Metric helpers for `filewire`.
//!
//! This module defines metric names and simple helper functions wrapping the
//! [`metrics`](https://docs.rs/metrics) crate. Without the `metrics` feature
//! every helper compiles to a no-op.

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

/// Name of the gauge tracking active connections.
pub const CONNECTIONS_ACTIVE: &str = "filewire_connections_active";
/// Name of the counter tracking processed frames.
pub const FRAMES_PROCESSED: &str = "filewire_frames_processed_total";
/// Name of the counter tracking connection-level errors.
pub const ERRORS_TOTAL: &str = "filewire_errors_total";
/// Name of the counter tracking finished request handlers.
pub const HANDLERS_FINISHED: &str = "filewire_handlers_finished_total";
/// Name of the counter tracking panicking tasks.
pub const PANICS_TOTAL: &str = "filewire_panics_total";

/// Direction of frame processing.
#[derive(Clone, Copy, Debug)]
pub enum Direction {
    /// Inbound frames received from a client.
    Inbound,
    /// Outbound frames sent to a client.
    Outbound,
}

impl Direction {
    #[cfg_attr(not(feature = "metrics"), expect(dead_code, reason = "labels only feed metrics"))]
    fn as_str(self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

/// Increment the active connections gauge.
pub fn inc_connections() {
    #[cfg(feature = "metrics")]
    gauge!(CONNECTIONS_ACTIVE).increment(1.0);
}

/// Decrement the active connections gauge.
pub fn dec_connections() {
    #[cfg(feature = "metrics")]
    gauge!(CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Record a processed frame for the given direction.
pub fn inc_frames(direction: Direction) {
    #[cfg(feature = "metrics")]
    counter!(FRAMES_PROCESSED, "direction" => direction.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = direction;
}

/// Record a connection-level error, labelled by the `Suspend` code it caused.
pub fn inc_errors(code: &'static str) {
    #[cfg(feature = "metrics")]
    counter!(ERRORS_TOTAL, "code" => code).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = code;
}

/// Record a finished handler, labelled by kind and outcome.
pub fn inc_handlers(kind: &'static str, outcome: &'static str) {
    #[cfg(feature = "metrics")]
    counter!(HANDLERS_FINISHED, "kind" => kind, "outcome" => outcome).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = (kind, outcome);
}

/// Record a panic caught in a connection or handler task.
pub fn inc_panics() {
    #[cfg(feature = "metrics")]
    counter!(PANICS_TOTAL).increment(1);
}
