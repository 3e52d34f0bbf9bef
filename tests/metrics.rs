#![cfg(feature = "metrics")]
//! Tests for `filewire` metrics.
//!
//! These tests verify that counters and gauges update as expected using
//! `metrics_util::debugging::DebuggingRecorder`.

use filewire::metrics::{
    CONNECTIONS_ACTIVE,
    Direction,
    ERRORS_TOTAL,
    FRAMES_PROCESSED,
    HANDLERS_FINISHED,
};
use filewire_testing::{TestServer, TestStore, test_store};
use metrics::{SharedString, Unit};
use metrics_util::{
    CompositeKey,
    debugging::{DebugValue, DebuggingRecorder, Snapshotter},
};
use rstest::rstest;

/// Creates a debugging recorder and snapshotter for metrics testing.
fn debugging_recorder_setup() -> (Snapshotter, DebuggingRecorder) {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    (snapshotter, recorder)
}

/// One drained view of every recorded series.
type Series = Vec<(CompositeKey, Option<Unit>, Option<SharedString>, DebugValue)>;

/// Sum of counter `name` over every series carrying label `key=value`.
///
/// Snapshots drain the recorder, so take one per test and query it.
fn counter_with_label(series: &Series, name: &str, key: &str, value: &str) -> u64 {
    series
        .iter()
        .filter(|(k, _, _, _)| {
            k.key().name() == name
                && k.key()
                    .labels()
                    .any(|l| l.key() == key && l.value() == value)
        })
        .map(|(_, _, _, v)| match v {
            DebugValue::Counter(c) => *c,
            _ => 0,
        })
        .sum()
}

#[rstest]
#[case(Direction::Inbound, "inbound")]
#[case(Direction::Outbound, "outbound")]
fn frame_metric_is_labelled_by_direction(#[case] direction: Direction, #[case] label: &str) {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || {
        filewire::metrics::inc_frames(direction);
        filewire::metrics::inc_frames(direction);
    });
    let series = snapshotter.snapshot().into_vec();
    assert_eq!(counter_with_label(&series, FRAMES_PROCESSED, "direction", label), 2);
}

#[test]
fn error_metric_carries_its_code() {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || {
        filewire::metrics::inc_errors("frame");
    });
    let series = snapshotter.snapshot().into_vec();
    assert_eq!(counter_with_label(&series, ERRORS_TOTAL, "code", "frame"), 1);
    assert_eq!(counter_with_label(&series, ERRORS_TOTAL, "code", "socket"), 0);
}

#[test]
fn connection_gauge_tracks_open_connections() {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || {
        filewire::metrics::inc_connections();
        filewire::metrics::inc_connections();
        filewire::metrics::dec_connections();
    });
    let gauge = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .find_map(|(k, _, _, v)| match v {
            DebugValue::Gauge(g) if k.key().name() == CONNECTIONS_ACTIVE => Some(g.into_inner()),
            _ => None,
        });
    assert_eq!(gauge, Some(1.0));
}

#[rstest]
#[tokio::test(flavor = "current_thread")]
async fn served_requests_are_counted(test_store: TestStore) {
    let (snapshotter, recorder) = debugging_recorder_setup();
    let _guard = metrics::set_default_local_recorder(&recorder);
    test_store.write_user_file(7, "a.txt", b"hello");
    let server = TestServer::start(&test_store).await;
    let mut client = server.connect().await;

    let (_, body) = client.download(7, "a.txt", 1).await;
    assert_eq!(body, b"hello");
    assert_eq!(client.request_id(2).await, 8);
    drop(client);
    server.shutdown().await;

    let series = snapshotter.snapshot().into_vec();
    assert_eq!(counter_with_label(&series, FRAMES_PROCESSED, "direction", "inbound"), 2);
    assert!(counter_with_label(&series, FRAMES_PROCESSED, "direction", "outbound") >= 3);
    assert_eq!(counter_with_label(&series, HANDLERS_FINISHED, "kind", "download"), 1);
    assert_eq!(counter_with_label(&series, HANDLERS_FINISHED, "kind", "allocate"), 1);
    assert_eq!(counter_with_label(&series, HANDLERS_FINISHED, "outcome", "ok"), 2);
}
